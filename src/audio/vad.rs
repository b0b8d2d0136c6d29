use crate::speech::dictation::{SpeechGate, DICTATION_RATE};
use crate::{Result, VoxError};
use tracing::info;
use voice_activity_detector::VoiceActivityDetector;

/// Silero VAD over 512-sample frames at 16 kHz
pub struct SileroGate {
    detector: VoiceActivityDetector,
    threshold: f32,
}

impl SileroGate {
    pub fn new(threshold: f32) -> Result<Self> {
        let detector = VoiceActivityDetector::builder()
            .sample_rate(DICTATION_RATE as i32)
            .chunk_size(512usize)
            .build()
            .map_err(|e| VoxError::SpeechError(format!("Failed to create VAD: {:?}", e)))?;

        let threshold = threshold.clamp(0.0, 1.0);
        info!("Voice gate ready (threshold {})", threshold);
        Ok(Self {
            detector,
            threshold,
        })
    }
}

impl SpeechGate for SileroGate {
    fn is_speech(&mut self, frame: &[f32]) -> bool {
        self.detector.predict(frame.iter().copied()) >= self.threshold
    }

    fn reset(&mut self) {
        self.detector.reset();
    }
}
