//! On-device transcription with whisper.cpp models

use super::dictation::{MicrophoneEngine, Transcriber, UtteranceTiming};
use crate::audio::{AudioInput, SileroGate};
use crate::config::SpeechConfig;
use crate::{Result, VoxError};
use std::path::Path;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

const THREADS: i32 = 4;

pub struct WhisperTranscriber {
    context: WhisperContext,
}

impl WhisperTranscriber {
    pub fn new(model: &Path) -> Result<Self> {
        if !model.exists() {
            return Err(VoxError::ConfigError(format!(
                "whisper_model not found: {}",
                model.display()
            )));
        }
        let path = model
            .to_str()
            .ok_or_else(|| VoxError::ConfigError("whisper_model path is not UTF-8".into()))?;

        info!("Loading Whisper model from: {}", model.display());
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| VoxError::SpeechError(format!("Failed to load Whisper model: {:?}", e)))?;

        Ok(Self { context })
    }
}

/// Whisper takes bare language codes: "en-US" becomes "en"
fn whisper_language(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(language)
        .to_lowercase()
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&mut self, samples: &[f32], language: &str) -> Result<String> {
        let failed = |what: &str, e: whisper_rs::WhisperError| {
            VoxError::SpeechError(format!("{}: {:?}", what, e))
        };

        let language = whisper_language(language);
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(THREADS);
        params.set_language(Some(language.as_str()));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let mut state = self
            .context
            .create_state()
            .map_err(|e| failed("Failed to create Whisper state", e))?;
        state
            .full(params, samples)
            .map_err(|e| failed("Transcription failed", e))?;

        let count = state
            .full_n_segments()
            .map_err(|e| failed("Failed to read segments", e))?;
        let mut text = String::new();
        for i in 0..count {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| failed("Failed to read segment text", e))?;
            text.push_str(&segment);
        }

        debug!("Whisper produced {} segments", count);
        Ok(text.trim().to_string())
    }
}

/// Dictation from the default microphone through Whisper and Silero VAD
pub fn microphone_dictation(config: &SpeechConfig) -> Result<MicrophoneEngine> {
    let model = config
        .whisper_model
        .as_deref()
        .ok_or_else(|| VoxError::ConfigError("speech.whisper_model is required".into()))?;

    let transcriber = WhisperTranscriber::new(model)?;
    let gate = SileroGate::new(config.vad_threshold)?;
    let input = AudioInput::new()?;

    Ok(MicrophoneEngine::new(
        Box::new(input),
        Box::new(transcriber),
        Box::new(gate),
        UtteranceTiming::from(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes() {
        assert_eq!(whisper_language("en-US"), "en");
        assert_eq!(whisper_language("pt_BR"), "pt");
        assert_eq!(whisper_language("DE"), "de");
    }

    #[test]
    fn test_missing_model_is_config_error() {
        let result = WhisperTranscriber::new(Path::new("/nonexistent/ggml-base.en.bin"));
        assert!(matches!(result, Err(VoxError::ConfigError(_))));
    }
}
