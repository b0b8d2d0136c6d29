//! On-device voice using sherpa-rs VITS models

use super::synthesis::{SpeakOptions, SynthesisEngine};
use crate::audio::AudioPlayer;
use crate::config::SpeechConfig;
use crate::{Result, VoxError};
use sherpa_rs::tts::{VitsTts, VitsTtsConfig};
use std::path::Path;
use tracing::{debug, info};

/// Synthesizes with a local VITS model and plays through the default output
pub struct VitsVoice {
    tts: VitsTts,
    speaker_id: i32,
    player: AudioPlayer,
}

fn required<'a>(path: Option<&'a Path>, what: &str) -> Result<&'a Path> {
    let path = path.ok_or_else(|| VoxError::ConfigError(format!("speech.{} is required", what)))?;
    if !path.exists() {
        return Err(VoxError::ConfigError(format!(
            "{} not found: {}",
            what,
            path.display()
        )));
    }
    Ok(path)
}

impl VitsVoice {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let model = required(config.vits_model.as_deref(), "vits_model")?;
        let tokens = required(config.vits_tokens.as_deref(), "vits_tokens")?;

        info!("Loading VITS voice from: {}", model.display());

        let vits_config = VitsTtsConfig {
            model: model.to_string_lossy().into_owned(),
            tokens: tokens.to_string_lossy().into_owned(),
            length_scale: 1.0,
            ..Default::default()
        };

        Ok(Self {
            tts: VitsTts::new(vits_config),
            speaker_id: config.speaker_id,
            player: AudioPlayer::new()?,
        })
    }
}

/// Flatten characters the model tends to mispronounce or skip
fn speakable(text: &str) -> String {
    let replaced = text
        .replace('&', " and ")
        .replace('%', " percent")
        .replace('@', " at ")
        .replace('+', " plus ")
        .replace('=', " equals ");

    replaced
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || ".,!?;:'-\"".contains(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl SynthesisEngine for VitsVoice {
    fn speak(&mut self, text: &str, options: &SpeakOptions) -> Result<()> {
        let text = speakable(text);
        if text.is_empty() {
            return Ok(());
        }

        let audio = self
            .tts
            .create(&text, self.speaker_id, options.rate)
            .map_err(|e| VoxError::SpeechError(format!("Synthesis failed: {}", e)))?;

        let volume = options.volume.clamp(0.0, 1.0);
        let samples: Vec<f32> = audio.samples.iter().map(|s| s * volume).collect();
        debug!(
            "Synthesized {} samples at {} Hz",
            samples.len(),
            audio.sample_rate
        );

        self.player.play_samples(samples, audio.sample_rate as u32)
    }

    fn cancel(&mut self) {
        self.player.stop();
    }

    fn pause(&mut self) {
        self.player.pause();
    }

    fn resume(&mut self) {
        self.player.resume();
    }

    fn is_busy(&self) -> bool {
        !self.player.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speakable_text() {
        assert_eq!(speakable("Tom & Jerry  100%"), "Tom and Jerry 100 percent");
        assert_eq!(speakable("**bold** `code`"), "bold code");
    }

    #[test]
    fn test_missing_model_is_config_error() {
        let config = SpeechConfig::default();
        assert!(matches!(
            VitsVoice::new(&config),
            Err(VoxError::ConfigError(_))
        ));
    }
}
