//! Text-to-speech front end
//!
//! Only one utterance plays at a time. Transport controls are no-ops when no
//! engine is available, and pause/resume only act from the matching state.

use crate::{Result, VoxError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeakOptions {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for SpeakOptions {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// A native speech synthesis backend
pub trait SynthesisEngine {
    fn speak(&mut self, text: &str, options: &SpeakOptions) -> Result<()>;

    /// Drop the current utterance, if any
    fn cancel(&mut self);

    fn pause(&mut self);

    fn resume(&mut self);

    /// Whether an utterance is still in progress (paused counts)
    fn is_busy(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Idle,
    Speaking,
    Paused,
}

pub struct SpeechSynthesizer {
    engine: Option<Box<dyn SynthesisEngine>>,
    state: SynthesisState,
}

impl SpeechSynthesizer {
    pub fn new(engine: Option<Box<dyn SynthesisEngine>>) -> Self {
        Self {
            engine,
            state: SynthesisState::Idle,
        }
    }

    pub fn unsupported() -> Self {
        Self::new(None)
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    pub fn state(&self) -> SynthesisState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == SynthesisState::Speaking
    }

    /// Speak `text`, cancelling whatever is still playing
    pub fn speak(&mut self, text: &str, options: SpeakOptions) -> Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(VoxError::Unsupported("Text-to-speech not supported".into()));
        };

        engine.cancel();
        self.state = SynthesisState::Idle;

        if text.trim().is_empty() {
            return Ok(());
        }

        engine.speak(text, &options).map_err(|e| {
            warn!("Text-to-speech error: {}", e);
            VoxError::SpeechError("Failed to speak text".into())
        })?;
        self.state = SynthesisState::Speaking;
        debug!("Speaking {} characters", text.len());
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.cancel();
            self.state = SynthesisState::Idle;
        }
    }

    pub fn pause(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if self.state == SynthesisState::Speaking {
                engine.pause();
                self.state = SynthesisState::Paused;
            }
        }
    }

    pub fn resume(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if self.state == SynthesisState::Paused {
                engine.resume();
                self.state = SynthesisState::Speaking;
            }
        }
    }

    /// Returns `true` once when the current utterance has finished
    pub fn poll_finished(&mut self) -> bool {
        let finished = self.state == SynthesisState::Speaking
            && self.engine.as_ref().is_some_and(|e| !e.is_busy());
        if finished {
            self.state = SynthesisState::Idle;
        }
        finished
    }
}

impl Drop for SpeechSynthesizer {
    fn drop(&mut self) {
        self.stop();
    }
}
