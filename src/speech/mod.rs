//! Speech recognition and synthesis adapters
//!
//! Both sides sit behind small engine traits so the rest of the client works
//! the same whether or not the platform provides a native engine:
//! - [`recognition`]: continuous dictation with a silence timeout
//! - [`dictation`]: a recognition engine fed by a local microphone
//! - [`synthesis`]: one-utterance-at-a-time playback controls
//! - `vits`: optional on-device VITS voice (feature `local-tts`)
//! - `whisper`: optional on-device transcription (feature `local-stt`)

pub mod dictation;
pub mod recognition;
pub mod synthesis;
#[cfg(feature = "local-tts")]
pub mod vits;
#[cfg(feature = "local-stt")]
pub mod whisper;

pub use dictation::{MicrophoneEngine, SpeechGate, Transcriber, UtteranceTiming};
pub use recognition::{
    EngineEvent, RecognitionEngine, RecognitionEvent, Segment, SpeechRecognizer,
};
pub use synthesis::{SpeakOptions, SpeechSynthesizer, SynthesisEngine, SynthesisState};
#[cfg(feature = "local-tts")]
pub use vits::VitsVoice;
#[cfg(feature = "local-stt")]
pub use whisper::{microphone_dictation, WhisperTranscriber};
