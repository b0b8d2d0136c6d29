#[cfg(feature = "audio-io")]
pub mod input;
pub mod playback;
pub mod resampler;
pub mod slicer;
#[cfg(feature = "local-stt")]
pub mod vad;

#[cfg(feature = "audio-io")]
pub use input::AudioInput;
pub use playback::{decode_audio, AudioPlayer};
pub use resampler::StreamResampler;
pub use slicer::{encode_pcm16, FrameSlicer};
#[cfg(feature = "local-stt")]
pub use vad::SileroGate;
