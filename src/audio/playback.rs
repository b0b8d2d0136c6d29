use crate::{Result, VoxError};
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use tracing::{debug, info};

/// Decode an encoded reply (MP3, WAV, ...) without playing it
pub fn decode_audio(bytes: Vec<u8>) -> Result<Decoder<Cursor<Vec<u8>>>> {
    if bytes.is_empty() {
        return Err(VoxError::DecodeError("Audio payload is empty".into()));
    }
    Decoder::new(Cursor::new(bytes))
        .map_err(|e| VoxError::DecodeError(format!("Unsupported audio payload: {}", e)))
}

/// Plays assistant replies on the default output device.
///
/// Starting a new reply stops the one still playing.
pub struct AudioPlayer {
    // Dropping the stream silences all output
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
}

impl AudioPlayer {
    pub fn new() -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| VoxError::AudioDeviceError(format!("No output device: {}", e)))?;
        info!("Audio output ready");
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
        })
    }

    fn replace_sink(&mut self) -> Result<&Sink> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| VoxError::AudioDeviceError(format!("Failed to open sink: {}", e)))?;
        // The previous sink stops when dropped
        let sink: &Sink = self.sink.insert(sink);
        Ok(sink)
    }

    /// Decode and play an encoded payload immediately
    pub fn play_encoded(&mut self, bytes: Vec<u8>) -> Result<()> {
        let source = decode_audio(bytes)?;
        debug!(
            "Playing reply: {} Hz, {} channels",
            source.sample_rate(),
            source.channels()
        );
        self.replace_sink()?.append(source);
        Ok(())
    }

    /// Play raw mono samples, e.g. from an on-device voice
    pub fn play_samples(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let source = SamplesBuffer::new(1, sample_rate, samples);
        self.replace_sink()?.append(source);
        Ok(())
    }

    pub fn pause(&self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    pub fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    /// Nothing queued, paused or not
    pub fn is_finished(&self) -> bool {
        self.sink.as_ref().map(|s| s.empty()).unwrap_or(true)
    }

    pub fn is_playing(&self) -> bool {
        self.sink
            .as_ref()
            .map(|s| !s.empty() && !s.is_paused())
            .unwrap_or(false)
    }
}
