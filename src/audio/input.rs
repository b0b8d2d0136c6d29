use crate::transport::AudioSource;
use crate::{Result, VoxError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn device_error(what: &str, e: impl std::fmt::Display) -> VoxError {
    VoxError::AudioDeviceError(format!("{}: {}", what, e))
}

/// Average interleaved frames down to one channel
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// The system microphone, delivered as mono batches at the device rate
pub struct AudioInput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    // Read from the capture callback thread
    forwarding: Arc<AtomicBool>,
}

impl AudioInput {
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoxError::AudioDeviceError("No microphone found".into()))?;

        let config: StreamConfig = device
            .default_input_config()
            .map_err(|e| device_error("Microphone format unavailable", e))?
            .into();

        info!(
            "Microphone {} at {} Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
            config.sample_rate.0,
            config.channels
        );

        Ok(Self {
            device,
            config,
            stream: None,
            forwarding: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }
}

impl AudioSource for AudioInput {
    fn start(&mut self, samples_tx: Sender<Vec<f32>>) -> Result<()> {
        if self.stream.is_some() {
            warn!("Microphone is already open");
            return Ok(());
        }

        let channels = self.config.channels as usize;
        let forwarding = Arc::clone(&self.forwarding);
        let on_data = move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if !forwarding.load(Ordering::Relaxed) {
                return;
            }
            if samples_tx.try_send(downmix(data, channels)).is_err() {
                debug!("Capture consumer is behind or gone; batch dropped");
            }
        };

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                on_data,
                |err| error!("Microphone stream failed: {}", err),
                None,
            )
            .map_err(|e| device_error("Could not open the microphone", e))?;
        stream
            .play()
            .map_err(|e| device_error("Could not start the microphone", e))?;

        self.forwarding.store(true, Ordering::Relaxed);
        self.stream = Some(stream);
        debug!("Microphone open");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.forwarding.store(false, Ordering::Relaxed);
        // The device is released when the stream is dropped
        if self.stream.take().is_some() {
            debug!("Microphone closed");
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_downmix() {
        assert_eq!(downmix(&[0.5, -0.5, 0.25], 1), vec![0.5, -0.5, 0.25]);
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        // A trailing partial frame is not a sample
        assert_eq!(downmix(&[0.25, 0.5, 0.75, 0.9], 3), vec![0.5]);
    }

    #[test]
    fn test_open_and_close() {
        // Hosts without a microphone skip the rest
        let Ok(mut input) = AudioInput::new() else {
            return;
        };
        assert!(input.sample_rate() > 0);
        assert!(!input.is_active());

        let (tx, _rx) = bounded(10);
        if input.start(tx).is_ok() {
            assert!(input.is_active());
            input.stop().unwrap();
            assert!(!input.is_active());
            input.stop().unwrap();
        }
    }
}
