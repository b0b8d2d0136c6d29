use ringbuf::{traits::*, HeapRb};

/// Cuts a continuous sample stream into fixed-length frames
pub struct FrameSlicer {
    buffer: HeapRb<f32>,
    frame_len: usize,
}

impl FrameSlicer {
    /// Frames of `slice_ms` milliseconds at `sample_rate` Hz (mono)
    pub fn new(sample_rate: u32, slice_ms: u32) -> Self {
        let frame_len = ((sample_rate as u64 * slice_ms as u64) / 1000).max(1) as usize;
        Self {
            buffer: HeapRb::new(frame_len * 2),
            frame_len,
        }
    }

    /// Samples per frame
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Add samples, returning every frame they complete as PCM16 little-endian bytes
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<u8>> {
        self.push_frames(samples)
            .iter()
            .map(|frame| encode_pcm16(frame))
            .collect()
    }

    /// Add samples, returning every completed frame as raw samples
    pub fn push_frames(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let written = self.buffer.push_slice(rest);
            rest = &rest[written..];

            while self.buffer.occupied_len() >= self.frame_len {
                let mut frame = vec![0.0f32; self.frame_len];
                self.buffer.pop_slice(&mut frame);
                frames.push(frame);
            }
        }

        frames
    }

    /// Samples waiting for the next frame
    pub fn pending(&self) -> usize {
        self.buffer.occupied_len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Clamp to [-1, 1] and encode as signed 16-bit little-endian
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}
