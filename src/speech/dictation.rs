//! Microphone dictation: capture, voice gating and batch transcription
//!
//! [`MicrophoneEngine`] is a [`RecognitionEngine`] built from three parts:
//! an [`AudioSource`] for capture, a [`SpeechGate`] that marks 32 ms frames
//! as voiced or not, and a [`Transcriber`] that turns a stretch of 16 kHz
//! audio into text. Partial transcripts are produced while the speaker is
//! still talking so the recognizer's silence timer keeps getting re-armed.

use super::recognition::{EngineEvent, RecognitionEngine, Segment};
use crate::audio::{FrameSlicer, StreamResampler};
use crate::config::SpeechConfig;
use crate::transport::AudioSource;
use crate::{Result, VoxError};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sample rate every transcriber receives
pub const DICTATION_RATE: u32 = 16000;

/// Gate frames are 512 samples at 16 kHz
const GATE_FRAME_MS: u32 = 32;

/// Shortest voiced stretch worth transcribing
const MIN_UTTERANCE_MS: u64 = 300;

const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Turns a stretch of 16 kHz mono audio into text
pub trait Transcriber: Send {
    fn transcribe(&mut self, samples: &[f32], language: &str) -> Result<String>;
}

/// Classifies one gate frame as speech or not
pub trait SpeechGate: Send {
    fn is_speech(&mut self, frame: &[f32]) -> bool;

    /// Forget state carried over from the previous listening period
    fn reset(&mut self) {}
}

/// Timing of utterance boundaries, in milliseconds of audio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtteranceTiming {
    pub pause_ms: u64,
    pub interim_ms: u64,
    pub max_ms: u64,
    pub min_ms: u64,
}

impl From<&SpeechConfig> for UtteranceTiming {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            pause_ms: config.utterance_pause_ms,
            interim_ms: config.interim_interval_ms,
            max_ms: config.max_utterance_secs * 1000,
            min_ms: MIN_UTTERANCE_MS,
        }
    }
}

/// Audio ready for transcription
#[derive(Debug, Clone, PartialEq)]
pub enum Cut {
    /// Everything heard so far in an utterance that is still going
    Interim(Vec<f32>),
    /// A finished utterance
    Final(Vec<f32>),
}

fn samples_for(ms: u64) -> usize {
    (DICTATION_RATE as u64 * ms / 1000) as usize
}

/// Groups gated frames into utterances. Time is counted in samples, so the
/// result does not depend on how fast audio arrives.
pub struct UtteranceSplitter {
    slicer: FrameSlicer,
    buffer: Vec<f32>,
    in_speech: bool,
    silent: usize,
    since_interim: usize,
    pause: usize,
    interim: usize,
    max: usize,
    min: usize,
}

impl UtteranceSplitter {
    pub fn new(timing: UtteranceTiming) -> Self {
        Self {
            slicer: FrameSlicer::new(DICTATION_RATE, GATE_FRAME_MS),
            buffer: Vec::new(),
            in_speech: false,
            silent: 0,
            since_interim: 0,
            pause: samples_for(timing.pause_ms),
            interim: samples_for(timing.interim_ms),
            max: samples_for(timing.max_ms),
            min: samples_for(timing.min_ms),
        }
    }

    /// Feed 16 kHz samples, returning whatever they complete
    pub fn push(&mut self, samples: &[f32], gate: &mut dyn SpeechGate) -> Vec<Cut> {
        let mut cuts = Vec::new();

        for frame in self.slicer.push_frames(samples) {
            if gate.is_speech(&frame) {
                if !self.in_speech {
                    debug!("Speech detected");
                    self.in_speech = true;
                    self.buffer.clear();
                    self.since_interim = 0;
                }
                self.buffer.extend_from_slice(&frame);
                self.silent = 0;
                self.since_interim += frame.len();

                if self.buffer.len() >= self.max {
                    cuts.push(Cut::Final(self.take()));
                } else if self.since_interim >= self.interim {
                    self.since_interim = 0;
                    cuts.push(Cut::Interim(self.buffer.clone()));
                }
            } else if self.in_speech {
                self.buffer.extend_from_slice(&frame);
                self.silent += frame.len();

                if self.silent >= self.pause {
                    match self.flush() {
                        Some(utterance) => cuts.push(Cut::Final(utterance)),
                        None => debug!("Discarding short noise burst"),
                    }
                }
            }
        }

        cuts
    }

    /// End the current utterance, if it is long enough to keep
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        let voiced = self.buffer.len().saturating_sub(self.silent);
        let utterance = self.take();
        (voiced >= self.min).then_some(utterance)
    }

    pub fn is_in_speech(&self) -> bool {
        self.in_speech
    }

    fn take(&mut self) -> Vec<f32> {
        self.in_speech = false;
        self.silent = 0;
        self.since_interim = 0;
        std::mem::take(&mut self.buffer)
    }
}

struct Pipeline {
    transcriber: Box<dyn Transcriber>,
    gate: Box<dyn SpeechGate>,
}

/// Dictation straight from a local microphone
pub struct MicrophoneEngine {
    source: Box<dyn AudioSource>,
    pipeline: Arc<Mutex<Pipeline>>,
    timing: UtteranceTiming,
    generation: Arc<AtomicU64>,
    listening: bool,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
}

impl MicrophoneEngine {
    pub fn new(
        source: Box<dyn AudioSource>,
        transcriber: Box<dyn Transcriber>,
        gate: Box<dyn SpeechGate>,
        timing: UtteranceTiming,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            source,
            pipeline: Arc::new(Mutex::new(Pipeline { transcriber, gate })),
            timing,
            generation: Arc::new(AtomicU64::new(0)),
            listening: false,
            events_tx,
            events_rx,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.source.is_active()
    }
}

impl RecognitionEngine for MicrophoneEngine {
    fn start(&mut self, language: &str) -> Result<()> {
        if self.listening {
            return Ok(());
        }

        let resampler = StreamResampler::new(self.source.sample_rate(), DICTATION_RATE)?;
        let (samples_tx, samples_rx) = unbounded();
        self.source.start(samples_tx)?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let worker = Worker {
            samples_rx,
            resampler,
            splitter: UtteranceSplitter::new(self.timing),
            pipeline: Arc::clone(&self.pipeline),
            language: language.to_string(),
            generation,
            current: Arc::clone(&self.generation),
            events_tx: self.events_tx.clone(),
        };
        std::thread::Builder::new()
            .name("dictation".into())
            .spawn(move || worker.run())
            .map_err(|e| VoxError::SpeechError(format!("Failed to spawn dictation worker: {}", e)))?;

        self.listening = true;
        info!("Dictation capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.listening {
            return;
        }
        self.listening = false;
        // Retire the running worker; it finishes without reporting
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.source.stop() {
            warn!("Failed to stop dictation capture: {}", e);
        }
        info!("Dictation capture stopped");
    }

    fn poll(&mut self) -> Vec<EngineEvent> {
        let events: Vec<EngineEvent> = self.events_rx.try_iter().collect();
        if events.iter().any(|e| matches!(e, EngineEvent::End | EngineEvent::Error(_))) {
            self.listening = false;
            if let Err(e) = self.source.stop() {
                warn!("Failed to stop dictation capture: {}", e);
            }
        }
        events
    }
}

impl Drop for MicrophoneEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    samples_rx: Receiver<Vec<f32>>,
    resampler: StreamResampler,
    splitter: UtteranceSplitter,
    pipeline: Arc<Mutex<Pipeline>>,
    language: String,
    generation: u64,
    current: Arc<AtomicU64>,
    events_tx: Sender<EngineEvent>,
}

impl Worker {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    fn run(mut self) {
        let pipeline = Arc::clone(&self.pipeline);
        let mut pipeline = pipeline.lock();
        pipeline.gate.reset();

        while self.is_current() {
            let batch = match self.samples_rx.recv_timeout(RECV_TIMEOUT) {
                Ok(batch) => batch,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    // Capture ended underneath us
                    if let Some(utterance) = self.splitter.flush() {
                        self.transcribe(&mut pipeline, Cut::Final(utterance));
                    }
                    self.report(EngineEvent::End);
                    break;
                }
            };

            let samples = match self.resampler.push(&batch) {
                Ok(samples) => samples,
                Err(e) => {
                    self.report(EngineEvent::Error(e.user_message()));
                    break;
                }
            };

            let cuts = self.splitter.push(&samples, pipeline.gate.as_mut());
            let last = cuts.len().saturating_sub(1);
            for (i, cut) in cuts.into_iter().enumerate() {
                // Skip partials that a later cut in the same batch supersedes
                if matches!(cut, Cut::Interim(_)) && i < last {
                    continue;
                }
                if !self.transcribe(&mut pipeline, cut) {
                    return;
                }
            }
        }
        debug!("Dictation worker {} finished", self.generation);
    }

    /// Returns false once the worker should give up
    fn transcribe(&self, pipeline: &mut Pipeline, cut: Cut) -> bool {
        let (samples, is_final) = match &cut {
            Cut::Interim(samples) => (samples, false),
            Cut::Final(samples) => (samples, true),
        };

        match pipeline.transcriber.transcribe(samples, &self.language) {
            Ok(text) => {
                let text = text.trim().to_string();
                // Empty partials carry nothing; empty finals still mark speech
                if !is_final && text.is_empty() {
                    return true;
                }
                debug!("Transcribed {} samples: '{}'", samples.len(), text);
                let segment = if is_final {
                    Segment::final_(text)
                } else {
                    Segment::interim(text)
                };
                self.report(EngineEvent::Results(vec![segment]));
                true
            }
            Err(e) => {
                warn!("Transcription failed: {}", e);
                self.report(EngineEvent::Error(e.user_message()));
                false
            }
        }
    }

    fn report(&self, event: EngineEvent) {
        if self.is_current() {
            let _ = self.events_tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{RecognitionEvent, SpeechRecognizer};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Instant;

    const FRAME: usize = 512;
    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Frames louder than 0.1 count as speech
    struct LoudGate;

    impl SpeechGate for LoudGate {
        fn is_speech(&mut self, frame: &[f32]) -> bool {
            frame.iter().any(|s| s.abs() > 0.1)
        }
    }

    /// Reports how many samples it was handed
    #[derive(Clone, Default)]
    struct CountingTranscriber {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Transcriber for CountingTranscriber {
        fn transcribe(&mut self, samples: &[f32], language: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(VoxError::SpeechError("model crashed".into()));
            }
            Ok(format!("{} {}", language, samples.len()))
        }
    }

    /// Plays a fixed recording, then keeps the channel open until stopped
    #[derive(Clone)]
    struct Recording {
        batches: Vec<Vec<f32>>,
        hang_up: bool,
        active: Arc<AtomicBool>,
    }

    impl Recording {
        fn new(batches: Vec<Vec<f32>>) -> Self {
            Self {
                batches,
                hang_up: false,
                active: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl AudioSource for Recording {
        fn start(&mut self, samples_tx: Sender<Vec<f32>>) -> Result<()> {
            self.active.store(true, Ordering::SeqCst);
            let active = Arc::clone(&self.active);
            let batches = self.batches.clone();
            let hang_up = self.hang_up;
            std::thread::spawn(move || {
                for batch in batches {
                    if samples_tx.send(batch).is_err() {
                        return;
                    }
                }
                while !hang_up && active.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(10));
                }
            });
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.active.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        fn sample_rate(&self) -> u32 {
            DICTATION_RATE
        }
    }

    fn timing() -> UtteranceTiming {
        UtteranceTiming {
            pause_ms: 96,
            interim_ms: 320,
            max_ms: 2000,
            min_ms: 64,
        }
    }

    fn frames(level: f32, count: usize) -> Vec<f32> {
        vec![level; FRAME * count]
    }

    fn engine(source: Recording, transcriber: CountingTranscriber) -> MicrophoneEngine {
        MicrophoneEngine::new(
            Box::new(source),
            Box::new(transcriber),
            Box::new(LoudGate),
            timing(),
        )
    }

    fn poll_until(engine: &mut MicrophoneEngine, done: impl Fn(&[EngineEvent]) -> bool) -> Vec<EngineEvent> {
        let deadline = Instant::now() + TIMEOUT;
        let mut events = Vec::new();
        while Instant::now() < deadline && !done(&events) {
            events.extend(engine.poll());
            std::thread::sleep(Duration::from_millis(10));
        }
        events
    }

    #[test]
    fn test_pause_closes_utterance() {
        let mut splitter = UtteranceSplitter::new(timing());
        let mut gate = LoudGate;

        assert!(splitter.push(&frames(0.0, 4), &mut gate).is_empty());
        assert!(splitter.push(&frames(0.5, 4), &mut gate).is_empty());
        assert!(splitter.is_in_speech());

        // 96 ms of quiet is three frames
        let cuts = splitter.push(&frames(0.0, 3), &mut gate);
        assert_eq!(cuts.len(), 1);
        match &cuts[0] {
            Cut::Final(samples) => assert_eq!(samples.len(), FRAME * 7),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!splitter.is_in_speech());
    }

    #[test]
    fn test_short_burst_is_dropped() {
        let mut splitter = UtteranceSplitter::new(timing());
        let mut gate = LoudGate;

        let mut audio = frames(0.5, 1);
        audio.extend(frames(0.0, 3));
        assert!(splitter.push(&audio, &mut gate).is_empty());
        assert!(!splitter.is_in_speech());
    }

    #[test]
    fn test_partials_while_speaking_and_length_cap() {
        let mut splitter = UtteranceSplitter::new(timing());
        let mut gate = LoudGate;

        // 320 ms is ten frames
        let cuts = splitter.push(&frames(0.5, 10), &mut gate);
        assert!(matches!(&cuts[..], [Cut::Interim(s)] if s.len() == FRAME * 10));

        // Two seconds is 62.5 frames; the cap lands on frame 63
        let cuts = splitter.push(&frames(0.5, 53), &mut gate);
        assert!(matches!(cuts.last(), Some(Cut::Final(s)) if s.len() == FRAME * 63));
        assert!(!splitter.is_in_speech());
    }

    #[test]
    fn test_engine_reports_final_transcript() {
        let mut audio = frames(0.5, 4);
        audio.extend(frames(0.0, 3));
        let source = Recording::new(audio.chunks(700).map(<[f32]>::to_vec).collect());
        let transcriber = CountingTranscriber::default();
        let mut engine = engine(source.clone(), transcriber.clone());

        engine.start("en-US").unwrap();
        assert!(engine.is_capturing());

        let events = poll_until(&mut engine, |events| !events.is_empty());
        let expected = format!("en-US {}", FRAME * 7);
        assert_eq!(
            events,
            vec![EngineEvent::Results(vec![Segment::final_(expected)])]
        );

        engine.stop();
        assert!(!source.active.load(Ordering::SeqCst));
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transcriber_failure_is_an_engine_error() {
        let mut audio = frames(0.5, 4);
        audio.extend(frames(0.0, 3));
        let source = Recording::new(vec![audio]);
        let transcriber = CountingTranscriber {
            fail: true,
            ..CountingTranscriber::default()
        };
        let mut engine = engine(source.clone(), transcriber);

        engine.start("en-US").unwrap();
        let events = poll_until(&mut engine, |events| !events.is_empty());
        assert!(matches!(&events[..], [EngineEvent::Error(_)]));
        assert!(!source.active.load(Ordering::SeqCst));
    }

    #[test]
    fn test_capture_ending_flushes_and_ends() {
        let mut source = Recording::new(vec![frames(0.5, 4)]);
        source.hang_up = true;
        let mut engine = engine(source, CountingTranscriber::default());

        engine.start("en").unwrap();
        let events = poll_until(&mut engine, |events| {
            events.iter().any(|e| matches!(e, EngineEvent::End))
        });
        assert_eq!(
            events,
            vec![
                EngineEvent::Results(vec![Segment::final_(format!("en {}", FRAME * 4))]),
                EngineEvent::End,
            ]
        );
    }

    #[test]
    fn test_dictation_through_recognizer() {
        let mut audio = frames(0.5, 4);
        audio.extend(frames(0.0, 3));
        let source = Recording::new(vec![audio]);
        let engine: Box<dyn RecognitionEngine> =
            Box::new(engine(source.clone(), CountingTranscriber::default()));
        let mut recognizer = SpeechRecognizer::new(Some(engine), &SpeechConfig::default());

        recognizer.start(Instant::now()).unwrap();
        let deadline = Instant::now() + TIMEOUT;
        let mut events = Vec::new();
        while Instant::now() < deadline && events.is_empty() {
            events.extend(recognizer.tick(Instant::now()));
            std::thread::sleep(Duration::from_millis(10));
        }

        let expected = format!("en-US {}", FRAME * 7);
        assert!(matches!(&events[..], [RecognitionEvent::Transcript(t)] if *t == expected));

        recognizer.stop();
        assert!(!source.active.load(Ordering::SeqCst));
    }
}
