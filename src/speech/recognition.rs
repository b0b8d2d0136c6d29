//! Continuous dictation on top of a pluggable recognition engine
//!
//! The recognizer is driven by [`SpeechRecognizer::tick`], which the UI calls
//! every frame. Silence is measured from the last transcript result, so a
//! speaker who keeps talking is never cut off.

use crate::config::SpeechConfig;
use crate::{Result, VoxError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One recognised span of speech
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub transcript: String,
    pub is_final: bool,
}

impl Segment {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }

    pub fn final_(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

/// What a recognition engine reports back
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A batch of results delivered together
    Results(Vec<Segment>),
    /// The engine stopped on its own (end of utterance, timeout, ...)
    End,
    Error(String),
}

/// A native speech recognition backend
pub trait RecognitionEngine {
    /// Begin continuous recognition with interim results
    fn start(&mut self, language: &str) -> Result<()>;

    fn stop(&mut self);

    /// Drain whatever the engine produced since the last call
    fn poll(&mut self) -> Vec<EngineEvent>;
}

impl<E: RecognitionEngine + ?Sized> RecognitionEngine for Box<E> {
    fn start(&mut self, language: &str) -> Result<()> {
        (**self).start(language)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn poll(&mut self) -> Vec<EngineEvent> {
        (**self).poll()
    }
}

#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// Final text of one result batch, trimmed
    Transcript(String),
    Error(VoxError),
    /// Listening finished; sent once per listening period
    Ended,
}

pub struct SpeechRecognizer<E: RecognitionEngine> {
    engine: Option<E>,
    language: String,
    silence_timeout: Duration,
    listening: bool,
    deadline: Option<Instant>,
    pending: Vec<RecognitionEvent>,
}

impl<E: RecognitionEngine> SpeechRecognizer<E> {
    pub fn new(engine: Option<E>, config: &SpeechConfig) -> Self {
        if engine.is_none() {
            info!("No speech recognition engine available");
        }
        Self {
            engine,
            language: config.language.clone(),
            silence_timeout: config.silence_timeout(),
            listening: false,
            deadline: None,
            pending: Vec::new(),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// When listening will stop if nothing more is heard
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn start(&mut self, now: Instant) -> Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(VoxError::Unsupported(
                "Speech recognition not supported".into(),
            ));
        };
        if self.listening {
            return Ok(());
        }

        engine.start(&self.language).map_err(|e| {
            warn!("Recognition engine failed to start: {}", e);
            VoxError::SpeechError("Failed to start speech recognition".into())
        })?;

        self.listening = true;
        self.deadline = Some(now + self.silence_timeout);
        info!("Dictation started ({})", self.language);
        Ok(())
    }

    /// Stop listening. Only the first call after a start reports `Ended`.
    pub fn stop(&mut self) {
        if !self.listening {
            return;
        }
        self.listening = false;
        self.deadline = None;
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
        self.pending.push(RecognitionEvent::Ended);
        info!("Dictation stopped");
    }

    pub fn toggle(&mut self, now: Instant) -> Result<()> {
        if self.listening {
            self.stop();
            Ok(())
        } else {
            self.start(now)
        }
    }

    /// Process engine output and the silence deadline
    pub fn tick(&mut self, now: Instant) -> Vec<RecognitionEvent> {
        let engine_events = self
            .engine
            .as_mut()
            .map(|engine| engine.poll())
            .unwrap_or_default();

        for event in engine_events {
            self.handle(event, now);
        }

        if self.listening && self.deadline.is_some_and(|d| now >= d) {
            debug!("Silence timeout reached");
            self.stop();
        }

        std::mem::take(&mut self.pending)
    }

    fn handle(&mut self, event: EngineEvent, now: Instant) {
        match event {
            EngineEvent::Results(segments) => {
                if !self.listening {
                    return;
                }

                // Any final segment counts as speech, even an empty one
                let heard = segments
                    .iter()
                    .any(|s| s.is_final || !s.transcript.is_empty());
                if heard {
                    self.deadline = Some(now + self.silence_timeout);
                }

                let mut finals = String::new();
                for segment in segments.iter().filter(|s| s.is_final) {
                    finals.push_str(&segment.transcript);
                    finals.push(' ');
                }
                let finals = finals.trim();
                if !finals.is_empty() {
                    self.pending
                        .push(RecognitionEvent::Transcript(finals.to_string()));
                }
            }
            EngineEvent::End => {
                if !self.listening {
                    return;
                }
                debug!("Recognition engine ended, restarting");
                let language = self.language.clone();
                let restarted = self
                    .engine
                    .as_mut()
                    .map(|engine| engine.start(&language))
                    .unwrap_or(Ok(()));
                if let Err(e) = restarted {
                    self.pending.push(RecognitionEvent::Error(e));
                    self.stop();
                }
            }
            EngineEvent::Error(message) => {
                warn!("Speech recognition error: {}", message);
                self.pending
                    .push(RecognitionEvent::Error(VoxError::SpeechError(message)));
                self.stop();
            }
        }
    }
}

impl<E: RecognitionEngine> Drop for SpeechRecognizer<E> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    struct Script {
        queued: VecDeque<EngineEvent>,
        starts: usize,
        stops: usize,
    }

    #[derive(Clone, Default)]
    struct ScriptedEngine(Arc<Mutex<Script>>);

    impl ScriptedEngine {
        fn push(&self, event: EngineEvent) {
            self.0.lock().queued.push_back(event);
        }
    }

    impl RecognitionEngine for ScriptedEngine {
        fn start(&mut self, _language: &str) -> Result<()> {
            self.0.lock().starts += 1;
            Ok(())
        }

        fn stop(&mut self) {
            self.0.lock().stops += 1;
        }

        fn poll(&mut self) -> Vec<EngineEvent> {
            self.0.lock().queued.drain(..).collect()
        }
    }

    fn recognizer() -> (SpeechRecognizer<ScriptedEngine>, ScriptedEngine) {
        let engine = ScriptedEngine::default();
        (
            SpeechRecognizer::new(Some(engine.clone()), &SpeechConfig::default()),
            engine,
        )
    }

    fn ended_count(events: &[RecognitionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, RecognitionEvent::Ended))
            .count()
    }

    #[test]
    fn test_unsupported_without_engine() {
        let mut rec: SpeechRecognizer<ScriptedEngine> =
            SpeechRecognizer::new(None, &SpeechConfig::default());
        assert!(!rec.is_supported());
        assert!(matches!(
            rec.start(Instant::now()),
            Err(VoxError::Unsupported(_))
        ));
        assert!(!rec.is_listening());
    }

    #[test]
    fn test_final_segments_are_joined() {
        let (mut rec, engine) = recognizer();
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        engine.push(EngineEvent::Results(vec![
            Segment::final_("hello"),
            Segment::final_(" world"),
            Segment::interim("and"),
        ]));
        let events = rec.tick(t0 + Duration::from_millis(10));
        match events.as_slice() {
            [RecognitionEvent::Transcript(text)] => assert_eq!(text, "hello world"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_result_rearms_silence_deadline() {
        let (mut rec, engine) = recognizer();
        let t0 = Instant::now();
        rec.start(t0).unwrap();
        assert_eq!(rec.deadline(), Some(t0 + Duration::from_millis(1500)));

        let t1 = t0 + Duration::from_millis(1200);
        engine.push(EngineEvent::Results(vec![Segment::final_("still talking")]));
        rec.tick(t1);
        assert_eq!(rec.deadline(), Some(t1 + Duration::from_millis(1500)));

        // Past the original deadline but not the re-armed one
        rec.tick(t0 + Duration::from_millis(2000));
        assert!(rec.is_listening());

        let events = rec.tick(t1 + Duration::from_millis(1500));
        assert!(!rec.is_listening());
        assert_eq!(ended_count(&events), 1);
    }

    #[test]
    fn test_interim_results_also_rearm() {
        let (mut rec, engine) = recognizer();
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        let t1 = t0 + Duration::from_millis(1000);
        engine.push(EngineEvent::Results(vec![Segment::interim("um")]));
        let events = rec.tick(t1);
        assert!(events.is_empty());
        assert_eq!(rec.deadline(), Some(t1 + Duration::from_millis(1500)));
    }

    #[test]
    fn test_empty_final_segment_rearms() {
        let (mut rec, engine) = recognizer();
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        engine.push(EngineEvent::Results(vec![Segment::final_("")]));
        let events = rec.tick(t0 + Duration::from_millis(1000));
        assert!(events.is_empty());
        assert_eq!(rec.deadline(), Some(t0 + Duration::from_millis(2500)));

        rec.tick(t0 + Duration::from_millis(1600));
        assert!(rec.is_listening());
    }

    #[test]
    fn test_empty_interim_does_not_rearm() {
        let (mut rec, engine) = recognizer();
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        engine.push(EngineEvent::Results(vec![Segment::interim("")]));
        rec.tick(t0 + Duration::from_millis(1000));
        assert_eq!(rec.deadline(), Some(t0 + Duration::from_millis(1500)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut rec, engine) = recognizer();
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        rec.stop();
        rec.stop();
        // The engine's own end notification after stop is not a second Ended
        engine.push(EngineEvent::End);
        let events = rec.tick(t0);

        assert_eq!(ended_count(&events), 1);
        assert_eq!(engine.0.lock().stops, 1);
        assert_eq!(engine.0.lock().starts, 1);
    }

    #[test]
    fn test_engine_end_restarts_while_listening() {
        let (mut rec, engine) = recognizer();
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        engine.push(EngineEvent::End);
        let events = rec.tick(t0 + Duration::from_millis(100));

        assert!(events.is_empty());
        assert!(rec.is_listening());
        assert_eq!(engine.0.lock().starts, 2);
    }

    #[test]
    fn test_engine_error_stops_listening() {
        let (mut rec, engine) = recognizer();
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        engine.push(EngineEvent::Error("network".into()));
        let events = rec.tick(t0);

        assert!(matches!(events[0], RecognitionEvent::Error(VoxError::SpeechError(_))));
        assert_eq!(ended_count(&events), 1);
        assert!(!rec.is_listening());
    }

    #[test]
    fn test_each_listening_period_ends_once() {
        let (mut rec, _engine) = recognizer();
        let t0 = Instant::now();

        rec.toggle(t0).unwrap();
        rec.toggle(t0).unwrap();
        rec.toggle(t0).unwrap();
        rec.stop();

        assert_eq!(ended_count(&rec.tick(t0)), 2);
    }
}
