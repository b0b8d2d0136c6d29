//! Voice session over WebSocket
//!
//! The microphone is acquired before anything is opened and released on
//! every way a session can end. Captured audio is resampled, cut into fixed
//! PCM16 frames and forwarded only while the socket is open. An unexpected
//! close ends the session; the user has to start a new one.

use super::{ConnectionState, SharedState};
use crate::audio::{FrameSlicer, StreamResampler};
use crate::config::VoiceConfig;
use crate::messages::{ChatMode, Message};
use crate::{Result, VoxError};
use base64::Engine;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// A capture device feeding mono f32 samples
pub trait AudioSource {
    /// Begin capture, sending sample batches to `samples_tx`
    fn start(&mut self, samples_tx: Sender<Vec<f32>>) -> Result<()>;

    /// End capture and drop the sender handed to `start`. Must be idempotent.
    fn stop(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;

    fn sample_rate(&self) -> u32;
}

/// JSON payload sent by the voice endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VoicePayload {
    #[serde(default)]
    pub user_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub audio_base64: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl VoicePayload {
    /// Translate one payload into the events it stands for
    pub fn into_events(self) -> Vec<VoiceEvent> {
        if let Some(error) = non_empty(self.error) {
            let text = non_empty(self.text).unwrap_or_else(|| error.clone());
            return vec![VoiceEvent::ServerError {
                message: Message::assistant(text),
                error,
            }];
        }

        let mut events = Vec::new();
        if let Some(user_text) = non_empty(self.user_text) {
            events.push(VoiceEvent::Transcript(Message::user(user_text)));
        }

        if let Some(text) = non_empty(self.text) {
            let mut decode_error = None;
            let audio = non_empty(self.audio_base64).and_then(|encoded| {
                match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        decode_error = Some(VoxError::DecodeError(format!("Invalid reply audio: {}", e)));
                        None
                    }
                }
            });
            events.push(VoiceEvent::Reply {
                message: Message::assistant(text),
                audio,
            });
            if let Some(e) = decode_error {
                events.push(VoiceEvent::Error(e));
            }
        }

        events
    }
}

#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// Socket open and handshake sent
    Connected,

    /// What the service heard the user say
    Transcript(Message),

    /// Assistant reply, with encoded audio to play right away
    Reply { message: Message, audio: Option<Vec<u8>> },

    /// The service reported a failure for the last turn
    ServerError { message: Message, error: String },

    /// Local or transport failure
    Error(VoxError),

    /// The session is over
    Closed { by_user: bool },
}

/// Owned handle to a running voice session
pub struct VoiceSession {
    state: SharedState,
    source: Option<Box<dyn AudioSource>>,
    event_rx: Receiver<VoiceEvent>,
    shutdown: watch::Sender<bool>,
    mode: ChatMode,
    stopped: bool,
}

impl VoiceSession {
    /// Acquire the microphone, then connect and hand-shake in the background
    pub fn start(
        config: &VoiceConfig,
        user_id: &str,
        mode: ChatMode,
        mut source: Box<dyn AudioSource>,
        runtime: &Handle,
    ) -> Result<Self> {
        let resampler = StreamResampler::new(source.sample_rate(), config.sample_rate)?;
        let slicer = FrameSlicer::new(config.sample_rate, config.slice_ms);

        let (samples_tx, samples_rx) = bounded(64);
        source.start(samples_tx).map_err(|e| match e {
            VoxError::AudioDeviceError(_) => e,
            other => VoxError::AudioDeviceError(other.to_string()),
        })?;

        let state = SharedState::new(ConnectionState::Connecting);
        let (event_tx, event_rx) = unbounded();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        spawn_frame_pump(samples_rx, resampler, slicer, state.clone(), frames_tx);

        runtime.spawn(run(
            config.ws_url.clone(),
            serde_json::json!({ "user_id": user_id, "mode": mode }).to_string(),
            state.clone(),
            event_tx,
            frames_rx,
            shutdown_rx,
        ));

        info!("Voice session starting for mode {}", mode.as_str());
        Ok(Self {
            state,
            source: Some(source),
            event_rx,
            shutdown,
            mode,
            stopped: false,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    /// Still usable: not stopped and the socket has not closed
    pub fn is_active(&self) -> bool {
        !self.stopped && self.state.get() != ConnectionState::Closed
    }

    pub fn is_microphone_active(&self) -> bool {
        self.source.as_ref().map(|s| s.is_active()).unwrap_or(false)
    }

    /// Drain pending events. Seeing `Closed` releases the microphone.
    pub fn poll_events(&mut self) -> Vec<VoiceEvent> {
        let events: Vec<VoiceEvent> = self.event_rx.try_iter().collect();
        if events.iter().any(|e| matches!(e, VoiceEvent::Closed { .. })) {
            self.release_microphone();
            self.stopped = true;
        }
        events
    }

    /// End the session. Safe to call any number of times.
    pub fn stop(&mut self) {
        if !self.stopped {
            info!("Stopping voice session");
            self.stopped = true;
            if self.state.get() != ConnectionState::Closed {
                self.state.set(ConnectionState::Closing);
            }
        }
        let _ = self.shutdown.send(true);
        self.release_microphone();
    }

    fn release_microphone(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.stop() {
                warn!("Failed to stop microphone cleanly: {}", e);
            }
            debug!("Microphone released");
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resample and slice capture on a plain thread; forward frames while open
fn spawn_frame_pump(
    samples_rx: Receiver<Vec<f32>>,
    mut resampler: StreamResampler,
    mut slicer: FrameSlicer,
    state: SharedState,
    frames_tx: mpsc::UnboundedSender<Vec<u8>>,
) {
    std::thread::spawn(move || {
        debug!("Voice frame pump started");
        loop {
            match samples_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(batch) => {
                    let resampled = match resampler.push(&batch) {
                        Ok(samples) => samples,
                        Err(e) => {
                            error!("Dropping captured audio: {}", e);
                            continue;
                        }
                    };
                    for frame in slicer.push(&resampled) {
                        if state.is_open() && frames_tx.send(frame).is_err() {
                            break;
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if frames_tx.is_closed() {
                break;
            }
        }
        debug!("Voice frame pump finished");
    });
}

async fn run(
    url: String,
    handshake: String,
    state: SharedState,
    events: Sender<VoiceEvent>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let by_user = session(&url, handshake, &state, &events, &mut frames, &mut shutdown).await;
    state.set(ConnectionState::Closed);
    info!("Voice session closed (by user: {})", by_user);
    let _ = events.send(VoiceEvent::Closed { by_user });
}

/// Returns `true` when the owner ended the session
async fn session(
    url: &str,
    handshake: String,
    state: &SharedState,
    events: &Sender<VoiceEvent>,
    frames: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    let connected = tokio::select! {
        res = tokio_tungstenite::connect_async(url) => res,
        _ = shutdown.changed() => return true,
    };
    let ws = match connected {
        Ok((ws, _)) => ws,
        Err(e) => {
            error!("Voice connect failed: {}", e);
            let _ = events.send(VoiceEvent::Error(VoxError::TransportError(format!(
                "Failed to connect to voice service: {}",
                e
            ))));
            return false;
        }
    };
    let (mut write, mut read) = ws.split();

    if let Err(e) = write.send(WsMessage::Text(handshake)).await {
        let _ = events.send(VoiceEvent::Error(e.into()));
        return false;
    }
    state.set(ConnectionState::Open);
    let _ = events.send(VoiceEvent::Connected);
    info!("Voice session open");

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<VoicePayload>(&text) {
                        Ok(payload) => {
                            for event in payload.into_events() {
                                let _ = events.send(event);
                            }
                        }
                        Err(e) => {
                            warn!("Unreadable voice payload: {}", e);
                            let _ = events.send(VoiceEvent::Error(e.into()));
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Voice socket closed by server");
                    return false;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Voice socket error: {}", e);
                    let _ = events.send(VoiceEvent::Error(e.into()));
                    return false;
                }
            },
            Some(frame) = frames.recv() => {
                if let Err(e) = write.send(WsMessage::Binary(frame)).await {
                    warn!("Failed to send audio frame: {}", e);
                    let _ = events.send(VoiceEvent::Error(e.into()));
                    return false;
                }
            }
            _ = shutdown.changed() => {
                state.set(ConnectionState::Closing);
                let _ = write.send(WsMessage::Close(None)).await;
                return true;
            }
        }
    }
}
