//! Generic chat WebSocket with automatic reconnect
//!
//! Unlike the voice session, an unexpected close here is not terminal: the
//! socket reports `Disconnected` and tries again after the configured delay
//! until [`ChatSocket::disconnect`] is called.

use super::{ConnectionState, SharedState};
use crate::config::ChatSocketConfig;
use crate::messages::{Message, Role};
use crate::VoxError;
use crate::api::parse_timestamp;
use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// JSON frames sent by the chat socket server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    StreamStart {
        #[serde(default)]
        id: Option<String>,
    },
    StreamChunk {
        #[serde(default)]
        content: String,
    },
    StreamEnd {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    Message {
        #[serde(default = "assistant_role")]
        role: Role,
        content: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

fn assistant_role() -> Role {
    Role::Assistant
}

/// Result of feeding one frame to a [`StreamAssembler`]
#[derive(Debug, Clone, PartialEq)]
pub enum Assembled {
    Started,
    /// The text streamed so far
    Partial(String),
    /// A complete message, either reassembled or received whole
    Message(Message),
    ServerError(String),
}

/// Reassembles `stream_*` frames into one final message
#[derive(Debug, Default)]
pub struct StreamAssembler {
    buffer: String,
    streaming: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn apply(&mut self, frame: ServerFrame) -> Assembled {
        match frame {
            ServerFrame::StreamStart { .. } => {
                self.streaming = true;
                self.buffer.clear();
                Assembled::Started
            }
            ServerFrame::StreamChunk { content } => {
                self.streaming = true;
                self.buffer.push_str(&content);
                Assembled::Partial(self.buffer.clone())
            }
            ServerFrame::StreamEnd {
                content,
                id,
                timestamp,
            } => {
                let mut text = std::mem::take(&mut self.buffer);
                if let Some(tail) = content {
                    text.push_str(&tail);
                }
                self.streaming = false;
                Assembled::Message(build_message(Role::Assistant, text, id, timestamp))
            }
            ServerFrame::Message {
                role,
                content,
                id,
                timestamp,
            } => Assembled::Message(build_message(role, content, id, timestamp)),
            ServerFrame::Error { message } => {
                Assembled::ServerError(message.unwrap_or_else(|| "Unknown server error".into()))
            }
        }
    }
}

fn build_message(role: Role, content: String, id: Option<String>, timestamp: Option<String>) -> Message {
    let mut message = Message::new(role, content);
    if let Some(id) = id {
        message.id = id;
    }
    if let Some(ts) = timestamp.as_deref().and_then(parse_timestamp) {
        message.timestamp = Some(ts);
    }
    message
}

/// Events emitted by a [`ChatSocket`]
#[derive(Debug, Clone)]
pub enum ChatSocketEvent {
    Connected,
    Disconnected,
    StreamStarted,
    StreamDelta(String),
    Message(Message),
    ServerError(String),
    Error(VoxError),
}

/// Owned handle to a reconnecting chat socket
pub struct ChatSocket {
    state: SharedState,
    outgoing: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
    event_rx: Receiver<ChatSocketEvent>,
    task: Option<JoinHandle<()>>,
}

impl ChatSocket {
    /// Start connecting in the background
    pub fn connect(config: &ChatSocketConfig, runtime: &Handle) -> Self {
        let state = SharedState::new(ConnectionState::Connecting);
        let (event_tx, event_rx) = unbounded();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = runtime.spawn(run(
            config.url.clone(),
            config.reconnect_delay(),
            state.clone(),
            event_tx,
            outgoing_rx,
            shutdown_rx,
        ));

        Self {
            state,
            outgoing,
            shutdown,
            event_rx,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_open()
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<ChatSocketEvent> {
        self.event_rx.clone()
    }

    /// Queue a user message. Returns `false` when the socket is not open.
    pub fn send_message(
        &self,
        content: &str,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> bool {
        if !self.state.is_open() {
            warn!("Chat socket is not connected");
            return false;
        }

        let mut frame = serde_json::Map::new();
        frame.insert("type".into(), "user_message".into());
        frame.insert("content".into(), content.into());
        frame.insert("timestamp".into(), Utc::now().to_rfc3339().into());
        if let Some(extra) = metadata {
            frame.extend(extra);
        }

        self.outgoing
            .send(serde_json::Value::Object(frame).to_string())
            .is_ok()
    }

    /// Close the socket and cancel any pending reconnect. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        let _ = self.shutdown.send(true);
        if self.task.take().is_some() {
            info!("Chat socket disconnect requested");
        }
        if self.state.get() != ConnectionState::Closed {
            self.state.set(ConnectionState::Closing);
        }
    }
}

impl Drop for ChatSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run(
    url: String,
    reconnect_delay: Duration,
    state: SharedState,
    events: Sender<ChatSocketEvent>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        state.set(ConnectionState::Connecting);
        debug!("Connecting chat socket to {}", url);

        let connected = tokio::select! {
            res = tokio_tungstenite::connect_async(url.as_str()) => res,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok((ws, _)) => {
                state.set(ConnectionState::Open);
                info!("Chat socket connected");
                let _ = events.send(ChatSocketEvent::Connected);

                let user_closed = session(ws, &state, &events, &mut outgoing, &mut shutdown).await;
                if user_closed {
                    break;
                }
            }
            Err(e) => {
                error!("Chat socket connect failed: {}", e);
                let _ = events.send(ChatSocketEvent::Error(e.into()));
            }
        }

        state.set(ConnectionState::Closed);
        let _ = events.send(ChatSocketEvent::Disconnected);

        // Messages queued for a dead connection are dropped
        while outgoing.try_recv().is_ok() {}

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {
                info!("Attempting to reconnect chat socket");
            }
            _ = shutdown.changed() => break,
        }
    }

    state.set(ConnectionState::Closed);
    debug!("Chat socket task finished");
}

/// Serve one connection. Returns `true` when the owner asked to close.
async fn session<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    state: &SharedState,
    events: &Sender<ChatSocketEvent>,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();
    let mut assembler = StreamAssembler::new();

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    handle_frame(&text, &mut assembler, events);
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Chat socket closed by server");
                    return false;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Chat socket error: {}", e);
                    let _ = events.send(ChatSocketEvent::Error(e.into()));
                    return false;
                }
            },
            Some(frame) = outgoing.recv() => {
                if let Err(e) = write.send(WsMessage::Text(frame)).await {
                    warn!("Chat socket send failed: {}", e);
                    let _ = events.send(ChatSocketEvent::Error(e.into()));
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

fn handle_frame(text: &str, assembler: &mut StreamAssembler, events: &Sender<ChatSocketEvent>) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to parse chat socket frame: {}", e);
            return;
        }
    };

    let event = match assembler.apply(frame) {
        Assembled::Started => ChatSocketEvent::StreamStarted,
        Assembled::Partial(text) => ChatSocketEvent::StreamDelta(text),
        Assembled::Message(message) => ChatSocketEvent::Message(message),
        Assembled::ServerError(message) => {
            error!("Chat socket server error: {}", message);
            ChatSocketEvent::ServerError(message)
        }
    };
    let _ = events.send(event);
}
