//! Real-time transports to the VoxAI service
//!
//! - [`chat_stream`]: streamed HTTP replies, never retried
//! - [`chat_socket`]: generic chat WebSocket, reconnects after a fixed delay
//! - [`voice`]: voice session socket, terminal on unexpected close

pub mod chat_socket;
pub mod chat_stream;
pub mod voice;

pub use chat_socket::{ChatSocket, ChatSocketEvent, ServerFrame, StreamAssembler};
pub use chat_stream::{drive_stream, ChatStreamer, StreamEvent, StreamSink};
pub use voice::{AudioSource, VoiceEvent, VoicePayload, VoiceSession};

use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of a socket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Connection state shared between a socket task and its owner
#[derive(Debug, Clone)]
pub struct SharedState(Arc<RwLock<ConnectionState>>);

impl SharedState {
    pub fn new(initial: ConnectionState) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    pub fn get(&self) -> ConnectionState {
        *self.0.read()
    }

    pub fn set(&self, state: ConnectionState) {
        *self.0.write() = state;
    }

    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }
}
