//! Streamed replies over HTTP
//!
//! Chunks are forwarded in arrival order and only the accumulated text is
//! ever persisted. Exactly one of complete/error ends each stream; there is
//! no retry.

use crate::api::client::ChunkStream;
use crate::api::ApiClient;
use crate::messages::ChatMode;
use crate::{Result, VoxError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Receiver of one streamed reply
pub trait StreamSink {
    fn on_chunk(&mut self, chunk: &str);
    fn on_complete(&mut self, full_text: String);
    fn on_error(&mut self, error: VoxError);
}

/// Pump `stream` into `sink`. Returns the full text when the stream completed.
pub async fn drive_stream<S, K>(stream: S, sink: &mut K) -> Option<String>
where
    S: Stream<Item = Result<String>>,
    K: StreamSink + ?Sized,
{
    futures::pin_mut!(stream);
    let mut full_text = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                full_text.push_str(&chunk);
                sink.on_chunk(&chunk);
            }
            Err(e) => {
                warn!("Stream failed after {} bytes: {}", full_text.len(), e);
                sink.on_error(e);
                return None;
            }
        }
    }

    sink.on_complete(full_text.clone());
    Some(full_text)
}

/// Events reported by [`ChatStreamer`]
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A display-only fragment
    Chunk { request_id: Uuid, text: String },

    /// The stream ended normally
    Complete { request_id: Uuid, full_text: String },

    /// The stream could not be opened or broke off
    Failed { request_id: Uuid, error: VoxError },
}

impl StreamEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            StreamEvent::Chunk { request_id, .. }
            | StreamEvent::Complete { request_id, .. }
            | StreamEvent::Failed { request_id, .. } => *request_id,
        }
    }
}

struct ChannelSink {
    request_id: Uuid,
    tx: Sender<StreamEvent>,
}

impl StreamSink for ChannelSink {
    fn on_chunk(&mut self, chunk: &str) {
        let _ = self.tx.send(StreamEvent::Chunk {
            request_id: self.request_id,
            text: chunk.to_string(),
        });
    }

    fn on_complete(&mut self, full_text: String) {
        let _ = self.tx.send(StreamEvent::Complete {
            request_id: self.request_id,
            full_text,
        });
    }

    fn on_error(&mut self, error: VoxError) {
        let _ = self.tx.send(StreamEvent::Failed {
            request_id: self.request_id,
            error,
        });
    }
}

/// Runs streamed sends on a tokio runtime and reports over a channel
pub struct ChatStreamer {
    runtime: Handle,
    event_tx: Sender<StreamEvent>,
    event_rx: Receiver<StreamEvent>,
    active: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl ChatStreamer {
    pub fn new(runtime: Handle) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            runtime,
            event_tx,
            event_rx,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<StreamEvent> {
        self.event_rx.clone()
    }

    /// Stream the reply to `content` in an existing chat
    pub fn send(&self, api: Arc<ApiClient>, chat_id: String, content: String, mode: ChatMode) -> Uuid {
        self.start_with(async move { api.stream_message(&chat_id, &content, mode).await })
    }

    /// Drive whatever stream `open` resolves to
    pub fn start_with<F>(&self, open: F) -> Uuid
    where
        F: Future<Output = Result<ChunkStream>> + Send + 'static,
    {
        let request_id = Uuid::new_v4();
        let tx = self.event_tx.clone();
        let active = Arc::clone(&self.active);

        // Holding the lock across spawn keeps the task from unregistering before it is registered
        let mut guard = self.active.lock();
        let handle = self.runtime.spawn(async move {
            let mut sink = ChannelSink { request_id, tx };
            match open.await {
                Ok(stream) => {
                    if let Some(text) = drive_stream(stream, &mut sink).await {
                        debug!("Request {} completed with {} chars", request_id, text.len());
                    }
                }
                Err(e) => {
                    warn!("Could not open stream {}: {}", request_id, e);
                    sink.on_error(e);
                }
            }
            active.lock().remove(&request_id);
        });
        guard.insert(request_id, handle);
        drop(guard);

        info!("Started streamed request {}", request_id);
        request_id
    }

    /// Stop consuming a stream. Returns `false` when it had already finished.
    pub fn cancel(&self, request_id: Uuid) -> bool {
        match self.active.lock().remove(&request_id) {
            Some(handle) => {
                handle.abort();
                info!("Cancelled streamed request {}", request_id);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, request_id: Uuid) -> bool {
        self.active.lock().contains_key(&request_id)
    }
}

impl Drop for ChatStreamer {
    fn drop(&mut self) {
        for (_, handle) in self.active.lock().drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        chunks: Vec<String>,
        completed: Vec<String>,
        errors: usize,
    }

    impl StreamSink for Recorder {
        fn on_chunk(&mut self, chunk: &str) {
            self.chunks.push(chunk.to_string());
        }
        fn on_complete(&mut self, full_text: String) {
            self.completed.push(full_text);
        }
        fn on_error(&mut self, _error: VoxError) {
            self.errors += 1;
        }
    }

    #[tokio::test]
    async fn test_chunks_accumulate_into_one_completion() {
        let stream = futures::stream::iter(vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
        let mut sink = Recorder::default();

        let full = drive_stream(stream, &mut sink).await;
        assert_eq!(full.as_deref(), Some("Hello"));
        assert_eq!(sink.chunks, vec!["Hel", "lo"]);
        assert_eq!(sink.completed, vec!["Hello"]);
        assert_eq!(sink.errors, 0);
    }

    #[tokio::test]
    async fn test_error_ends_without_completion() {
        let stream = futures::stream::iter(vec![
            Ok("Hel".to_string()),
            Err(VoxError::TransportError("reset".into())),
            Ok("never".to_string()),
        ]);
        let mut sink = Recorder::default();

        assert!(drive_stream(stream, &mut sink).await.is_none());
        assert_eq!(sink.chunks, vec!["Hel"]);
        assert!(sink.completed.is_empty());
        assert_eq!(sink.errors, 1);
    }

    #[test]
    fn test_streamer_reports_over_channel() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let streamer = ChatStreamer::new(runtime.handle().clone());
        let events = streamer.event_receiver();

        let id = streamer.start_with(async {
            let chunks: Vec<Result<String>> = vec![Ok("Hel".to_string()), Ok("lo".to_string())];
            Ok::<ChunkStream, VoxError>(futures::stream::iter(chunks).boxed())
        });

        let mut received = Vec::new();
        while let Ok(event) = events.recv_timeout(Duration::from_secs(2)) {
            assert_eq!(event.request_id(), id);
            let done = matches!(event, StreamEvent::Complete { .. });
            received.push(event);
            if done {
                break;
            }
        }

        assert_eq!(received.len(), 3);
        match received.last() {
            Some(StreamEvent::Complete { full_text, .. }) => assert_eq!(full_text, "Hello"),
            other => panic!("unexpected last event {:?}", other),
        }
    }

    #[test]
    fn test_open_failure_reports_failed() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let streamer = ChatStreamer::new(runtime.handle().clone());
        let events = streamer.event_receiver();

        let id = streamer.start_with(async {
            Err::<ChunkStream, VoxError>(VoxError::ApiError {
                status: 404,
                detail: "Chat not found".into(),
            })
        });

        match events.recv_timeout(Duration::from_secs(2)).unwrap() {
            StreamEvent::Failed { request_id, error } => {
                assert_eq!(request_id, id);
                assert_eq!(error.user_message(), "Chat not found");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_cancel_stops_consumption() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let streamer = ChatStreamer::new(runtime.handle().clone());
        let events = streamer.event_receiver();

        let id = streamer.start_with(async {
            let slow = futures::stream::unfold(0u32, |n| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Some((Ok::<String, VoxError>(format!("{} ", n)), n + 1))
            });
            Ok::<ChunkStream, VoxError>(slow.boxed())
        });

        assert!(matches!(
            events.recv_timeout(Duration::from_secs(2)),
            Ok(StreamEvent::Chunk { .. })
        ));
        assert!(streamer.cancel(id));
        assert!(!streamer.cancel(id));
        assert!(!streamer.is_active(id));

        // Drain anything already queued, then nothing more arrives
        std::thread::sleep(Duration::from_millis(20));
        while events.try_recv().is_ok() {}
        assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
