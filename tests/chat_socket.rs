//! Reconnecting chat socket against a local WebSocket server

mod common;

use common::wait_for;
use crossbeam_channel::{unbounded, Receiver};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use voxai::config::ChatSocketConfig;
use voxai::transport::{ChatSocket, ChatSocketEvent, ConnectionState};

const TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT: Duration = Duration::from_millis(100);
const SLOW_RECONNECT: Duration = Duration::from_millis(500);

/// Server that streams one reply on the first connection, then drops it.
/// Later connections stay open and echo back what they receive.
fn start_server(runtime: &Runtime) -> (String, Arc<AtomicUsize>, Receiver<serde_json::Value>) {
    let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
    let url = format!("ws://{}/ws/chat", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = unbounded();

    let counter = Arc::clone(&accepted);
    runtime.spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                if n == 0 {
                    for frame in [
                        r#"{"type":"stream_start"}"#,
                        r#"{"type":"stream_chunk","content":"Hel"}"#,
                        r#"{"type":"stream_chunk","content":"lo"}"#,
                        r#"{"type":"stream_end","id":"m1"}"#,
                    ] {
                        ws.send(WsMessage::Text(frame.into())).await.unwrap();
                    }
                    let _ = ws.send(WsMessage::Close(None)).await;
                    return;
                }
                while let Some(Ok(message)) = ws.next().await {
                    if let WsMessage::Text(text) = message {
                        let _ = tx.send(serde_json::from_str(&text).unwrap());
                    }
                }
            });
        }
    });

    (url, accepted, rx)
}

fn config(url: &str, reconnect: Duration) -> ChatSocketConfig {
    ChatSocketConfig {
        url: url.to_string(),
        reconnect_delay_ms: reconnect.as_millis() as u64,
    }
}

#[test]
fn test_stream_then_reconnect() {
    let runtime = Runtime::new().unwrap();
    let (url, accepted, received) = start_server(&runtime);
    let mut socket = ChatSocket::connect(&config(&url, RECONNECT), runtime.handle());
    let events = socket.event_receiver();

    let mut seen = Vec::new();
    wait_for(TIMEOUT, || {
        seen.extend(events.try_iter());
        let connects = seen
            .iter()
            .filter(|e| matches!(e, ChatSocketEvent::Connected))
            .count();
        (connects >= 2).then_some(())
    })
    .expect("socket did not reconnect");

    assert!(matches!(seen[0], ChatSocketEvent::Connected));
    assert!(matches!(seen[1], ChatSocketEvent::StreamStarted));
    assert!(matches!(&seen[2], ChatSocketEvent::StreamDelta(t) if t == "Hel"));
    assert!(matches!(&seen[3], ChatSocketEvent::StreamDelta(t) if t == "Hello"));
    assert!(matches!(&seen[4], ChatSocketEvent::Message(m) if m.content == "Hello" && m.id == "m1"));
    assert!(seen.iter().any(|e| matches!(e, ChatSocketEvent::Disconnected)));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);

    wait_for(TIMEOUT, || socket.is_connected().then_some(())).expect("not open");
    assert!(socket.send_message("hi again", None));
    let frame = received.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(frame["type"], "user_message");
    assert_eq!(frame["content"], "hi again");
    assert!(frame["timestamp"].is_string());

    socket.disconnect();
    wait_for(TIMEOUT, || (socket.state() == ConnectionState::Closed).then_some(()))
        .expect("socket did not close");
    assert!(!socket.send_message("too late", None));
}

#[test]
fn test_disconnect_cancels_pending_reconnect() {
    let runtime = Runtime::new().unwrap();
    let (url, accepted, _received) = start_server(&runtime);
    let mut socket = ChatSocket::connect(&config(&url, SLOW_RECONNECT), runtime.handle());
    let events = socket.event_receiver();

    wait_for(TIMEOUT, || {
        events
            .try_iter()
            .any(|e| matches!(e, ChatSocketEvent::Disconnected))
            .then_some(())
    })
    .expect("first connection never dropped");

    // Inside the reconnect delay
    socket.disconnect();
    std::thread::sleep(SLOW_RECONNECT * 2);

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert!(events
        .try_iter()
        .all(|e| !matches!(e, ChatSocketEvent::Connected)));
    assert_eq!(socket.state(), ConnectionState::Closed);
}

#[test]
fn test_send_while_connecting_is_refused() {
    let runtime = Runtime::new().unwrap();
    let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
    let url = format!("ws://{}/ws/chat", listener.local_addr().unwrap());
    drop(listener);

    let mut socket = ChatSocket::connect(&config(&url, RECONNECT), runtime.handle());
    assert!(!socket.send_message("hello?", None));

    let events = socket.event_receiver();
    let failed = wait_for(TIMEOUT, || {
        events
            .try_iter()
            .any(|e| matches!(e, ChatSocketEvent::Error(_)))
            .then_some(())
    });
    assert!(failed.is_some());
    socket.disconnect();
}
