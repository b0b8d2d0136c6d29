//! Streamed replies against a local HTTP stub

mod common;

use common::{wait_for, HttpStub, Reply};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use voxai::api::ApiClient;
use voxai::config::ClientConfig;
use voxai::messages::{ChatMode, Role};
use voxai::session::{SessionContext, User};
use voxai::transport::{ChatStreamer, StreamEvent};
use voxai::ui::AppState;
use voxai::VoxError;

const TIMEOUT: Duration = Duration::from_secs(5);

fn collect_until_done(streamer: &ChatStreamer) -> Vec<StreamEvent> {
    let rx = streamer.event_receiver();
    let mut events = Vec::new();
    wait_for(TIMEOUT, || {
        events.extend(rx.try_iter());
        events
            .iter()
            .any(|e| !matches!(e, StreamEvent::Chunk { .. }))
            .then_some(())
    })
    .expect("stream did not finish");
    events
}

#[test]
fn test_chunks_arrive_in_order_and_complete_once() {
    let runtime = Runtime::new().unwrap();
    let stub = HttpStub::start(&runtime, |_| Reply::sse(&["Hel", "lo", "[DONE]"]));
    let api = Arc::new(ApiClient::new(&ClientConfig::default().with_api_url(stub.base_url())).unwrap());

    let streamer = ChatStreamer::new(runtime.handle().clone());
    let id = streamer.send(api, "c1".into(), "hi".into(), ChatMode::Smart);
    let events = collect_until_done(&streamer);

    let chunks: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["Hel", "lo"]);

    let finals: Vec<&StreamEvent> = events
        .iter()
        .filter(|e| !matches!(e, StreamEvent::Chunk { .. }))
        .collect();
    assert_eq!(finals.len(), 1);
    match finals[0] {
        StreamEvent::Complete { request_id, full_text } => {
            assert_eq!(*request_id, id);
            assert_eq!(full_text, "Hello");
        }
        other => panic!("unexpected {:?}", other),
    }

    let request = stub.requests.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/v1/chat/c1/stream");
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["content"], "hi");
    assert_eq!(body["mode"], "smart");
}

#[test]
fn test_http_error_fails_stream_with_detail() {
    let runtime = Runtime::new().unwrap();
    let stub = HttpStub::start(&runtime, |_| {
        Reply::error("404 Not Found", r#"{"detail":"Chat not found"}"#)
    });
    let api = Arc::new(ApiClient::new(&ClientConfig::default().with_api_url(stub.base_url())).unwrap());

    let streamer = ChatStreamer::new(runtime.handle().clone());
    let id = streamer.send(api, "missing".into(), "hi".into(), ChatMode::Smart);
    let events = collect_until_done(&streamer);

    match events.last() {
        Some(StreamEvent::Failed { request_id, error }) => {
            assert_eq!(*request_id, id);
            match error {
                VoxError::ApiError { detail, .. } => assert_eq!(detail, "Chat not found"),
                other => panic!("unexpected error {:?}", other),
            }
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!streamer.is_active(id));
}

fn signed_in() -> SessionContext {
    let mut session = SessionContext::default();
    session.sign_in(
        "token",
        User {
            id: "u1".into(),
            email: "ada@example.com".into(),
            created_at: None,
        },
    );
    session
}

#[test]
fn test_streamed_reply_lands_in_conversation() {
    let runtime = Runtime::new().unwrap();
    let stub = HttpStub::start(&runtime, |request| {
        if request.path.ends_with("/stream") {
            Reply::sse(&["Hel", "lo", "[DONE]"])
        } else {
            Reply::json("[]")
        }
    });

    let config = ClientConfig::default().with_api_url(stub.base_url());
    let mut state = AppState::connect(config, signed_in()).unwrap();
    state.conversation.attach("c1", "Greetings", ChatMode::Smart).unwrap();
    state.input_text = "hi".into();

    state.send_message();
    assert!(state.is_busy());
    assert!(state.input_text.is_empty());
    assert_eq!(state.conversation.messages.len(), 1);

    wait_for(TIMEOUT, || {
        state.poll_events();
        (!state.is_busy()).then_some(())
    })
    .expect("reply never finished");

    let messages = state.conversation.messages.get_all();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hi");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Hello");
    assert!(state.streaming_text.is_empty());
    assert!(state.notifications().is_empty());
}

#[test]
fn test_failed_reply_rolls_back_user_message() {
    let runtime = Runtime::new().unwrap();
    let stub = HttpStub::start(&runtime, |_| {
        Reply::error("500 Internal Server Error", r#"{"detail":"Model unavailable"}"#)
    });

    let config = ClientConfig::default().with_api_url(stub.base_url());
    let mut state = AppState::connect(config, signed_in()).unwrap();
    state.conversation.attach("c1", "Greetings", ChatMode::Smart).unwrap();
    state.input_text = "hi".into();
    state.send_message();

    wait_for(TIMEOUT, || {
        state.poll_events();
        (!state.is_busy()).then_some(())
    })
    .expect("reply never failed");

    assert!(state.conversation.messages.is_empty());
    let note = state.notifications().back().unwrap();
    assert!(note.is_error);
    assert_eq!(note.description, "Model unavailable");
}
