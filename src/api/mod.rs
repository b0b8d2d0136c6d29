//! REST interface of the VoxAI service

pub mod auth;
pub mod client;
pub mod stream;

pub use auth::{LoginRequest, ProfilePhoto, SignupForm};
pub use client::ApiClient;
pub use stream::{sse_text_stream, SseDecoder, SseItem};

use crate::messages::{ChatMode, ChatSummary, Message, Role};
use crate::session::User;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parse the timestamp shapes the service emits: RFC 3339, or naive ISO with
/// either `T` or a space as separator (treated as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Message {
            id: record.id,
            role: record.role,
            content: record.content,
            timestamp: record.timestamp.as_deref().and_then(parse_timestamp),
            is_streaming: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    pub mode: ChatMode,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ChatRecord> for ChatSummary {
    fn from(record: ChatRecord) -> Self {
        let created_at = parse_timestamp(&record.created_at).unwrap_or_else(Utc::now);
        ChatSummary {
            id: record.id,
            title: record.title,
            mode: record.mode,
            created_at,
            updated_at: parse_timestamp(&record.updated_at).unwrap_or(created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StartChatRequest<'a> {
    pub user_id: &'a str,
    pub mode: ChatMode,
    pub first_message: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartChatRecord {
    pub chat_id: String,
    pub title: String,
    pub user_message: MessageRecord,
    pub assistant_message: MessageRecord,
}

/// A chat created by its first message, with both sides of the first exchange
#[derive(Debug, Clone, PartialEq)]
pub struct StartedChat {
    pub chat_id: String,
    pub title: String,
    pub user_message: Message,
    pub assistant_message: Message,
}

impl From<StartChatRecord> for StartedChat {
    fn from(record: StartChatRecord) -> Self {
        Self {
            chat_id: record.chat_id,
            title: record.title,
            user_message: record.user_message.into(),
            assistant_message: record.assistant_message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StreamRequest<'a> {
    pub content: &'a str,
    pub mode: ChatMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadedDocument {
    pub document_id: String,
    pub file_name: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchEnvelope {
    pub results: SearchResults,
}
