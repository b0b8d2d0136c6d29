use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Conversation type; fixed once a conversation has messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Smart,
    Voice,
    Web,
    Pdf,
}

impl ChatMode {
    pub const ALL: [ChatMode; 4] = [ChatMode::Smart, ChatMode::Voice, ChatMode::Web, ChatMode::Pdf];

    pub fn label(&self) -> &'static str {
        match self {
            ChatMode::Smart => "Smart Chat",
            ChatMode::Voice => "Voice Assistant",
            ChatMode::Web => "Web Search",
            ChatMode::Pdf => "PDF Knowledge",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ChatMode::Smart => "General conversation with the assistant",
            ChatMode::Voice => "Talk and listen hands-free",
            ChatMode::Web => "Answers grounded in live web results",
            ChatMode::Pdf => "Ask questions about an uploaded PDF",
        }
    }

    /// Wire name used by the REST and voice endpoints
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Smart => "smart",
            ChatMode::Voice => "voice",
            ChatMode::Web => "web",
            ChatMode::Pdf => "pdf",
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Some(Utc::now()),
            is_streaming: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A locally inserted message awaiting server confirmation
    pub fn tentative(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("temp-{}", Uuid::new_v4()),
            ..Self::new(role, content)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Entry of the chat list returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub mode: ChatMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
