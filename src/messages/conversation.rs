use super::storage::MessageStorage;
use super::types::ChatMode;
use crate::{Result, VoxError};
use chrono::{DateTime, Utc};

/// The active conversation and its messages
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// Server-side id; `None` until the first message created the chat
    pub id: Option<String>,
    pub title: String,
    mode: ChatMode,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub messages: MessageStorage,
}

impl Conversation {
    pub fn new(mode: ChatMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    /// The mode cannot change once any message exists
    pub fn is_mode_locked(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn set_mode(&mut self, mode: ChatMode) -> Result<()> {
        if mode == self.mode {
            return Ok(());
        }
        if self.is_mode_locked() {
            return Err(VoxError::ValidationError(format!(
                "This conversation is locked to {}. Start a new chat to switch modes.",
                self.mode.label()
            )));
        }
        self.mode = mode;
        Ok(())
    }

    /// Bind the conversation to a chat created (or loaded) on the server.
    /// Refused without changes when the mode differs and messages already exist.
    pub fn attach(
        &mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        mode: ChatMode,
    ) -> Result<()> {
        self.set_mode(mode)?;
        self.id = Some(id.into());
        self.title = title.into();
        Ok(())
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}
