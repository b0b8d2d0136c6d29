pub mod conversation;
pub mod history;
pub mod storage;
pub mod types;

pub use conversation::Conversation;
pub use storage::MessageStorage;
pub use types::{ChatMode, ChatSummary, Message, Role};
