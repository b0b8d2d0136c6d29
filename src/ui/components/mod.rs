//! UI components for the chat window

mod input_bar;
mod message_list;
mod notifications;

pub use input_bar::InputBar;
pub use message_list::MessageList;
pub use notifications::Notifications;
