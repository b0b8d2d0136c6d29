pub mod api;
pub mod audio;
pub mod config;
pub mod messages;
pub mod session;
pub mod speech;
pub mod transport;
pub mod ui;
pub mod upload;

use thiserror::Error;

/// The three ways a user-visible operation can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected locally before any network call
    Validation,
    /// Socket, stream or device failure during an operation
    Transport,
    /// The platform lacks the capability (speech engines, audio devices)
    Unsupported,
}

#[derive(Error, Debug, Clone)]
pub enum VoxError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("API error ({status}): {detail}")]
    ApiError { status: u16, detail: String },

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Speech error: {0}")]
    SpeechError(String),
}

impl From<std::io::Error> for VoxError {
    fn from(e: std::io::Error) -> Self {
        VoxError::IOError(e.to_string())
    }
}

impl From<reqwest::Error> for VoxError {
    fn from(e: reqwest::Error) -> Self {
        VoxError::TransportError(e.to_string())
    }
}

impl From<serde_json::Error> for VoxError {
    fn from(e: serde_json::Error) -> Self {
        VoxError::DecodeError(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VoxError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        VoxError::TransportError(e.to_string())
    }
}

impl VoxError {
    /// Which of the three failure categories this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            VoxError::ValidationError(_) => ErrorCategory::Validation,
            VoxError::Unsupported(_) => ErrorCategory::Unsupported,
            VoxError::TransportError(_)
            | VoxError::AudioDeviceError(_)
            | VoxError::ApiError { .. }
            | VoxError::DecodeError(_)
            | VoxError::IOError(_)
            | VoxError::ConfigError(_)
            | VoxError::ChannelError(_)
            | VoxError::SessionError(_)
            | VoxError::SpeechError(_) => ErrorCategory::Transport,
        }
    }

    /// Check if the user can simply retry the operation
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The input has to change first
            VoxError::ValidationError(_) => false,
            VoxError::TransportError(_) => true,
            VoxError::Unsupported(_) => false,
            // Hardware errors may require user intervention
            VoxError::AudioDeviceError(_) => false,
            VoxError::ApiError { status, .. } => *status >= 500,
            VoxError::DecodeError(_) => true,
            VoxError::IOError(_) => false,
            VoxError::ConfigError(_) => false,
            VoxError::ChannelError(_) => false,
            VoxError::SessionError(_) => false,
            VoxError::SpeechError(_) => true,
        }
    }

    /// Get a user-friendly description for the notification surface
    pub fn user_message(&self) -> String {
        match self {
            VoxError::ValidationError(msg) => msg.clone(),
            VoxError::TransportError(_) => {
                "Connection to the VoxAI service failed. Please try again.".to_string()
            }
            VoxError::Unsupported(msg) => msg.clone(),
            VoxError::AudioDeviceError(_) => "Could not access microphone".to_string(),
            VoxError::ApiError { detail, .. } => detail.clone(),
            VoxError::DecodeError(_) => {
                "Received an unexpected response from the service.".to_string()
            }
            VoxError::IOError(_) => "File system error occurred.".to_string(),
            VoxError::ConfigError(_) => "Configuration error. Please check settings.".to_string(),
            VoxError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            VoxError::SessionError(_) => "Please sign in again.".to_string(),
            VoxError::SpeechError(msg) => msg.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VoxError>;
