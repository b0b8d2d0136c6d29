//! Client configuration
//!
//! Every field has a default so an empty or missing config file is valid.
//! Values are read from TOML and can be adjusted with builder-style methods.

use crate::{Result, VoxError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Environment variable that points at an explicit config file
pub const CONFIG_ENV: &str = "VOXAI_CONFIG";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST API, including the version prefix
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub ws_url: String,
    /// Length of each captured audio frame sent over the socket
    pub slice_ms: u32,
    /// Rate the service expects for PCM16 frames; capture is resampled to it
    pub sample_rate: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/api/v1/voice-chat".to_string(),
            slice_ms: 100,
            sample_rate: 16000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatSocketConfig {
    pub url: String,
    pub reconnect_delay_ms: u64,
}

impl Default for ChatSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/chat".to_string(),
            reconnect_delay_ms: 3000,
        }
    }
}

impl ChatSocketConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: u64,
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_types: vec!["application/pdf".to_string()],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScrollConfig {
    /// Distance from the bottom, in points, that still counts as "at the bottom"
    pub threshold_px: f32,
    pub idle_delay_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            threshold_px: 150.0,
            idle_delay_ms: 150,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    pub silence_timeout_ms: u64,
    pub language: String,

    /// VITS model for on-device synthesis (feature `local-tts`)
    pub vits_model: Option<PathBuf>,
    pub vits_tokens: Option<PathBuf>,
    pub speaker_id: i32,

    /// Whisper model for on-device dictation (feature `local-stt`)
    pub whisper_model: Option<PathBuf>,
    /// Speech probability above which a frame counts as voiced
    pub vad_threshold: f32,
    /// Quiet time that closes an utterance
    pub utterance_pause_ms: u64,
    /// How often a partial transcript is produced while speaking
    pub interim_interval_ms: u64,
    pub max_utterance_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 1500,
            language: "en-US".to_string(),
            vits_model: None,
            vits_tokens: None,
            speaker_id: 0,
            whisper_model: None,
            vad_threshold: 0.5,
            utterance_pause_ms: 600,
            interim_interval_ms: 1000,
            max_utterance_secs: 30,
        }
    }
}

impl SpeechConfig {
    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }
}

/// Configuration for the whole client
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub voice: VoiceConfig,
    pub chat_socket: ChatSocketConfig,
    pub upload: UploadConfig,
    pub scroll: ScrollConfig,
    pub speech: SpeechConfig,

    /// Where the session file lives; defaults to the platform config dir
    pub session_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VoxError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ClientConfig = toml::from_str(&raw).map_err(|e| {
            VoxError::ConfigError(format!("Invalid config {}: {}", path.display(), e))
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Locate the config file: `VOXAI_CONFIG`, then the user config dir, else defaults
    pub fn discover() -> Result<Self> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            info!("Using config from {}={}", CONFIG_ENV, explicit);
            return Self::load(explicit);
        }

        if let Some(dir) = dirs::config_dir() {
            let candidate = dir.join("voxai").join("config.toml");
            if candidate.exists() {
                info!("Using config from {}", candidate.display());
                return Self::load(candidate);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Where the session context is persisted
    pub fn session_file(&self) -> PathBuf {
        self.session_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("voxai")
                .join("session.json")
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Point the REST API somewhere else
    pub fn with_api_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into();
        self
    }

    /// Point the voice socket somewhere else
    pub fn with_voice_url(mut self, ws_url: impl Into<String>) -> Self {
        self.voice.ws_url = ws_url.into();
        self
    }

    pub fn with_chat_socket_url(mut self, url: impl Into<String>) -> Self {
        self.chat_socket.url = url.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.chat_socket.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_upload_limits(mut self, max_bytes: u64, allowed_types: Vec<String>) -> Self {
        self.upload.max_bytes = max_bytes;
        self.upload.allowed_types = allowed_types;
        self
    }

    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        check_scheme(&self.api.base_url, &["http", "https"], "api.base_url")?;
        check_scheme(&self.voice.ws_url, &["ws", "wss"], "voice.ws_url")?;
        check_scheme(&self.chat_socket.url, &["ws", "wss"], "chat_socket.url")?;

        if self.voice.slice_ms == 0 {
            return Err(VoxError::ConfigError(
                "voice.slice_ms must be greater than zero".into(),
            ));
        }
        if self.voice.sample_rate == 0 {
            return Err(VoxError::ConfigError(
                "voice.sample_rate must be greater than zero".into(),
            ));
        }
        if self.scroll.threshold_px < 0.0 {
            return Err(VoxError::ConfigError(
                "scroll.threshold_px must not be negative".into(),
            ));
        }
        if self.upload.allowed_types.is_empty() {
            return Err(VoxError::ConfigError(
                "upload.allowed_types must list at least one type".into(),
            ));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(VoxError::ConfigError(
                "api.request_timeout_secs must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

fn check_scheme(raw: &str, allowed: &[&str], field: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| VoxError::ConfigError(format!("{} is not a valid URL: {}", field, e)))?;
    if !allowed.contains(&url.scheme()) {
        return Err(VoxError::ConfigError(format!(
            "{} must use one of {:?}, got {}",
            field,
            allowed,
            url.scheme()
        )));
    }
    Ok(())
}
