//! Persisted session state
//!
//! The session context is loaded once at startup and saved explicitly after
//! sign-in, sign-out and onboarding changes. Nothing else touches the file.

pub mod context;

pub use context::{SessionContext, User};

use crate::{Result, VoxError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// JSON file holding a [`SessionContext`]
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty session; a corrupt one is an error
    pub fn load(&self) -> Result<SessionContext> {
        if !self.path.exists() {
            debug!("No session file at {}", self.path.display());
            return Ok(SessionContext::default());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let session = serde_json::from_str(&raw).map_err(|e| {
            VoxError::SessionError(format!("Corrupt session file {}: {}", self.path.display(), e))
        })?;
        info!("Loaded session from {}", self.path.display());
        Ok(session)
    }

    /// Write through a temporary file so a crash never leaves half a session behind
    pub fn save(&self, session: &SessionContext) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(session)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    /// Drop the persisted credentials but keep the onboarding flag
    pub fn clear_credentials(&self) -> Result<SessionContext> {
        let mut session = self.load().unwrap_or_default();
        session.sign_out();
        self.save(&session)?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        assert_eq!(store.load().unwrap(), SessionContext::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session.json"));

        let mut session = SessionContext::default();
        session.sign_in(
            "abc",
            User {
                id: "42".into(),
                email: "grace@example.com".into(),
                created_at: None,
            },
        );
        session.complete_onboarding();
        store.save(&session).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, session);
        assert!(!dir.path().join("nested").join("session.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = SessionStore::new(path);
        assert!(matches!(store.load(), Err(VoxError::SessionError(_))));
    }

    #[test]
    fn test_clear_credentials_keeps_onboarding() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let mut session = SessionContext::default();
        session.token = Some("t".into());
        session.complete_onboarding();
        store.save(&session).unwrap();

        let cleared = store.clear_credentials().unwrap();
        assert!(cleared.token.is_none());
        assert!(store.load().unwrap().onboarding_complete);
    }
}
