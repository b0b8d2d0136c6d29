//! Local validation of files picked for upload

use crate::config::UploadConfig;
use crate::{Result, VoxError};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct UploadLimits {
    pub max_bytes: u64,
    pub allowed_types: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadConfig::default().into()
    }
}

impl From<UploadConfig> for UploadLimits {
    fn from(config: UploadConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
            allowed_types: config.allowed_types,
        }
    }
}

impl UploadLimits {
    /// Size is checked before type; the first violation wins
    pub fn check(&self, size: u64, mime_type: &str) -> Result<()> {
        if size > self.max_bytes {
            return Err(VoxError::ValidationError(format!(
                "File size exceeds {:.1}MB limit",
                self.max_bytes as f64 / 1024.0 / 1024.0
            )));
        }
        if !self.allowed_types.iter().any(|t| t == mime_type) {
            return Err(VoxError::ValidationError(format!(
                "File type not supported. Allowed types: {}",
                self.allowed_types.join(", ")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, inferring the MIME type from its extension.
    ///
    /// Size and type are checked against `limits` from file metadata first,
    /// so a rejected file is never loaded.
    pub fn read(path: impl AsRef<Path>, limits: &UploadLimits) -> Result<Self> {
        let path = path.as_ref();
        let mime_type = mime_from_path(path);
        let size = std::fs::metadata(path)?.len();
        limits.check(size, &mime_type)?;

        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// MIME type guessed from the extension, `application/octet-stream` when unknown
pub fn mime_from_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

type SelectCallback = Box<dyn FnMut(&SelectedFile) + Send>;

/// Holds the currently selected file and the last validation error
pub struct FileSelector {
    limits: UploadLimits,
    selected: Option<SelectedFile>,
    error: Option<String>,
    on_select: Option<SelectCallback>,
}

impl FileSelector {
    pub fn new(limits: UploadLimits) -> Self {
        Self {
            limits,
            selected: None,
            error: None,
            on_select: None,
        }
    }

    pub fn on_select(mut self, callback: impl FnMut(&SelectedFile) + Send + 'static) -> Self {
        self.on_select = Some(Box::new(callback));
        self
    }

    /// Validate and record the file. A rejected file leaves no selection behind.
    pub fn select(&mut self, file: SelectedFile) -> Result<()> {
        self.error = None;

        if let Err(e) = self.limits.check(file.size(), &file.mime_type) {
            warn!("Rejected {}: {}", file.name, e);
            return Err(self.reject(e));
        }

        debug!("Selected {} ({} bytes)", file.name, file.size());
        if let Some(callback) = self.on_select.as_mut() {
            callback(&file);
        }
        self.selected = Some(file);
        Ok(())
    }

    /// Check a file on disk against the limits, then load and select it
    pub fn select_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.error = None;

        match SelectedFile::read(path, &self.limits) {
            Ok(file) => self.select(file),
            Err(e) => {
                warn!("Rejected {}: {}", path.display(), e);
                Err(self.reject(e))
            }
        }
    }

    fn reject(&mut self, error: VoxError) -> VoxError {
        self.error = Some(error.user_message());
        self.selected = None;
        error
    }

    pub fn clear(&mut self) {
        self.selected = None;
        self.error = None;
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    pub fn take(&mut self) -> Option<SelectedFile> {
        self.selected.take()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }
}
