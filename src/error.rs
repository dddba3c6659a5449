//! Error taxonomy for the plugin subsystem.

use thiserror::Error;

/// Archive section that failed extraction.
///
/// Surfaced in user-facing diagnostics so an uploader knows which part of the
/// package to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveSection {
    Manifest,
    Readme,
    Logo,
    Content,
}

impl std::fmt::Display for ArchiveSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArchiveSection::Manifest => "plugin.json",
            ArchiveSection::Readme => "readme",
            ArchiveSection::Logo => "logo",
            ArchiveSection::Content => "content",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin package is incomplete: failed to read {section}: {reason}")]
    Validation {
        section: ArchiveSection,
        reason: String,
    },

    #[error("{message}")]
    Conflict { message: String },

    #[error("plugin '{key}' not found or disabled")]
    PluginNotFound { key: String },

    #[error("plugin '{key}' has no method '{method}'")]
    MethodNotFound { key: String, method: String },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("event bus error: {message}")]
    Bus { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl PluginError {
    pub fn validation(section: ArchiveSection, reason: impl Into<String>) -> Self {
        Self::Validation {
            section,
            reason: reason.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::PluginNotFound { key: key.into() }
    }

    /// True for both the missing-plugin and missing-method variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PluginNotFound { .. } | Self::MethodNotFound { .. }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

pub type PluginResult<T> = std::result::Result<T, PluginError>;

#[cfg(feature = "postgres")]
pub(crate) trait StorageResultExt<T> {
    fn storage_err(self) -> PluginResult<T>;
    fn storage_err_ctx(self, context: &str) -> PluginResult<T>;
}

#[cfg(feature = "postgres")]
impl<T, E: std::fmt::Display> StorageResultExt<T> for std::result::Result<T, E> {
    fn storage_err(self) -> PluginResult<T> {
        self.map_err(|e| PluginError::Storage {
            message: e.to_string(),
        })
    }

    fn storage_err_ctx(self, context: &str) -> PluginResult<T> {
        self.map_err(|e| PluginError::Storage {
            message: format!("{}: {}", context, e),
        })
    }
}
