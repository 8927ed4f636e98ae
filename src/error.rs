use std::io;
use std::path::Path;

use thiserror::Error;
use tokio::task::JoinError;

/// Errors a download request can end in.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("No URL provided")]
    MissingInput,

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("FFmpeg not found")]
    ToolUnavailable,

    #[error("{0}")]
    Fetch(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    pub fn filesystem(context: impl Into<String>, source: io::Error) -> Self {
        Self::Filesystem {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let context = format!("Failed to {} {}", action, path.display());
        move |source| Self::Filesystem { context, source }
    }

    /// Whether the caller, not the pipeline, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingInput | Self::InvalidInput(_))
    }
}

impl From<JoinError> for DownloadError {
    fn from(err: JoinError) -> Self {
        Self::filesystem("Filesystem task failed", io::Error::other(err))
    }
}

pub type DownloadResult<T> = std::result::Result<T, DownloadError>;
