// Error types for the bundle upload pipeline.

use std::path::PathBuf;

/// Message shown whenever the remote service answers without the field we
/// need to continue.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "Unfortunately, the server is temporarily unavailable. Please try again later.";

/// Errors produced while validating, packaging or uploading a bundle.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("file is not accessible: {}: {source}", path.display())]
    FileNotAccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create bundle archive: {0}")]
    ArchiveCreationFailed(#[source] std::io::Error),

    #[error("malformed {stage} response from server: {detail}")]
    MalformedServerResponse { stage: &'static str, detail: String },

    #[error("{}", SERVICE_UNAVAILABLE_MESSAGE)]
    ServiceUnavailable,

    /// Request URLs are stripped: the negotiation query carries the
    /// access token.
    #[error("HTTP error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.without_url())
    }
}

impl UploadError {
    pub(crate) fn not_accessible(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileNotAccessible {
            path: path.into(),
            source,
        }
    }

    /// Whether trying again later might succeed. Nothing in this crate
    /// retries; callers use this to word their report.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable | Self::Transport(_))
    }

    /// Short machine-friendly name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileNotAccessible { .. } => "file_not_accessible",
            Self::ArchiveCreationFailed(_) => "archive_creation_failed",
            Self::MalformedServerResponse { .. } => "malformed_server_response",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Transport(_) => "transport",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Cancelled => "cancelled",
        }
    }
}
