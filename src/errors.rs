use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unread fetch failed: {status}")]
    UnreadFetch { status: u16 },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl NotifyError {
    /// Short machine-readable code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            NotifyError::Storage(_) => "storage_error",
            NotifyError::Serialization(_) => "serialization_error",
            NotifyError::Http(_) => "http_error",
            NotifyError::UnreadFetch { .. } => "unread_fetch_failed",
            NotifyError::InvalidConfig(_) => "invalid_config",
        }
    }
}

pub type Result<T, E = NotifyError> = std::result::Result<T, E>;
