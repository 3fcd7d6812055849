use thiserror::Error;

/// Errors raised while fetching, parsing or storing lottery data.
#[derive(Error, Debug)]
pub enum LottoError {
    /// Transport failure, non-200 status or an unreadable body.
    #[error("network error: {0}")]
    Network(String),

    /// The round has not been drawn yet (or does not exist upstream).
    #[error("round {0} not found")]
    NotFound(u32),

    /// A payload is missing required fields or carries invalid values.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// SQLite failure. Never retried.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Local file access (HTML dumps).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LottoError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LottoError::Network(_))
    }

    /// Storage failures abort batch operations instead of being skipped.
    pub fn is_storage(&self) -> bool {
        matches!(self, LottoError::Storage(_))
    }
}

impl From<reqwest::Error> for LottoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LottoError::Network(format!("request timed out: {e}"))
        } else if e.is_connect() {
            LottoError::Network(format!("connection failed: {e}"))
        } else {
            LottoError::Network(e.to_string())
        }
    }
}
