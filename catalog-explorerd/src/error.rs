use thiserror::Error;

/// Errors surfaced by catalog discovery and queries.
///
/// An authentication requirement is never an error: it is recorded as a flag on
/// the affected service or resource.
#[derive(Error, Debug)]
pub enum ExplorerError {
    /// Connect, DNS or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// ArcGIS returned an embedded `{"error": {...}}` object
    #[error("ArcGIS error {code}: {message}")]
    Remote { code: i64, message: String },

    /// The walk was aborted by cancellation
    #[error("Discovery cancelled")]
    Cancelled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Cache error: {0}")]
    Cache(#[from] anyhow::Error),
}

impl ExplorerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExplorerError::Cancelled)
    }

    /// Whether the failure itself already says a token is missing or invalid.
    pub fn indicates_auth(&self) -> bool {
        matches!(
            self,
            ExplorerError::Status(401 | 403)
                | ExplorerError::Remote { code: 401 | 403 | 498 | 499, .. }
        )
    }
}

impl From<reqwest::Error> for ExplorerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ExplorerError::Protocol(e.to_string())
        } else {
            ExplorerError::Network(e.to_string())
        }
    }
}

impl From<url::ParseError> for ExplorerError {
    fn from(e: url::ParseError) -> Self {
        ExplorerError::InvalidUrl(e.to_string())
    }
}

pub type Result<T, E = ExplorerError> = std::result::Result<T, E>;
