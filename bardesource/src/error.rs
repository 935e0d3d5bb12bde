//! Error types for reference resolution

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors that can occur while resolving a media reference
///
/// "No results" is not an error: a search that matches nothing returns an
/// empty descriptor list.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    /// The reference is malformed or uses an unsupported scheme
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The catalog daemon could not be reached or answered abnormally
    #[error("catalog unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The resolution did not complete within the configured bound
    #[error("resolution timed out")]
    Timeout,
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        ResolveError::UpstreamUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(err: serde_json::Error) -> Self {
        ResolveError::UpstreamUnavailable(format!("malformed catalog response: {err}"))
    }
}
