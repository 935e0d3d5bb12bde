//! Error types for session management

use crate::state::PlaybackState;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by session control operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The requested state transition is not part of the state machine
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: PlaybackState,
        to: PlaybackState,
    },

    /// The session reached its terminal state and was evicted
    #[error("session terminated")]
    Terminated,

    /// Queue index outside the current queue bounds
    #[error("queue index out of range: {index} (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Broken internal invariant; not a user-facing condition
    #[error("internal session error: {0}")]
    Internal(String),
}
