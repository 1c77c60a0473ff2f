//! Error types for the matchmaking service
//!
//! Setup paths use anyhow for consistent error handling, while the
//! remote client reports a typed [`ClientError`] so the engine can tell a
//! rate-limit rejection apart from every other failure.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Result type returned by every remote client call
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("No supported variants to choose from for profile '{profile}'")]
    NoSupportedVariants { profile: String },

    #[error("Invalid rating range for profile '{profile}': {min} > {max}")]
    InvalidRatingRange { profile: String, min: i32, max: i32 },
}

/// Failures surfaced by the game server client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The server rejected the request because too many were sent
    #[error("Rate limited by the game server")]
    RateLimited,

    #[error("Game server responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode server response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether the failure asks the caller to back off
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimited)
    }
}
