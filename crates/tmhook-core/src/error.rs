//! Error types for the Traffic Manager webhook
//!
//! Remote clients map their transport failures onto these variants so the
//! engine can classify them: `Conflict` triggers the read fallback on profile
//! creation, `NotFound` is tolerated on deletes, everything else surfaces.

use thiserror::Error;

/// Result type alias for webhook operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the Traffic Manager webhook
#[derive(Error, Debug)]
pub enum Error {
    /// Annotation or daemon configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request from the record pipeline
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote resource already exists or is being modified concurrently
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether the remote reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the remote reported a create/update race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether this is a configuration problem with the caller's input
    ///
    /// Configuration errors are never retried and never abort a whole batch.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Whether the caller sent a malformed request
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidInput(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
