//! Error types shared by the sky tools.

use thiserror::Error;

/// Result type alias for sky operations
pub type SkyResult<T> = std::result::Result<T, SkyError>;

/// Errors a tool can report back to the host.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SkyError {
    /// The caller passed a missing or out-of-range argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A place or station could not be found
    #[error("{0}")]
    NotFound(String),

    /// An upstream service failed or answered with an error status
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Upstream data did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// The operation is not offered by this tool
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SkyError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SkyError::InvalidArgument(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        SkyError::Parse(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        SkyError::Upstream(msg.into())
    }
}
