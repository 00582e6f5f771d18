use thiserror::Error;

/// Result type alias for supernova operations
pub type Result<T> = std::result::Result<T, SupernovaError>;

/// Errors that can occur across the certificate service and node daemon
#[derive(Error, Debug)]
pub enum SupernovaError {
    /// Control endpoint answered with a non-success status
    #[error("API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Response body, or the `error` field if it was JSON
        message: String,
    },

    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required setting missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Request payload failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown entry-point action
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Public key rejected before reaching the signer
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Stored item does not have the shape of a device record
    #[error("malformed record for device {device}: {reason}")]
    MalformedRecord {
        /// Device name, or `<unknown>` when the key itself is missing
        device: String,
        /// What failed to decode
        reason: String,
    },

    /// External signer failed
    #[error("signer failed: {message}: {output}")]
    Signer {
        /// Exit status or spawn error
        message: String,
        /// Combined stdout/stderr of the signer
        output: String,
    },

    /// Persistent store unreachable or unusable
    #[error("store error: {0}")]
    Store(String),

    /// Tunnel process could not be started, signalled, or exited abnormally
    #[error("tunnel error: {0}")]
    Tunnel(String),

    /// Operation stopped by a cancellation request
    #[error("operation cancelled")]
    Cancelled,
}

impl SupernovaError {
    /// Returns the HTTP status code if this is an API error
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Build a [`SupernovaError::MalformedRecord`]
    pub fn malformed(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            device: device.into(),
            reason: reason.into(),
        }
    }
}
