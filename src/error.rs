//! Error types for the ksqlDB client.

/// Errors surfaced by client operations and streamed results.
///
/// Value-level decode failures are not represented here: a single column
/// value that does not match its declared type degrades to
/// [`KsqlValue::Null`](crate::KsqlValue::Null) instead of failing the row.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KsqlError {
    /// The type-declaration grammar met an unknown keyword.
    #[error("Unsupported column type: {fragment}")]
    UnsupportedType { fragment: String },

    /// Wire data violated the expected shape. Always terminal for the
    /// affected stream.
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        /// Server-supplied error code, when one was present on the wire.
        error_code: Option<i64>,
    },

    /// The caller-supplied statement or request is malformed. Detected
    /// before any network activity.
    #[error("Invalid request: {message}")]
    Validation { message: String },

    /// The underlying HTTP transport failed.
    #[error("Transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        message: String,
        /// HTTP status code, when the failure happened after a response
        /// status line was received.
        status: Option<u16>,
    },

    /// The caller cancelled the stream.
    #[error("Stream cancelled by caller")]
    Cancelled,
}

impl KsqlError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        KsqlError::Protocol {
            message: message.into(),
            error_code: None,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        KsqlError::Validation {
            message: message.into(),
        }
    }

    /// True when the error was caused by caller-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KsqlError::Cancelled)
    }
}

impl From<reqwest::Error> for KsqlError {
    fn from(e: reqwest::Error) -> Self {
        KsqlError::Transport {
            message: e.to_string(),
            status: e.status().map(|s| s.as_u16()),
        }
    }
}
