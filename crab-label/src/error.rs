//! Error types for the label printer library

use thiserror::Error;

/// Errors raised while building or encoding a label
#[derive(Debug, Error)]
pub enum LabelError {
    /// Numeric argument outside the range the agent accepts
    #[error("{command}: {argument} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        command: &'static str,
        argument: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Non-numeric argument the agent would reject
    #[error("{command}: invalid {argument}: {reason}")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        reason: String,
    },

    /// Payload serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid agent configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for label building operations
pub type LabelResult<T> = Result<T, LabelError>;

/// Errors raised while talking to the local print agent
///
/// These never escape the coordinator; they are folded into
/// [`PrintOutcome`](crate::PrintOutcome).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Agent answered 404: no printer configured under that name
    #[error("Printer not found: {0}")]
    PrinterNotFound(String),

    /// Network failure or unexpected HTTP status
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Agent reply was not the expected JSON
    #[error("Cannot parse agent response: {0}")]
    Parse(String),

    /// Socket closed after it had been open
    #[error("Connection closed")]
    ConnectionClosed,

    /// Queued socket payload replaced by a later send before the socket opened
    #[error("Queued payload superseded by a later send")]
    Superseded,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Connection(e.to_string())
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
