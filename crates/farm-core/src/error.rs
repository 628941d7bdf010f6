//! Error types for the farm pipeline

use std::io;
use thiserror::Error;

/// Result type for farm operations
pub type FarmResult<T> = Result<T, FarmError>;

/// Errors that can occur anywhere in the master, workers or collector
#[derive(Debug, Error)]
pub enum FarmError {
    /// Bad pool construction parameter or malformed numeric argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Socket connect/accept/read/write failure
    #[error("transport error during {op}: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// Peer closed the stream in the middle of a message
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    /// Unexpected opcode or impossible length field on the wire
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The per-file computation failed on an input
    #[error("compute failed on {input}: {source}")]
    ComputeFailure {
        input: String,
        #[source]
        source: io::Error,
    },

    /// Every worker of the pool has terminated
    #[error("no live workers left in the pool")]
    NoLiveWorkers,

    /// Threads or memory could not be obtained
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// Signal mask or handler installation failed
    #[error("signal setup failed: {0}")]
    Signal(String),
}

impl FarmError {
    /// Build a transport error tagged with the operation that failed
    pub fn transport(op: &'static str, source: io::Error) -> Self {
        FarmError::Transport { op, source }
    }

    /// Build a compute failure for the given input
    pub fn compute(input: impl Into<String>, source: io::Error) -> Self {
        FarmError::ComputeFailure {
            input: input.into(),
            source,
        }
    }

    /// True for failures that retire a single worker or connection
    /// but leave the rest of the run intact.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            FarmError::Transport { .. }
                | FarmError::ShortRead { .. }
                | FarmError::ProtocolViolation(_)
                | FarmError::ComputeFailure { .. }
        )
    }

    /// True when the underlying transport reported that the endpoint
    /// does not exist yet (collector not bound).
    pub fn is_endpoint_missing(&self) -> bool {
        match self {
            FarmError::Transport { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = FarmError::ShortRead { expected: 8, got: 3 };
        assert_eq!(format!("{}", e), "short read: expected 8 bytes, got 3");

        let e = FarmError::transport("connect", io::Error::from(io::ErrorKind::NotFound));
        assert!(format!("{}", e).starts_with("transport error during connect"));
    }

    #[test]
    fn test_classification() {
        let missing = FarmError::transport("connect", io::Error::from(io::ErrorKind::NotFound));
        assert!(missing.is_endpoint_missing());
        assert!(missing.is_local());

        let refused =
            FarmError::transport("connect", io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(!refused.is_endpoint_missing());

        assert!(!FarmError::NoLiveWorkers.is_local());
        assert!(!FarmError::InvalidArgument("x".into()).is_local());
    }
}
