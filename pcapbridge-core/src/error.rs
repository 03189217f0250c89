//! Error types for pcapbridge

use thiserror::Error;

use crate::SessionState;

/// Result type alias for pcapbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pcapbridge
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input to an operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted in the wrong lifecycle state
    #[error("Cannot {operation} a session that is {state}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    /// Allocation failure for an outbound message buffer
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Diagnostic reported by the capture library, kept verbatim
    #[error("Packet capture error: {0}")]
    Capture(String),

    /// Consumer unreachable or channel saturated
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Interface not found
    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    /// I/O error, including capture thread spawn failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create an invalid state error for `operation` attempted in `state`
    pub fn invalid_state(state: SessionState, operation: &'static str) -> Self {
        Error::InvalidState { state, operation }
    }

    /// Wrap a capture library diagnostic
    pub fn capture<S: Into<String>>(diagnostic: S) -> Self {
        Error::Capture(diagnostic.into())
    }

    /// The capture library's diagnostic text, exactly as reported
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Error::Capture(text) => Some(text),
            _ => None,
        }
    }

    /// Whether this error reports a lifecycle violation
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_is_verbatim() {
        let err = Error::capture("syntax error in filter expression");
        assert_eq!(err.diagnostic(), Some("syntax error in filter expression"));
        assert_eq!(
            err.to_string(),
            "Packet capture error: syntax error in filter expression"
        );
    }

    #[test]
    fn test_diagnostic_absent_for_other_variants() {
        assert!(Error::invalid_argument("bad").diagnostic().is_none());
        assert!(Error::Delivery("full".into()).diagnostic().is_none());
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::invalid_state(SessionState::Closed, "close");
        assert!(err.is_invalid_state());
        assert_eq!(err.to_string(), "Cannot close a session that is closed");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "spawn failed");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
