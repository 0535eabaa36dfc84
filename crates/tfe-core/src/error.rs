//! Error types shared by every driver.
//!
//! `InstrumentError` is the single error type returned by parameters,
//! transports and composite operations. Each variant maps onto one
//! [`ErrorKind`], which is the coarse taxonomy callers branch on:
//!
//! - **Validation**: a value is outside the declared domain. Raised before
//!   anything is sent to the device.
//! - **UnsupportedOperation**: a write to a read-only parameter, a name that
//!   is not registered, or an operation on a resource the device does not have.
//! - **Protocol**: the device answered, but the reply did not match the
//!   expected wire format.
//! - **Transport**: the channel failed (timeout, closed connection, handle
//!   failure from a vendor library, I/O error).
//!
//! Validation and protocol errors are never retried. Transport errors raised
//! in the middle of a composite operation run that operation's cleanup path
//! before they are returned.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of an [`InstrumentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    UnsupportedOperation,
    Protocol,
    Transport,
    Configuration,
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::UnsupportedOperation => "unsupported_operation",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Transport => "transport",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Storage => "storage",
        };
        write!(f, "{}", label)
    }
}

/// Convenience alias for results using the instrument error type.
pub type InstrumentResult<T> = std::result::Result<T, InstrumentError>;

// =============================================================================
// InstrumentError
// =============================================================================

/// Primary error type for instrument drivers.
///
/// # Example
///
/// ```rust
/// use tfe_core::error::{ErrorKind, InstrumentError};
///
/// let err = InstrumentError::validation("power", "value 20 outside [-85, 10]");
/// assert_eq!(err.kind(), ErrorKind::Validation);
/// ```
#[derive(Error, Debug)]
pub enum InstrumentError {
    /// Value rejected by the parameter's domain.
    ///
    /// **Error Type**: Permanent - the same value will always be rejected.
    ///
    /// **Recovery Strategy**: Correct the value. Nothing was sent to the device.
    #[error("Invalid value for '{parameter}': {reason}")]
    Validation { parameter: String, reason: String },

    /// Operation is not available on this parameter or resource.
    ///
    /// Raised when setting a read-only parameter, or when addressing a trace
    /// that does not exist on the instrument.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Parameter name is not present in the registry.
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    /// Reply from the device did not match the expected wire format.
    ///
    /// **Error Type**: Usually permanent for the current device mode (e.g. a
    /// non-numeric reply to a numeric query).
    ///
    /// **Recovery Strategy**: Report to the user. Not retried.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport-level failure (connection closed, library call failed).
    #[error("Transport error: {0}")]
    Transport(String),

    /// No reply within the transport timeout.
    ///
    /// **Error Type**: Transient or permanent depending on the device.
    ///
    /// **Recovery Strategy**: Composite operations restore the prior
    /// instrument mode and re-raise. Timed-out waits are not retried.
    #[error("Timed out after {timeout:?} waiting for reply to '{command}'")]
    Timeout { command: String, timeout: Duration },

    /// Standard I/O failure on the underlying socket or file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or is semantically invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisting acquired data failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl InstrumentError {
    /// Build a [`InstrumentError::Validation`] for the named parameter.
    pub fn validation(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error into the four-way taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstrumentError::Validation { .. } => ErrorKind::Validation,
            InstrumentError::Unsupported(_) | InstrumentError::UnknownParameter(_) => {
                ErrorKind::UnsupportedOperation
            }
            InstrumentError::Protocol(_) => ErrorKind::Protocol,
            InstrumentError::Transport(_)
            | InstrumentError::Timeout { .. }
            | InstrumentError::Io(_) => ErrorKind::Transport,
            InstrumentError::Config(_) => ErrorKind::Configuration,
            InstrumentError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// True for errors raised by the transport layer.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstrumentError::validation("num_points", "2000 outside [1, 1601]");
        assert_eq!(
            err.to_string(),
            "Invalid value for 'num_points': 2000 outside [1, 1601]"
        );

        let err = InstrumentError::Timeout {
            command: "*OPC?".into(),
            timeout: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("*OPC?"));
        assert!(err.to_string().contains("1.5s"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            InstrumentError::Unsupported("x".into()).kind(),
            ErrorKind::UnsupportedOperation
        );
        assert_eq!(
            InstrumentError::UnknownParameter("fstrat".into()).kind(),
            ErrorKind::UnsupportedOperation
        );
        assert_eq!(
            InstrumentError::Protocol("bad reply".into()).kind(),
            ErrorKind::Protocol
        );
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(InstrumentError::from(io).is_transport());
        assert!(InstrumentError::Timeout {
            command: "X?".into(),
            timeout: Duration::from_secs(1)
        }
        .is_transport());
        assert_eq!(ErrorKind::Transport.to_string(), "transport");
    }
}
