//! Error types for the TIC500 driver stack.
//!
//! `TicError` is the typed error of the protocol core. Every failure the
//! transport, codec, registry or façade can produce maps onto one variant, so
//! callers can tell a missing reply apart from an instrument-side rejection
//! or a registry misuse without string matching.
//!
//! ## Error Taxonomy
//!
//! - **`Connection`**: the transport could not be established, or the peer
//!   closed it. Fatal during bring-up (the device enters Fault).
//! - **`Io`**: a write or read on an established socket failed (broken pipe).
//! - **`Timeout`**: no reply arrived within the read bound. Recoverable; a
//!   hard failure only for calls that expect a value.
//! - **`Instrument`**: the instrument answered with an `Error...` line. The
//!   variant carries the full reply text unchanged.
//! - **`Format`**: a reply (or a caller-supplied value) does not fit the
//!   expected type, including unknown enum symbols.
//! - **`UnknownProperty`** / **`UnknownChannel`** / **`Access`**: registry
//!   misuse, rejected before any network I/O.
//! - **`NotConnected`** / **`Fault`**: the device has no usable link.
//!
//! Factory and binary layers wrap these in `anyhow::Error` with context, as
//! the driver factories do.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the core error type.
pub type TicResult<T> = std::result::Result<T, TicError>;

/// Primary error type for the TIC500 protocol core.
#[derive(Error, Debug)]
pub enum TicError {
    /// Transport could not be established or was closed by the peer.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Read or write on an established transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No reply arrived within the configured bound.
    #[error("No reply within {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The instrument rejected the command. Carries the full reply text.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// Reply or value does not parse as the expected type.
    #[error("Format error: {0}")]
    Format(String),

    /// No registry entry for the requested property.
    #[error("Unknown property '{property}' for {scope}")]
    UnknownProperty {
        /// Where the lookup happened (channel kind or attribute set).
        scope: String,
        /// The property name that was requested.
        property: String,
    },

    /// Channel identifier outside the instrument's terminals.
    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),

    /// Write attempted on a property without write permission.
    #[error("Property '{0}' is read-only")]
    Access(String),

    /// The transport was never opened or has already been closed.
    #[error("Not connected")]
    NotConnected,

    /// The device is in Fault state; carries its status text.
    #[error("Device is in fault state: {0}")]
    Fault(String),

    /// Configuration values parsed but are semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl TicError {
    /// Whether the link is still usable after this error.
    ///
    /// Recoverable errors concern a single request; the caller may decide to
    /// issue another one. Everything else means the connection is gone.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TicError::Timeout(_)
                | TicError::Instrument(_)
                | TicError::Format(_)
                | TicError::UnknownProperty { .. }
                | TicError::UnknownChannel(_)
                | TicError::Access(_)
                | TicError::Configuration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TicError::Instrument("Error bad channel".to_string());
        assert_eq!(err.to_string(), "Instrument error: Error bad channel");

        let err = TicError::Timeout(Duration::from_millis(500));
        assert_eq!(err.to_string(), "No reply within 500 ms");

        let err = TicError::UnknownProperty {
            scope: "output channels".into(),
            property: "colour".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown property 'colour' for output channels"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(TicError::Timeout(Duration::from_millis(1)).is_recoverable());
        assert!(TicError::Access("temperature".into()).is_recoverable());
        assert!(!TicError::NotConnected.is_recoverable());
        assert!(!TicError::Connection("refused".into()).is_recoverable());
        assert!(!TicError::Fault("refused".into()).is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: TicError = io.into();
        assert!(matches!(err, TicError::Io(_)));
    }
}
