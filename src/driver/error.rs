//! Driver error taxonomy.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::bolt::message::Failure;
use crate::bolt::{HandshakeError, ServerErrorCode, WireError};

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the application.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket-level failure: closed connection, refused connect, DNS
    /// failure. Fatal to the connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed wire data, unknown struct tag, unexpected message
    /// order or handshake rejection. Fatal to the connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// TLS validation or authentication failure. Fatal.
    #[error("security error: {0}")]
    Security(String),

    /// No resolved address was reachable. Carries every per-address
    /// failure.
    #[error("service unavailable: {reason}")]
    ServiceUnavailable {
        reason: String,
        attempts: Vec<String>,
    },

    /// Connect did not finish inside the configured window; the
    /// half-open socket has been closed.
    #[error("connect cancelled after {timeout:?}")]
    ConnectTimeout { timeout: Duration },

    /// Caller misuse: operating on a closed transaction or session,
    /// invalid configuration, bad value conversion.
    #[error("{0}")]
    Client(String),

    /// Server-reported FAILURE, classified by its status code.
    #[error("server error: {code}: {message}")]
    Database { code: String, message: String },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether a fresh attempt on a new transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::ServiceUnavailable { .. } | Self::ConnectTimeout { .. } => {
                true
            }
            Self::Database { code, .. } => ServerErrorCode::is_transient(code),
            _ => false,
        }
    }

    /// Whether the connection that raised this error must be discarded.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Protocol(_)
                | Self::Security(_)
                | Self::Io(_)
                | Self::ConnectTimeout { .. }
        )
    }
}

impl From<WireError> for Error {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(e) => Error::Transport(e.to_string()),
            WireError::Handshake(HandshakeError::NoSupportedVersion) => {
                Error::Protocol("server supports none of the proposed protocol versions".into())
            }
            WireError::Handshake(e) => Error::Protocol(e.to_string()),
            WireError::Codec(e) => Error::Protocol(e.to_string()),
            WireError::Protocol(msg) => Error::Protocol(msg),
            WireError::MessageTooLarge { size, max } => {
                Error::Protocol(format!("message too large: {} bytes (max {})", size, max))
            }
            WireError::ConnectionClosed => Error::Transport("connection closed by server".into()),
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        if failure.is_security() {
            Error::Security(format!("{}: {}", failure.code, failure.message))
        } else {
            Error::Database {
                code: failure.code,
                message: failure.message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::PackError;

    #[test]
    fn retryability() {
        assert!(Error::transport("closed").is_retryable());
        assert!(Error::ConnectTimeout { timeout: Duration::from_millis(100) }.is_retryable());
        assert!(Error::ServiceUnavailable { reason: "x".into(), attempts: vec![] }.is_retryable());
        assert!(Error::database(ServerErrorCode::DEADLOCK_DETECTED, "d").is_retryable());

        assert!(!Error::database(ServerErrorCode::SYNTAX_ERROR, "s").is_retryable());
        assert!(!Error::client("misuse").is_retryable());
        assert!(!Error::protocol("bad tag").is_retryable());
    }

    #[test]
    fn connection_fatality() {
        assert!(Error::transport("closed").is_fatal_to_connection());
        assert!(Error::protocol("bad tag").is_fatal_to_connection());
        assert!(Error::security("tls").is_fatal_to_connection());

        // A server-side failure leaves the connection usable after
        // RESET/ROLLBACK.
        assert!(!Error::database("Lodestone.ClientError.Statement.SyntaxError", "s")
            .is_fatal_to_connection());
        assert!(!Error::client("misuse").is_fatal_to_connection());
    }

    #[test]
    fn wire_error_mapping() {
        let err: Error = WireError::Codec(PackError::UnknownMarker(0xC7)).into();
        assert!(matches!(err, Error::Protocol(_)));

        let err: Error = WireError::ConnectionClosed.into();
        assert!(matches!(err, Error::Transport(_)));

        let err: Error = WireError::Handshake(HandshakeError::NoSupportedVersion).into();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn failure_mapping() {
        let err: Error = Failure::new(ServerErrorCode::SYNTAX_ERROR, "boom").into();
        assert!(matches!(err, Error::Database { .. }));

        let err: Error = Failure::new(ServerErrorCode::UNAUTHORIZED, "no").into();
        assert!(matches!(err, Error::Security(_)));
    }

    #[test]
    fn display_carries_detail() {
        let err = Error::database("Lodestone.ClientError.Statement.SyntaxError", "unexpected token");
        assert!(err.to_string().contains("SyntaxError"));
        assert!(err.to_string().contains("unexpected token"));

        let err = Error::ConnectTimeout { timeout: Duration::from_millis(250) };
        assert!(err.to_string().contains("250ms"));
    }
}
