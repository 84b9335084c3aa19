//! Wire-level error types.

use std::fmt;
use std::io;

use super::packstream::PackError;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised by the wire stack. All of them are fatal to the
/// connection that produced them.
#[derive(Debug)]
pub enum WireError {
    /// Underlying socket error
    Io(io::Error),

    /// Handshake failed
    Handshake(HandshakeError),

    /// Value codec failure
    Codec(PackError),

    /// Malformed or out-of-order message
    Protocol(String),

    /// Reassembled message exceeds the configured ceiling
    MessageTooLarge { size: usize, max: usize },

    /// Peer closed the connection
    ConnectionClosed,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Io(e) => write!(f, "I/O error: {}", e),
            WireError::Handshake(e) => write!(f, "handshake error: {}", e),
            WireError::Codec(e) => write!(f, "codec error: {}", e),
            WireError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            WireError::MessageTooLarge { size, max } => {
                write!(f, "message too large: {} bytes (max {})", size, max)
            }
            WireError::ConnectionClosed => write!(f, "connection closed by server"),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Io(e) => Some(e),
            WireError::Handshake(e) => Some(e),
            WireError::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WireError {
    fn from(err: io::Error) -> Self {
        WireError::Io(err)
    }
}

impl From<PackError> for WireError {
    fn from(err: PackError) -> Self {
        WireError::Codec(err)
    }
}

impl From<HandshakeError> for WireError {
    fn from(err: HandshakeError) -> Self {
        WireError::Handshake(err)
    }
}

/// Handshake-specific failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Server answered with version zero: none of the proposals work
    NoSupportedVersion,

    /// Server chose a version this driver never proposed
    UnknownVersion(u32),

    /// Connection closed mid-handshake
    ConnectionClosed,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::NoSupportedVersion => {
                write!(f, "server supports none of the proposed protocol versions")
            }
            HandshakeError::UnknownVersion(v) => {
                write!(f, "server selected unknown protocol version 0x{:08X}", v)
            }
            HandshakeError::ConnectionClosed => {
                write!(f, "connection closed during handshake")
            }
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Server status code prefixes, used to classify FAILURE responses.
pub struct ServerErrorCode;

impl ServerErrorCode {
    pub const CLIENT_PREFIX: &'static str = "Lodestone.ClientError";
    pub const DATABASE_PREFIX: &'static str = "Lodestone.DatabaseError";
    pub const TRANSIENT_PREFIX: &'static str = "Lodestone.TransientError";

    pub const AUTHENTICATION_FAILED: &'static str =
        "Lodestone.ClientError.Security.AuthenticationFailed";
    pub const UNAUTHORIZED: &'static str = "Lodestone.ClientError.Security.Unauthorized";
    pub const SYNTAX_ERROR: &'static str = "Lodestone.ClientError.Statement.SyntaxError";
    pub const TRANSACTION_TIMEOUT: &'static str =
        "Lodestone.TransientError.Transaction.TransactionTimedOut";
    pub const DEADLOCK_DETECTED: &'static str =
        "Lodestone.TransientError.Transaction.DeadlockDetected";
    pub const DATABASE_UNAVAILABLE: &'static str =
        "Lodestone.TransientError.General.DatabaseUnavailable";

    /// Whether a server code marks an error safe to retry.
    pub fn is_transient(code: &str) -> bool {
        code.starts_with(Self::TRANSIENT_PREFIX)
    }

    /// Whether a server code marks an authentication or authorization
    /// failure.
    pub fn is_security(code: &str) -> bool {
        code.contains("Security") || code.contains("Authentication")
    }
}
