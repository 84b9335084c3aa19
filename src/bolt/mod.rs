//! Low-level Bolt protocol implementation.
//!
//! The wire stack, bottom up:
//!
//! - [`packstream`] - self-describing binary value codec
//! - [`chunk`] - length-prefixed message framing
//! - [`message`] - request/response message types
//! - [`handshake`] - magic prefix and version negotiation
//! - [`error`] - wire-level error types
//!
//! Most users should work through the high-level [`crate::driver`]
//! module instead of these types.

pub mod chunk;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;

pub use chunk::ChunkFramer;
pub use error::{HandshakeError, ServerErrorCode, WireError, WireResult};
pub use handshake::{BoltVersion, BOLT_MAGIC};
pub use message::{Auth, Begin, Discard, Failure, Hello, Pull, Record, Request, Response, Run, Success};
pub use packstream::{PackError, PackStruct, PackValue};
