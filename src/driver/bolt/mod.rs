//! Client-side wire machinery: socket transport, message engine and
//! the authenticated connection the pool hands out.
//!
//! ```text
//! Session / Transaction
//!   └── Connection (handshake + HELLO, GOODBYE)
//!         └── MessageEngine (FIFO response handlers, pipelining)
//!               └── ChunkFramer + PackStream (from crate::bolt)
//!                     └── TransportStream (TCP, optionally TLS)
//! ```

pub mod connection;
pub mod engine;
pub mod transport;

pub use connection::Connection;
pub use engine::{
    sink, MessageEngine, Outcome, ResponseHandler, ResponseSink, SharedSink, SinkHandler,
};
pub use transport::TransportStream;
