//! Bolt request and response messages.
//!
//! Every message is a PackStream struct whose tag identifies the
//! message kind; the fields are message-specific.

pub mod request;
pub mod response;

pub use request::{Auth, Begin, Discard, Hello, Pull, Request, Run};
pub use response::{Failure, Record, Response, Success};

/// Message tag bytes.
pub mod tag {
    /// HELLO (0x01): authenticate and identify the client
    pub const HELLO: u8 = 0x01;
    /// GOODBYE (0x02): close the connection gracefully
    pub const GOODBYE: u8 = 0x02;
    /// RESET (0x0F): abandon queued work, return to ready
    pub const RESET: u8 = 0x0F;
    /// RUN (0x10): execute a statement
    pub const RUN: u8 = 0x10;
    /// BEGIN (0x11): open an explicit transaction
    pub const BEGIN: u8 = 0x11;
    /// COMMIT (0x12)
    pub const COMMIT: u8 = 0x12;
    /// ROLLBACK (0x13)
    pub const ROLLBACK: u8 = 0x13;
    /// DISCARD (0x2F): drop pending records
    pub const DISCARD: u8 = 0x2F;
    /// PULL (0x3F): fetch pending records
    pub const PULL: u8 = 0x3F;

    /// SUCCESS (0x70): request completed, metadata map attached
    pub const SUCCESS: u8 = 0x70;
    /// RECORD (0x71): one result row
    pub const RECORD: u8 = 0x71;
    /// IGNORED (0x7E): request skipped after a failure or reset
    pub const IGNORED: u8 = 0x7E;
    /// FAILURE (0x7F): request failed, code + message attached
    pub const FAILURE: u8 = 0x7F;
}
