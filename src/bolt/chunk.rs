//! Chunked message framing.
//!
//! On the wire a message is split into chunks, each a big-endian u16
//! length followed by that many payload bytes; a zero-length chunk
//! (`00 00`) terminates the message. The writer splits arbitrarily
//! large payloads to respect the 16-bit length; the reader reassembles
//! chunks into whole messages.
//!
//! The reader reuses its backing buffer across messages. Once the
//! buffer has been observed to exceed the configured maximum capacity
//! it is shrunk back to the default capacity, exactly once per
//! crossing, and the event is counted for logging.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::WireError;

/// Largest payload a single chunk can carry.
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// End-of-message marker.
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Default reader buffer capacity when none is configured.
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// Default maximum reader buffer capacity when none is configured.
pub const MAX_READ_BUFFER: usize = 512 * 1024;

/// Hard ceiling on a single reassembled message.
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Split one message payload into chunks and append the terminator.
pub fn write_message(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len() + (payload.len() / MAX_CHUNK_SIZE + 1) * 2 + 2);
    for chunk in payload.chunks(MAX_CHUNK_SIZE) {
        dst.put_u16(chunk.len() as u16);
        dst.put_slice(chunk);
    }
    dst.put_slice(&END_MARKER);
}

/// Incremental chunk reader and writer.
#[derive(Debug)]
pub struct ChunkFramer {
    /// Accumulates payload bytes of the in-progress message
    message: BytesMut,
    /// Default capacity the buffer shrinks back to
    default_capacity: usize,
    /// Capacity threshold that triggers a shrink
    max_capacity: usize,
    /// How many times the buffer has been shrunk
    shrink_count: u64,
}

impl ChunkFramer {
    pub fn new() -> Self {
        Self::with_buffer_limits(DEFAULT_READ_BUFFER, MAX_READ_BUFFER)
    }

    pub fn with_buffer_limits(default_capacity: usize, max_capacity: usize) -> Self {
        Self {
            message: BytesMut::with_capacity(default_capacity),
            default_capacity,
            max_capacity,
            shrink_count: 0,
        }
    }

    /// How many times the reader buffer has crossed the maximum and
    /// been shrunk back.
    pub fn shrink_count(&self) -> u64 {
        self.shrink_count
    }

    /// Release a completed message, shrinking the backing store if it
    /// was observed over the maximum.
    fn take_message(&mut self) -> BytesMut {
        let observed = self.message.capacity();
        let payload = self.message.split();
        if observed > self.max_capacity {
            self.message = BytesMut::with_capacity(self.default_capacity);
            self.shrink_count += 1;
            tracing::debug!(
                observed,
                max = self.max_capacity,
                count = self.shrink_count,
                "read buffer shrunk to default capacity"
            );
        }
        payload
    }
}

impl Default for ChunkFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkFramer {
    type Item = BytesMut;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, WireError> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }

            let chunk_len = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_len == 0 {
                if self.message.is_empty() {
                    // The protocol never produces an empty message; a
                    // terminator at start-of-message is a framing bug.
                    return Err(WireError::Protocol(
                        "zero-length chunk at start of message".into(),
                    ));
                }
                src.advance(2);
                return Ok(Some(self.take_message()));
            }

            if src.len() < 2 + chunk_len {
                // Truncated length or payload: wait for more bytes.
                return Ok(None);
            }

            if self.message.len() + chunk_len > MAX_MESSAGE_SIZE {
                return Err(WireError::MessageTooLarge {
                    size: self.message.len() + chunk_len,
                    max: MAX_MESSAGE_SIZE,
                });
            }

            src.advance(2);
            self.message.extend_from_slice(&src[..chunk_len]);
            src.advance(chunk_len);
        }
    }
}

impl Encoder<&[u8]> for ChunkFramer {
    type Error = WireError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), WireError> {
        write_message(payload, dst);
        Ok(())
    }
}
