//! Message engine: encodes outgoing requests, decodes responses and
//! dispatches them to per-request handlers in FIFO order.
//!
//! Requests are pipelined: enqueueing never touches the network.
//! [`MessageEngine::flush`] drains the outgoing buffer and
//! [`MessageEngine::sync`] additionally reads until every outstanding
//! handler has received its terminal response. RECORD responses stream
//! into the front handler without popping it; SUCCESS, FAILURE and
//! IGNORED pop exactly one handler each.
//!
//! A fatal I/O or protocol error completes every outstanding handler
//! with a transport failure and marks the engine broken; all further
//! operations fail fast with the stored error.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Decoder;

use crate::bolt::chunk::{write_message, ChunkFramer};
use crate::bolt::message::{Failure, Request, Response, Success};
use crate::bolt::packstream::{self, PackValue};
use crate::driver::error::{Error, Result};

/// Status code attached to handlers completed by a connection failure.
pub const TRANSPORT_FAILURE_CODE: &str = "Lodestone.Driver.TransportFailure";

/// Per-request response callbacks.
///
/// One handler is appended per request; the engine delivers zero or
/// more `on_record` calls followed by exactly one terminal callback.
pub trait ResponseHandler: Send {
    fn on_success(&mut self, success: Success);
    fn on_record(&mut self, fields: Vec<PackValue>);
    fn on_failure(&mut self, failure: Failure);
    fn on_ignored(&mut self);
}

/// Terminal outcome observed by a [`ResponseSink`].
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Success),
    Failure(Failure),
    Ignored,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Accumulating handler state shared between the engine and the caller
/// that enqueued the request.
#[derive(Debug, Default)]
pub struct ResponseSink {
    pub records: Vec<Vec<PackValue>>,
    pub outcome: Option<Outcome>,
}

/// Shared handle to a [`ResponseSink`].
pub type SharedSink = Arc<Mutex<ResponseSink>>;

/// Create an empty shared sink.
pub fn sink() -> SharedSink {
    Arc::new(Mutex::new(ResponseSink::default()))
}

/// Handler that stores everything it observes into a shared sink.
pub struct SinkHandler {
    sink: SharedSink,
}

impl SinkHandler {
    pub fn boxed(sink: SharedSink) -> Box<Self> {
        Box::new(Self { sink })
    }
}

impl ResponseHandler for SinkHandler {
    fn on_success(&mut self, success: Success) {
        self.sink.lock().outcome = Some(Outcome::Success(success));
    }

    fn on_record(&mut self, fields: Vec<PackValue>) {
        self.sink.lock().records.push(fields);
    }

    fn on_failure(&mut self, failure: Failure) {
        self.sink.lock().outcome = Some(Outcome::Failure(failure));
    }

    fn on_ignored(&mut self) {
        self.sink.lock().outcome = Some(Outcome::Ignored);
    }
}

/// The request/response pipeline over one connection.
pub struct MessageEngine<S> {
    stream: S,
    framer: ChunkFramer,
    outgoing: BytesMut,
    incoming: BytesMut,
    handlers: VecDeque<Box<dyn ResponseHandler>>,
    /// Handlers still to be completed as IGNORED after a reset
    ignore_remaining: usize,
    /// Set on the first fatal error; everything fails fast afterwards
    broken: Option<String>,
    submitted: u64,
    completed: u64,
}

impl<S: AsyncRead + AsyncWrite + Unpin> MessageEngine<S> {
    pub fn new(stream: S, default_read_buffer: usize, max_read_buffer: usize) -> Self {
        Self {
            stream,
            framer: ChunkFramer::with_buffer_limits(default_read_buffer, max_read_buffer),
            outgoing: BytesMut::with_capacity(default_read_buffer),
            incoming: BytesMut::with_capacity(default_read_buffer),
            handlers: VecDeque::new(),
            ignore_remaining: 0,
            broken: None,
            submitted: 0,
            completed: 0,
        }
    }

    /// Requests awaiting their terminal response. Always equal to
    /// submitted minus completed.
    pub fn outstanding(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    /// Encode a request and append its handler. Does not touch the
    /// network; requests pipeline until the next flush.
    pub fn enqueue(&mut self, request: &Request, handler: Box<dyn ResponseHandler>) -> Result<()> {
        self.check_usable()?;
        let value = PackValue::Struct(request.to_struct());
        let payload = packstream::encode(&value).map_err(|e| Error::protocol(e.to_string()))?;
        write_message(&payload, &mut self.outgoing);
        self.handlers.push_back(handler);
        self.submitted += 1;
        tracing::trace!(message = request.name(), outstanding = self.handlers.len(), "enqueued");
        Ok(())
    }

    /// Drain buffered outgoing bytes to the socket.
    pub async fn flush(&mut self) -> Result<()> {
        self.check_usable()?;
        if self.outgoing.is_empty() {
            return Ok(());
        }
        let buffered = self.outgoing.split();
        if let Err(e) = self.stream.write_all(&buffered).await {
            return Err(self.fatal(Error::transport(format!("write failed: {}", e))));
        }
        if let Err(e) = self.stream.flush().await {
            return Err(self.fatal(Error::transport(format!("flush failed: {}", e))));
        }
        Ok(())
    }

    /// Read whole messages until exactly one has been dispatched.
    pub async fn receive_one(&mut self) -> Result<()> {
        self.check_usable()?;
        loop {
            match self.framer.decode(&mut self.incoming) {
                Ok(Some(payload)) => {
                    let response = match decode_response(&payload) {
                        Ok(response) => response,
                        Err(e) => return Err(self.fatal(e)),
                    };
                    return self.dispatch(response);
                }
                Ok(None) => {}
                Err(e) => return Err(self.fatal(e.into())),
            }

            match self.stream.read_buf(&mut self.incoming).await {
                Ok(0) => {
                    return Err(self.fatal(Error::transport("connection closed by server")));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(self.fatal(Error::transport(format!("read failed: {}", e))));
                }
            }
        }
    }

    /// Flush, then read responses until no handler is outstanding.
    pub async fn sync(&mut self) -> Result<()> {
        self.flush().await?;
        while !self.handlers.is_empty() {
            self.receive_one().await?;
        }
        Ok(())
    }

    /// Encode a request that the server never answers (GOODBYE). No
    /// handler is queued.
    pub fn enqueue_no_response(&mut self, request: &Request) -> Result<()> {
        self.check_usable()?;
        let value = PackValue::Struct(request.to_struct());
        let payload = packstream::encode(&value).map_err(|e| Error::protocol(e.to_string()))?;
        write_message(&payload, &mut self.outgoing);
        Ok(())
    }

    /// Abandon queued work server-side. Every handler queued before
    /// the reset observes an IGNORED outcome, whatever the server
    /// actually answers, up to the SUCCESS for the reset itself.
    pub fn reset(&mut self, handler: Box<dyn ResponseHandler>) -> Result<()> {
        self.check_usable()?;
        let pending = self.handlers.len();
        self.enqueue(&Request::Reset, handler)?;
        self.ignore_remaining = pending;
        tracing::debug!(pending, "reset enqueued");
        Ok(())
    }

    /// Shut the stream down. The engine is unusable afterwards.
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
        if self.broken.is_none() {
            self.broken = Some("connection closed".into());
        }
    }

    /// Borrow the underlying stream, for the pre-message handshake.
    pub(crate) fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    fn check_usable(&self) -> Result<()> {
        match &self.broken {
            Some(reason) => Err(Error::transport(format!(
                "connection is broken: {}",
                reason
            ))),
            None => Ok(()),
        }
    }

    fn dispatch(&mut self, response: Response) -> Result<()> {
        if !response.is_terminal() {
            let fields = match response {
                Response::Record(record) => record.fields,
                _ => unreachable!("only RECORD is non-terminal"),
            };
            if self.ignore_remaining > 0 {
                // Records for a request that the reset abandoned.
                return Ok(());
            }
            match self.handlers.front_mut() {
                Some(handler) => {
                    handler.on_record(fields);
                    Ok(())
                }
                None => Err(self.fatal(Error::protocol("RECORD with no outstanding request"))),
            }
        } else {
            let mut handler = match self.handlers.pop_front() {
                Some(handler) => handler,
                None => {
                    return Err(self.fatal(Error::protocol(format!(
                        "{} with no outstanding request",
                        response.name()
                    ))))
                }
            };
            self.completed += 1;

            if self.ignore_remaining > 0 {
                self.ignore_remaining -= 1;
                handler.on_ignored();
                return Ok(());
            }

            match response {
                Response::Success(success) => handler.on_success(success),
                Response::Failure(failure) => handler.on_failure(failure),
                Response::Ignored => handler.on_ignored(),
                Response::Record(_) => unreachable!("RECORD is non-terminal"),
            }
            Ok(())
        }
    }

    /// Complete every outstanding handler with a transport failure,
    /// mark the engine broken and hand the error back.
    fn fatal(&mut self, error: Error) -> Error {
        let reason = error.to_string();
        tracing::warn!(%reason, outstanding = self.handlers.len(), "connection failed");
        while let Some(mut handler) = self.handlers.pop_front() {
            self.completed += 1;
            handler.on_failure(Failure::new(TRANSPORT_FAILURE_CODE, reason.clone()));
        }
        self.ignore_remaining = 0;
        self.broken = Some(reason);
        error
    }

    #[cfg(test)]
    fn accounted(&self) -> (u64, u64) {
        (self.submitted, self.completed)
    }
}

fn decode_response(payload: &[u8]) -> Result<Response> {
    let value = packstream::decode(payload).map_err(|e| Error::protocol(e.to_string()))?;
    let s = value
        .as_struct()
        .ok_or_else(|| Error::protocol(format!("expected message struct, got {}", value.kind())))?;
    Response::from_struct(s).map_err(|e| Error::protocol(e.to_string()))
}
