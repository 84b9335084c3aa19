//! An opened, authenticated connection bound to one protocol version.
//!
//! Opening a connection is three steps: socket connect (plus optional
//! TLS wrap), the version handshake, then HELLO with user agent and
//! authentication. Only a connection that has passed all three is
//! handed to the pool.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::bolt::handshake::{self, BoltVersion, HANDSHAKE_RESPONSE_SIZE};
use crate::bolt::message::{Hello, Request};
use crate::driver::driver::{DriverConfig, ServerAddress};
use crate::driver::error::{Error, Result};

use super::engine::{sink, MessageEngine, Outcome, ResponseHandler, SinkHandler};
use super::transport::{self, TransportStream};

/// A live server connection owned by exactly one consumer at a time.
pub struct Connection {
    engine: MessageEngine<TransportStream>,
    version: BoltVersion,
    server_agent: Option<String>,
    connection_id: Option<String>,
    address: ServerAddress,
    open: bool,
}

impl Connection {
    /// Connect, handshake and authenticate.
    pub async fn open(address: &ServerAddress, config: &DriverConfig) -> Result<Self> {
        let stream = transport::connect(address, config).await?;
        Self::establish(stream, address.clone(), config).await
    }

    /// Run the handshake and HELLO over an already-connected stream.
    pub(crate) async fn establish(
        stream: TransportStream,
        address: ServerAddress,
        config: &DriverConfig,
    ) -> Result<Self> {
        let mut engine = MessageEngine::new(
            stream,
            config.default_read_buffer_size,
            config.max_read_buffer_size,
        );

        let version = Self::handshake(&mut engine).await?;
        tracing::debug!(%address, %version, "protocol version negotiated");

        let hello = Hello::new(config.user_agent.clone(), config.auth.to_wire());
        let hello_sink = sink();
        engine.enqueue(&Request::Hello(hello), SinkHandler::boxed(hello_sink.clone()))?;
        engine.sync().await?;

        let outcome = hello_sink.lock().outcome.take();
        let success = match outcome {
            Some(Outcome::Success(success)) => success,
            Some(Outcome::Failure(failure)) => return Err(failure.into()),
            Some(Outcome::Ignored) | None => {
                return Err(Error::protocol("unexpected response to HELLO"))
            }
        };

        tracing::debug!(
            %address,
            server = success.server().unwrap_or("unknown"),
            "connection authenticated"
        );

        Ok(Self {
            server_agent: success.server().map(String::from),
            connection_id: success.connection_id().map(String::from),
            engine,
            version,
            address,
            open: true,
        })
    }

    /// Exchange the magic prefix and version proposals.
    async fn handshake(engine: &mut MessageEngine<TransportStream>) -> Result<BoltVersion> {
        let request = handshake::build_request(&BoltVersion::PROPOSED);
        let stream = engine.stream_mut();
        stream
            .write_all(&request)
            .await
            .map_err(|e| Error::transport(format!("handshake write failed: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::transport(format!("handshake flush failed: {}", e)))?;

        let mut response = [0u8; HANDSHAKE_RESPONSE_SIZE];
        stream
            .read_exact(&mut response)
            .await
            .map_err(|e| Error::transport(format!("handshake read failed: {}", e)))?;

        handshake::parse_response(response)
            .map_err(|e| Error::protocol(e.to_string()))
    }

    pub fn protocol_version(&self) -> BoltVersion {
        self.version
    }

    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Whether the connection can still carry requests. A broken
    /// connection is never returned to the pool.
    pub fn is_open(&self) -> bool {
        self.open && !self.engine.is_broken()
    }

    /// Requests awaiting their terminal response.
    pub fn outstanding(&self) -> usize {
        self.engine.outstanding()
    }

    /// Pipeline a request; the wire is not touched until the next
    /// flush or sync.
    pub fn enqueue(&mut self, request: &Request, handler: Box<dyn ResponseHandler>) -> Result<()> {
        self.engine.enqueue(request, handler)
    }

    /// Drain buffered requests to the socket.
    pub async fn flush(&mut self) -> Result<()> {
        self.engine.flush().await
    }

    /// Read whole messages until exactly one response has been
    /// dispatched to its handler.
    pub async fn receive_one(&mut self) -> Result<()> {
        self.engine.receive_one().await
    }

    /// Flush and read until every outstanding handler completed.
    pub async fn sync(&mut self) -> Result<()> {
        self.engine.sync().await
    }

    /// Abandon queued work and return the server to ready. Handlers
    /// queued before the reset observe IGNORED outcomes.
    pub async fn reset(&mut self) -> Result<()> {
        let reset_sink = sink();
        self.engine.reset(SinkHandler::boxed(reset_sink.clone()))?;
        self.engine.sync().await?;

        let outcome = reset_sink.lock().outcome.take();
        match outcome {
            Some(Outcome::Success(_)) => Ok(()),
            Some(Outcome::Failure(failure)) => Err(failure.into()),
            Some(Outcome::Ignored) | None => Err(Error::protocol("unexpected response to RESET")),
        }
    }

    /// Say GOODBYE and shut the socket down. Idempotent; a closed or
    /// broken connection returns cleanly.
    pub async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        if !self.engine.is_broken() {
            // GOODBYE is fire-and-forget: no response follows.
            let _ = self.engine.enqueue_no_response(&Request::Goodbye);
            let _ = self.engine.flush().await;
        }
        self.engine.shutdown().await;
        tracing::debug!(address = %self.address, "connection closed");
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("version", &self.version)
            .field("open", &self.is_open())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
