//! Connection pool.
//!
//! The pool hands out opened, authenticated connections bound to one
//! protocol version. A connection belongs to exactly one consumer at a
//! time; concurrent acquires are serialized here, not by the callers.
//! Broken connections are discarded on release and never handed out
//! again.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use super::bolt::Connection;
use super::driver::DriverConfig;
use super::error::{Error, Result};

/// Pool tuning knobs.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections checked out plus idle, at most
    pub max_size: usize,
    /// A connection older than this is discarded on its way in or out
    pub max_lifetime: Duration,
    /// An idle connection unused for this long is discarded
    pub idle_timeout: Duration,
    /// How long an acquire waits for a free slot
    pub acquisition_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_lifetime: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(300),
            acquisition_timeout: Duration::from_secs(60),
        }
    }
}

/// Counters exposed for observability.
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub idle: usize,
    pub total_acquisitions: u64,
    pub total_created: u64,
    pub total_discarded: u64,
}

/// A connection checked out of the pool. Release it with
/// [`PooledConnection::release`]; dropping without releasing discards
/// the connection.
pub struct PooledConnection {
    connection: Option<Connection>,
    created_at: Instant,
    pool: Arc<ConnectionPool>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl PooledConnection {
    /// The underlying connection. Present for the whole checkout.
    pub fn connection_mut(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .expect("connection present until release")
    }

    pub fn is_open(&self) -> bool {
        self.connection.as_ref().map(Connection::is_open).unwrap_or(false)
    }

    /// Return the connection to the pool. Happens at most once per
    /// acquisition; the pool keeps it only if it is still healthy.
    pub fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.clone().take_back(connection, self.created_at);
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // Not released explicitly: the connection may carry unknown
        // state, so it is discarded rather than reused.
        if let Some(connection) = self.connection.take() {
            self.pool.discard(connection);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("open", &self.is_open())
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}

struct IdleConnection {
    connection: Connection,
    created_at: Instant,
    idle_since: Instant,
}

/// The pool itself. Shared behind an [`Arc`] by driver and sessions.
pub struct ConnectionPool {
    driver_config: Arc<DriverConfig>,
    config: PoolConfig,
    idle: Mutex<VecDeque<IdleConnection>>,
    slots: Arc<Semaphore>,
    total_acquisitions: AtomicU64,
    total_created: AtomicU64,
    total_discarded: AtomicU64,
}

impl ConnectionPool {
    pub fn new(driver_config: Arc<DriverConfig>, config: PoolConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_size));
        Self {
            driver_config,
            config,
            idle: Mutex::new(VecDeque::new()),
            slots,
            total_acquisitions: AtomicU64::new(0),
            total_created: AtomicU64::new(0),
            total_discarded: AtomicU64::new(0),
        }
    }

    /// Check out a healthy connection, reusing an idle one when
    /// possible and dialing a new one otherwise.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let permit = tokio::time::timeout(
            self.config.acquisition_timeout,
            self.slots.clone().acquire_owned(),
        )
        .await
        .map_err(|_| Error::ServiceUnavailable {
            reason: format!(
                "no pool slot within {:?}",
                self.config.acquisition_timeout
            ),
            attempts: vec![],
        })?
        .map_err(|_| Error::client("connection pool is closed"))?;

        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);

        while let Some(idle) = self.idle.lock().pop_front() {
            if self.still_valid(&idle) {
                return Ok(PooledConnection {
                    connection: Some(idle.connection),
                    created_at: idle.created_at,
                    pool: self.clone(),
                    _permit: permit,
                });
            }
            self.discard(idle.connection);
        }

        let connection =
            Connection::open(&self.driver_config.address, &self.driver_config).await?;
        self.total_created.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection {
            connection: Some(connection),
            created_at: Instant::now(),
            pool: self.clone(),
            _permit: permit,
        })
    }

    fn still_valid(&self, idle: &IdleConnection) -> bool {
        idle.connection.is_open()
            && idle.created_at.elapsed() < self.config.max_lifetime
            && idle.idle_since.elapsed() < self.config.idle_timeout
    }

    /// Keep or discard a released connection.
    fn take_back(self: Arc<Self>, connection: Connection, created_at: Instant) {
        if !connection.is_open()
            || connection.outstanding() > 0
            || created_at.elapsed() >= self.config.max_lifetime
        {
            self.discard(connection);
            return;
        }
        self.idle.lock().push_back(IdleConnection {
            connection,
            created_at,
            idle_since: Instant::now(),
        });
    }

    fn discard(&self, mut connection: Connection) {
        self.total_discarded.fetch_add(1, Ordering::Relaxed);
        // Closing says GOODBYE when the connection still can. Outside
        // a runtime the socket is simply dropped.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = connection.close().await;
            });
        }
    }

    /// Close every idle connection and refuse further acquires.
    pub async fn close(&self) -> Result<()> {
        self.slots.close();
        let drained: Vec<IdleConnection> = self.idle.lock().drain(..).collect();
        for mut idle in drained {
            let _ = idle.connection.close().await;
        }
        Ok(())
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            idle: self.idle.lock().len(),
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
        }
    }

    /// Seed an already-established connection, bypassing the dialer.
    #[cfg(test)]
    pub(crate) fn seed(&self, connection: Connection) {
        self.idle.lock().push_back(IdleConnection {
            connection,
            created_at: Instant::now(),
            idle_since: Instant::now(),
        });
    }
}
