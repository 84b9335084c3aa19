//! Synchronous façade.
//!
//! Thin drive-to-completion wrappers around the async driver, session
//! and transaction. There is no second message pipeline: every call
//! blocks the calling thread on the async implementation via an owned
//! current-thread runtime.
//!
//! Must not be used from inside an async runtime; blocking there
//! deadlocks the executor.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::driver::{
    AuthToken, Bookmark, Driver, DriverConfig, QueryResult, Result, Session, SessionConfig,
    Statement, Transaction, TransactionConfig, TransactionState,
};

/// Blocking counterpart of [`Driver`].
pub struct BlockingDriver {
    runtime: Arc<Runtime>,
    inner: Driver,
}

impl BlockingDriver {
    pub fn new(uri: &str, auth: AuthToken) -> Result<Self> {
        Self::with_config(DriverConfig::new(uri, auth)?)
    }

    pub fn with_config(config: DriverConfig) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
            inner: Driver::with_config(config)?,
        })
    }

    pub fn session(&self, config: SessionConfig) -> Result<BlockingSession> {
        Ok(BlockingSession {
            runtime: self.runtime.clone(),
            inner: self.inner.session(config)?,
        })
    }

    pub fn verify_connectivity(&self) -> Result<()> {
        self.runtime.block_on(self.inner.verify_connectivity())
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }
}

/// Blocking counterpart of [`Session`].
pub struct BlockingSession {
    runtime: Arc<Runtime>,
    inner: Session,
}

impl BlockingSession {
    pub fn run(&self, statement: impl Into<Statement>) -> Result<QueryResult> {
        self.runtime.block_on(self.inner.run(statement))
    }

    pub fn begin_transaction(
        &self,
        config: Option<TransactionConfig>,
    ) -> Result<BlockingTransaction> {
        let tx = self.runtime.block_on(self.inner.begin_transaction(config))?;
        Ok(BlockingTransaction {
            runtime: self.runtime.clone(),
            inner: tx,
        })
    }

    pub fn last_bookmark(&self) -> Bookmark {
        self.inner.last_bookmark()
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }
}

/// Blocking counterpart of [`Transaction`].
pub struct BlockingTransaction {
    runtime: Arc<Runtime>,
    inner: Transaction,
}

impl BlockingTransaction {
    pub fn run(&mut self, statement: impl Into<Statement>) -> Result<QueryResult> {
        self.runtime.block_on(self.inner.run(statement))
    }

    pub fn commit(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.commit())
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.rollback())
    }

    pub fn success(&mut self) {
        self.inner.success();
    }

    pub fn failure(&mut self) {
        self.inner.failure();
    }

    pub fn mark_to_close(&mut self) {
        self.inner.mark_to_close();
    }

    pub fn dispose(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.dispose())
    }

    pub fn state(&self) -> TransactionState {
        self.inner.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::packstream::PackValue;
    use crate::driver::bolt::connection::testing::*;
    use crate::driver::{ConnectionPool, PoolConfig};

    #[test]
    fn driver_builds_and_closes() {
        let driver = BlockingDriver::new("bolt://localhost:7697", AuthToken::none()).unwrap();
        let _session = driver.session(SessionConfig::default()).unwrap();
        driver.close().unwrap();
        driver.close().unwrap();
    }

    #[test]
    fn blocking_autocommit_drives_the_async_pipeline() {
        let runtime = Arc::new(
            Builder::new_current_thread().enable_all().build().unwrap(),
        );

        // Script a server: HELLO, then BEGIN/RUN/PULL/COMMIT.
        let session = runtime.block_on(async {
            use tokio::io::AsyncWriteExt;
            let (conn, mut server) = connected_pair(vec![]).await;
            for s in [
                success(&[]),
                success(&[("fields", PackValue::List(vec![PackValue::from("n")]))]),
                record(vec![PackValue::Integer(7)]),
                success(&[]),
                success(&[("bookmark", PackValue::from("lode:bm:blocking"))]),
            ] {
                server.write_all(&frame(s)).await.unwrap();
            }
            // Keep the server half alive for the duration.
            std::mem::forget(server);

            let pool = std::sync::Arc::new(ConnectionPool::new(
                std::sync::Arc::new(DriverConfig::default()),
                PoolConfig::default(),
            ));
            pool.seed(conn);
            Session::new(pool, SessionConfig::default())
        });

        let blocking = BlockingSession { runtime, inner: session };
        let result = blocking.run("RETURN 7 AS n").unwrap();
        let rows: Vec<i64> = result
            .map(|r| r.get(0).unwrap().as_int().unwrap())
            .collect();
        assert_eq!(rows, vec![7]);
        assert_eq!(blocking.last_bookmark().value(), "lode:bm:blocking");
    }
}
