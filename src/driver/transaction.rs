//! Explicit transactions.
//!
//! A transaction borrows its connection from the pool for its whole
//! life and gives it back through a one-shot resource handler, invoked
//! exactly once on termination together with the final bookmark. The
//! session supplies that handler; the transaction holds no reference
//! back to the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::bolt::message::{Begin, Pull, Request, Run, Success};

use super::bolt::{sink, Outcome, SharedSink, SinkHandler};
use super::error::{Error, Result};
use super::pool::PooledConnection;
use super::record::{QueryResult, Record, ResultSummary};
use super::session::{Bookmark, Statement};
use super::types::Value;

/// Message used whenever a statement is rejected because the
/// transaction no longer accepts work.
pub(crate) const CANNOT_RUN: &str = "Cannot run more statements in this transaction";

/// One-shot callback that returns the connection to its pool and
/// surfaces the transaction's final bookmark. The connection is absent
/// when the transaction was dropped without disposing.
pub type ResourceHandler = Box<dyn FnOnce(Option<PooledConnection>, Bookmark) + Send>;

/// Per-transaction options sent with BEGIN.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    pub timeout: Option<Duration>,
    pub metadata: HashMap<String, Value>,
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Transaction lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Created, BEGIN not yet acknowledged
    Ready,
    /// BEGIN acknowledged; statements may run
    Active,
    /// COMMIT in flight
    Committing,
    /// ROLLBACK in flight
    RollingBack,
    /// Committed
    Succeeded,
    /// Commit or statement failed
    Failed,
    /// Rolled back
    Aborted,
    /// Closed without wire traffic; rejects all further operations
    MarkedToClose,
}

impl TransactionState {
    /// States that reject further operations.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Aborted | Self::MarkedToClose
        )
    }
}

/// An explicit transaction.
pub struct Transaction {
    connection: Option<PooledConnection>,
    state: TransactionState,
    /// Latching success flag; see [`Transaction::success`]
    success: bool,
    /// Latching failure flag; wins over success
    failure: bool,
    bookmark: Bookmark,
    on_dispose: Option<ResourceHandler>,
    database: Option<String>,
}

impl Transaction {
    /// Send BEGIN and await its acknowledgement. On failure the
    /// resource handler is notified before the error is returned.
    pub(crate) async fn begin(
        connection: PooledConnection,
        bookmark: Bookmark,
        config: TransactionConfig,
        database: Option<String>,
        on_dispose: ResourceHandler,
    ) -> Result<Self> {
        let mut tx = Self {
            connection: Some(connection),
            state: TransactionState::Ready,
            success: false,
            failure: false,
            bookmark: Bookmark::empty(),
            on_dispose: Some(on_dispose),
            database,
        };

        let mut begin = Begin::new();
        if !bookmark.is_empty() {
            begin = begin.with_bookmarks(vec![bookmark.value().to_string()]);
        }
        if let Some(timeout) = config.timeout {
            begin = begin.with_timeout(timeout);
        }
        if let Some(db) = &tx.database {
            begin = begin.with_database(db.clone());
        }
        if !config.metadata.is_empty() {
            begin = begin.with_metadata(
                config
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_wire()))
                    .collect(),
            );
        }

        let begin_sink = sink();
        let result = tx
            .exchange(&[(Request::Begin(begin), begin_sink.clone())])
            .await
            .and_then(|_| expect_success(&begin_sink, "BEGIN"));

        match result {
            Ok(_) => {
                tx.state = TransactionState::Active;
                Ok(tx)
            }
            Err(err) => {
                tx.state = TransactionState::Failed;
                tx.notify();
                Err(err)
            }
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// The bookmark returned by a successful commit; empty otherwise.
    pub fn bookmark(&self) -> &Bookmark {
        &self.bookmark
    }

    /// Latch the success flag: dispose will commit instead of rolling
    /// back, unless a later [`Transaction::failure`] wins.
    pub fn success(&mut self) {
        self.success = true;
    }

    /// Latch the failure flag. Rollback beats commit.
    pub fn failure(&mut self) {
        self.failure = true;
    }

    /// Close the transaction without any wire traffic. Further runs,
    /// commits and rollbacks are rejected; dispose still notifies the
    /// resource handler.
    pub fn mark_to_close(&mut self) {
        if !self.state.is_closed() {
            self.state = TransactionState::MarkedToClose;
        }
    }

    /// Execute a statement inside the transaction.
    pub async fn run(&mut self, statement: impl Into<Statement>) -> Result<QueryResult> {
        match self.state {
            TransactionState::Active => {}
            TransactionState::MarkedToClose => {
                return Err(Error::client(CANNOT_RUN));
            }
            state => {
                return Err(Error::client(format!("{}: state is {:?}", CANNOT_RUN, state)));
            }
        }

        let statement = statement.into();
        let run = Run::new(statement.text.clone()).with_parameters(
            statement
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), v.to_wire()))
                .collect(),
        );
        let run_sink = sink();
        let pull_sink = sink();

        let outcome = self
            .exchange(&[
                (Request::Run(run), run_sink.clone()),
                (Request::Pull(Pull::all()), pull_sink.clone()),
            ])
            .await
            .and_then(|_| {
                let run_success = expect_success(&run_sink, "RUN")?;
                let pull_success = expect_success(&pull_sink, "PULL")?;
                Ok((run_success, pull_success))
            });

        match outcome {
            Ok((run_success, pull_success)) => {
                let records = pull_sink.lock().records.split_off(0);
                collect_result(&statement.text, &run_success, records, &pull_success)
            }
            Err(err) => {
                // A failed statement closes the transaction.
                self.failure = true;
                self.state = TransactionState::Failed;
                Err(err)
            }
        }
    }

    /// Commit and surface the server's bookmark.
    pub async fn commit(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Active => self.terminate(true).await,
            TransactionState::MarkedToClose => {
                // No wire traffic; the handler is still owed its
                // exactly-once notification.
                self.notify();
                Err(Error::client("cannot commit: transaction is marked to close"))
            }
            state => Err(Error::client(format!(
                "cannot commit: transaction state is {:?}",
                state
            ))),
        }
    }

    /// Roll the transaction back.
    pub async fn rollback(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Active => self.terminate(false).await,
            TransactionState::MarkedToClose => {
                self.notify();
                Err(Error::client("cannot rollback: transaction is marked to close"))
            }
            state => Err(Error::client(format!(
                "cannot rollback: transaction state is {:?}",
                state
            ))),
        }
    }

    /// Terminate the transaction according to the latched flags:
    /// commit when success was signalled and no failure overrode it,
    /// rollback otherwise. Idempotent; the resource handler is invoked
    /// exactly once across all dispose/commit/rollback calls.
    pub async fn dispose(&mut self) -> Result<()> {
        if self.on_dispose.is_none() {
            return Ok(());
        }
        match self.state {
            TransactionState::Active => {
                let commit = self.success && !self.failure;
                self.terminate(commit).await
            }
            // Already closed, or never became active: nothing crosses
            // the wire, the handler is simply notified.
            _ => {
                self.notify();
                Ok(())
            }
        }
    }

    /// Alias for [`Transaction::dispose`].
    pub async fn close(&mut self) -> Result<()> {
        self.dispose().await
    }

    async fn terminate(&mut self, commit: bool) -> Result<()> {
        let request = if commit { Request::Commit } else { Request::Rollback };
        self.state = if commit {
            TransactionState::Committing
        } else {
            TransactionState::RollingBack
        };

        let terminal_sink = sink();
        let result = self
            .exchange(&[(request, terminal_sink.clone())])
            .await
            .and_then(|_| expect_success(&terminal_sink, if commit { "COMMIT" } else { "ROLLBACK" }));

        let outcome = match result {
            Ok(success) => {
                if commit {
                    self.bookmark = Bookmark::new(success.bookmark().unwrap_or_default());
                    self.state = TransactionState::Succeeded;
                } else {
                    self.state = TransactionState::Aborted;
                }
                Ok(())
            }
            Err(err) => {
                self.state = if commit {
                    TransactionState::Failed
                } else {
                    // Rollback terminates the transaction whatever the
                    // server answered.
                    TransactionState::Aborted
                };
                Err(err)
            }
        };

        self.notify();
        outcome
    }

    /// Enqueue requests on the borrowed connection and drive them to
    /// completion.
    async fn exchange(&mut self, requests: &[(Request, SharedSink)]) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::client("transaction has no connection"))?
            .connection_mut();
        for (request, sink) in requests {
            connection.enqueue(request, SinkHandler::boxed(sink.clone()))?;
        }
        connection.sync().await
    }

    /// Invoke the resource handler, at most once ever.
    fn notify(&mut self) {
        if let Some(handler) = self.on_dispose.take() {
            handler(self.connection.take(), self.bookmark.clone());
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // An undisposed transaction still owes its exactly-once
        // notification. No wire traffic is possible here; dropping the
        // connection discards it instead of returning it dirty.
        if let Some(handler) = self.on_dispose.take() {
            drop(self.connection.take());
            handler(None, self.bookmark.clone());
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("success", &self.success)
            .field("failure", &self.failure)
            .field("database", &self.database)
            .finish()
    }
}

/// Resolve a sink's terminal outcome into its SUCCESS metadata.
pub(crate) fn expect_success(sink: &SharedSink, what: &str) -> Result<Success> {
    match sink.lock().outcome.take() {
        Some(Outcome::Success(success)) => Ok(success),
        Some(Outcome::Failure(failure)) => Err(failure.into()),
        Some(Outcome::Ignored) => Err(Error::database(
            "Lodestone.Driver.RequestIgnored",
            format!("{} was ignored by the server", what),
        )),
        None => Err(Error::protocol(format!("no response to {}", what))),
    }
}

/// Assemble a [`QueryResult`] from the RUN/PULL metadata and records.
pub(crate) fn collect_result(
    statement: &str,
    run_success: &Success,
    raw_records: Vec<Vec<crate::bolt::packstream::PackValue>>,
    pull_success: &Success,
) -> Result<QueryResult> {
    let keys = Arc::new(run_success.fields().unwrap_or_default());
    let records = raw_records
        .into_iter()
        .map(|fields| {
            let values = fields
                .into_iter()
                .map(Value::from_wire)
                .collect::<Result<Vec<_>>>()?;
            Ok(Record::new(keys.clone(), values))
        })
        .collect::<Result<Vec<_>>>()?;
    let summary = ResultSummary::from_metadata(statement, run_success, pull_success);
    Ok(QueryResult::new(records, keys, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::tag;
    use crate::bolt::packstream::PackValue;
    use crate::bolt::ServerErrorCode;
    use crate::driver::bolt::connection::testing::*;
    use crate::driver::driver::DriverConfig;
    use crate::driver::pool::{ConnectionPool, PoolConfig};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;

    struct HandlerProbe {
        calls: Arc<AtomicUsize>,
        bookmark: Arc<Mutex<Option<Bookmark>>>,
    }

    impl HandlerProbe {
        fn new() -> (Self, ResourceHandler) {
            let calls = Arc::new(AtomicUsize::new(0));
            let bookmark = Arc::new(Mutex::new(None));
            let probe = Self {
                calls: calls.clone(),
                bookmark: bookmark.clone(),
            };
            let handler: ResourceHandler = Box::new(move |conn, bm| {
                if let Some(conn) = conn {
                    conn.release();
                }
                calls.fetch_add(1, Ordering::SeqCst);
                *bookmark.lock() = Some(bm);
            });
            (probe, handler)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn bookmark(&self) -> Option<Bookmark> {
            self.bookmark.lock().clone()
        }
    }

    /// A transaction over a scripted server: BEGIN SUCCESS plus the
    /// given follow-up responses are preloaded.
    async fn begun_tx(
        responses: Vec<crate::bolt::packstream::PackStruct>,
    ) -> (Transaction, DuplexStream, HandlerProbe) {
        let (conn, mut server) = connected_pair(vec![]).await;
        let mut all = vec![success(&[])];
        all.extend(responses);
        for s in all {
            use tokio::io::AsyncWriteExt;
            server.write_all(&frame(s)).await.unwrap();
        }

        let pool = Arc::new(ConnectionPool::new(
            Arc::new(DriverConfig::default()),
            PoolConfig::default(),
        ));
        pool.seed(conn);
        let pooled = pool.acquire().await.unwrap();

        let (probe, handler) = HandlerProbe::new();
        let tx = Transaction::begin(
            pooled,
            Bookmark::empty(),
            TransactionConfig::default(),
            None,
            handler,
        )
        .await
        .unwrap();
        (tx, server, probe)
    }

    fn tags_after_hello(raw: &[u8]) -> Vec<u8> {
        // Skip the 20-byte handshake request, then drop HELLO.
        let tags = request_tags(&raw[20..]);
        assert_eq!(tags.first(), Some(&tag::HELLO));
        tags[1..].to_vec()
    }

    #[tokio::test]
    async fn begin_transitions_to_active() {
        let (tx, _server, probe) = begun_tx(vec![]).await;
        assert_eq!(tx.state(), TransactionState::Active);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn begin_carries_session_bookmark() {
        let (conn, mut server) = connected_pair(vec![success(&[])]).await;
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(DriverConfig::default()),
            PoolConfig::default(),
        ));
        pool.seed(conn);
        let pooled = pool.acquire().await.unwrap();

        let (_probe, handler) = HandlerProbe::new();
        let _tx = Transaction::begin(
            pooled,
            Bookmark::new("lode:bm:41"),
            TransactionConfig::default(),
            Some("lode".into()),
            handler,
        )
        .await
        .unwrap();

        let written = drain_written(&mut server).await;
        // The BEGIN payload carries the bookmark string verbatim.
        let needle = b"lode:bm:41";
        assert!(written
            .windows(needle.len())
            .any(|window| window == needle));
    }

    #[tokio::test]
    async fn commit_on_success_flag() {
        let (mut tx, mut server, probe) =
            begun_tx(vec![success(&[("bookmark", PackValue::from("lode:bm:55"))])]).await;

        tx.success();
        tx.dispose().await.unwrap();

        assert_eq!(tx.state(), TransactionState::Succeeded);
        assert_eq!(probe.calls(), 1);
        assert_eq!(probe.bookmark().unwrap().value(), "lode:bm:55");

        let written = drain_written(&mut server).await;
        let tags = tags_after_hello(&written);
        assert_eq!(tags.iter().filter(|t| **t == tag::COMMIT).count(), 1);
        assert_eq!(tags.iter().filter(|t| **t == tag::ROLLBACK).count(), 0);
    }

    #[tokio::test]
    async fn failure_wins_over_success() {
        let (mut tx, mut server, probe) = begun_tx(vec![success(&[])]).await;

        tx.success();
        tx.failure();
        tx.dispose().await.unwrap();

        assert_eq!(tx.state(), TransactionState::Aborted);
        assert_eq!(probe.calls(), 1);

        let written = drain_written(&mut server).await;
        let tags = tags_after_hello(&written);
        assert_eq!(tags.iter().filter(|t| **t == tag::ROLLBACK).count(), 1);
        assert_eq!(tags.iter().filter(|t| **t == tag::COMMIT).count(), 0);
    }

    #[tokio::test]
    async fn dispose_without_success_rolls_back() {
        let (mut tx, mut server, probe) = begun_tx(vec![success(&[])]).await;

        tx.dispose().await.unwrap();

        assert_eq!(tx.state(), TransactionState::Aborted);
        assert_eq!(probe.calls(), 1);
        // Rollback never returns a bookmark.
        assert!(probe.bookmark().unwrap().is_empty());

        let written = drain_written(&mut server).await;
        let tags = tags_after_hello(&written);
        assert_eq!(tags.iter().filter(|t| **t == tag::ROLLBACK).count(), 1);
    }

    #[tokio::test]
    async fn double_dispose_is_a_noop() {
        let (mut tx, mut server, probe) = begun_tx(vec![success(&[])]).await;

        tx.dispose().await.unwrap();
        tx.dispose().await.unwrap();
        tx.dispose().await.unwrap();

        assert_eq!(probe.calls(), 1);
        let written = drain_written(&mut server).await;
        let tags = tags_after_hello(&written);
        assert_eq!(tags.iter().filter(|t| **t == tag::ROLLBACK).count(), 1);
    }

    #[tokio::test]
    async fn marked_to_close_blocks_run() {
        let (mut tx, mut server, _probe) = begun_tx(vec![]).await;
        // Flush any bytes BEGIN produced before the probe window.
        drain_written(&mut server).await;

        tx.mark_to_close();
        let err = tx.run("RETURN 1").await.unwrap_err();
        match err {
            Error::Client(message) => assert!(
                message.starts_with("Cannot run more statements in this transaction"),
                "message was {:?}",
                message
            ),
            other => panic!("expected client error, got {:?}", other),
        }

        // No wire traffic after the mark.
        assert!(drain_written(&mut server).await.is_empty());
    }

    #[tokio::test]
    async fn marked_to_close_suppresses_wire_terminate() {
        let (mut tx, mut server, probe) = begun_tx(vec![]).await;
        drain_written(&mut server).await;

        tx.mark_to_close();
        assert!(tx.commit().await.is_err());
        assert!(tx.rollback().await.is_err());
        tx.dispose().await.unwrap();

        // Nothing crossed the wire and the handler fired exactly once.
        assert!(drain_written(&mut server).await.is_empty());
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn run_streams_records() {
        let (mut tx, _server, _probe) = begun_tx(vec![
            success(&[("fields", PackValue::List(vec![PackValue::from("n")]))]),
            record(vec![PackValue::Integer(1)]),
            record(vec![PackValue::Integer(2)]),
            success(&[]),
        ])
        .await;

        let result = tx.run("UNWIND [1,2] AS n RETURN n").await.unwrap();
        assert_eq!(*result.keys, vec!["n".to_string()]);
        let rows: Vec<i64> = result
            .map(|r| r.get(0).unwrap().as_int().unwrap())
            .collect();
        assert_eq!(rows, vec![1, 2]);
        assert_eq!(tx.state(), TransactionState::Active);
    }

    #[tokio::test]
    async fn failed_run_closes_the_transaction() {
        let (mut tx, _server, probe) = begun_tx(vec![
            failure(ServerErrorCode::SYNTAX_ERROR, "bad syntax"),
            ignored(),
        ])
        .await;

        let err = tx.run("NOT CYPHER").await.unwrap_err();
        assert!(matches!(err, Error::Database { .. }));
        assert_eq!(tx.state(), TransactionState::Failed);

        // Further statements are rejected with the canonical message.
        let err = tx.run("RETURN 1").await.unwrap_err();
        match err {
            Error::Client(message) => {
                assert!(message.starts_with("Cannot run more statements in this transaction"))
            }
            other => panic!("expected client error, got {:?}", other),
        }

        // Dispose after failure issues no further wire traffic but
        // still notifies once.
        tx.dispose().await.unwrap();
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn explicit_commit_stores_bookmark() {
        let (mut tx, _server, probe) =
            begun_tx(vec![success(&[("bookmark", PackValue::from("lode:bm:77"))])]).await;

        tx.commit().await.unwrap();
        assert_eq!(tx.state(), TransactionState::Succeeded);
        assert_eq!(tx.bookmark().value(), "lode:bm:77");
        assert_eq!(probe.calls(), 1);
        assert_eq!(probe.bookmark().unwrap().value(), "lode:bm:77");

        // Terminal states reject further work; the handler does not
        // fire again.
        assert!(tx.commit().await.is_err());
        assert!(tx.run("RETURN 1").await.is_err());
        tx.dispose().await.unwrap();
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn commit_without_bookmark_stores_empty() {
        let (mut tx, _server, probe) = begun_tx(vec![success(&[])]).await;
        tx.commit().await.unwrap();
        assert!(tx.bookmark().is_empty());
        assert!(probe.bookmark().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_reaches_failed_state() {
        let (mut tx, _server, probe) = begun_tx(vec![failure(
            ServerErrorCode::TRANSACTION_TIMEOUT,
            "timed out",
        )])
        .await;

        let err = tx.commit().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(tx.state(), TransactionState::Failed);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn rollback_aborts() {
        let (mut tx, _server, probe) = begun_tx(vec![success(&[])]).await;
        tx.rollback().await.unwrap();
        assert_eq!(tx.state(), TransactionState::Aborted);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn drop_notifies_exactly_once() {
        let (tx, _server, probe) = begun_tx(vec![]).await;
        drop(tx);
        assert_eq!(probe.calls(), 1);
        assert!(probe.bookmark().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_begin_notifies_handler() {
        let (conn, mut server) = connected_pair(vec![]).await;
        {
            use tokio::io::AsyncWriteExt;
            server
                .write_all(&frame(failure(
                    ServerErrorCode::DATABASE_UNAVAILABLE,
                    "unavailable",
                )))
                .await
                .unwrap();
        }

        let pool = Arc::new(ConnectionPool::new(
            Arc::new(DriverConfig::default()),
            PoolConfig::default(),
        ));
        pool.seed(conn);
        let pooled = pool.acquire().await.unwrap();

        let (probe, handler) = HandlerProbe::new();
        let err = Transaction::begin(
            pooled,
            Bookmark::empty(),
            TransactionConfig::default(),
            None,
            handler,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Database { .. }));
        assert_eq!(probe.calls(), 1);
    }

    #[test]
    fn state_closedness() {
        assert!(!TransactionState::Ready.is_closed());
        assert!(!TransactionState::Active.is_closed());
        assert!(!TransactionState::Committing.is_closed());
        assert!(!TransactionState::RollingBack.is_closed());
        assert!(TransactionState::Succeeded.is_closed());
        assert!(TransactionState::Failed.is_closed());
        assert!(TransactionState::Aborted.is_closed());
        assert!(TransactionState::MarkedToClose.is_closed());
    }

    #[test]
    fn config_builder() {
        let config = TransactionConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_metadata("app", "tests");
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.metadata.get("app"), Some(&Value::from("tests")));
    }
}
