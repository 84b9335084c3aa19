//! Sessions.
//!
//! A session serialises the caller's work over pooled connections and
//! carries the causal-consistency bookmark between transactions. It is
//! single-consumer: overlapping operations on one session are caller
//! error, and at most one transaction is live at a time.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::bolt::message::{Begin, Pull, Request, Run};

use super::bolt::{sink, SinkHandler};
use super::error::{Error, Result};
use super::pool::{ConnectionPool, PooledConnection};
use super::record::QueryResult;
use super::transaction::{collect_result, expect_success, ResourceHandler, Transaction, TransactionConfig};
use super::types::Value;

/// Server-issued causal-consistency token. Opaque to the client; the
/// server defines its ordering and the client never reorders it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bookmark {
    value: String,
}

impl Bookmark {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    pub fn empty() -> Self {
        Self::new("")
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<&str> for Bookmark {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Bookmark {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A statement: text plus named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub parameters: HashMap<String, Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }
}

impl From<&str> for Statement {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Statement {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Per-session options.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Database to address; the server default when absent
    pub database: Option<String>,
    /// Bookmark to continue from
    pub bookmark: Option<Bookmark>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_bookmark(mut self, bookmark: Bookmark) -> Self {
        self.bookmark = Some(bookmark);
        self
    }
}

/// A logical container for work against one database.
pub struct Session {
    pool: Arc<ConnectionPool>,
    config: SessionConfig,
    /// Latest bookmark; shared with transaction resource handlers
    bookmark: Arc<Mutex<Bookmark>>,
    /// Whether a transaction is currently live on this session
    tx_active: Arc<AtomicBool>,
    open: RwLock<bool>,
}

impl Session {
    pub(crate) fn new(pool: Arc<ConnectionPool>, config: SessionConfig) -> Self {
        let initial = config.bookmark.clone().unwrap_or_else(Bookmark::empty);
        Self {
            pool,
            config,
            bookmark: Arc::new(Mutex::new(initial)),
            tx_active: Arc::new(AtomicBool::new(false)),
            open: RwLock::new(true),
        }
    }

    /// Execute a statement in an autocommit transaction: BEGIN, RUN,
    /// PULL and COMMIT pipelined in one flush.
    pub async fn run(&self, statement: impl Into<Statement>) -> Result<QueryResult> {
        self.ensure_open()?;
        if self.tx_active.load(Ordering::Acquire) {
            return Err(Error::client(
                "cannot run an autocommit statement while a transaction is open",
            ));
        }
        let statement = statement.into();

        let mut conn = self.pool.acquire().await?;
        match self.run_autocommit(&mut conn, &statement).await {
            Ok(result) => {
                conn.release();
                Ok(result)
            }
            Err(err) => {
                if !err.is_fatal_to_connection() && conn.is_open() {
                    // Bring the connection back to ready before the
                    // pool can reuse it.
                    let _ = conn.connection_mut().reset().await;
                    conn.release();
                }
                Err(err)
            }
        }
    }

    async fn run_autocommit(
        &self,
        conn: &mut PooledConnection,
        statement: &Statement,
    ) -> Result<QueryResult> {
        let bookmark = self.bookmark.lock().clone();

        let mut begin = Begin::new();
        if !bookmark.is_empty() {
            begin = begin.with_bookmarks(vec![bookmark.value().to_string()]);
        }
        if let Some(db) = &self.config.database {
            begin = begin.with_database(db.clone());
        }

        let mut run = Run::new(statement.text.clone()).with_parameters(
            statement
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), v.to_wire()))
                .collect(),
        );
        if let Some(db) = &self.config.database {
            run = run.with_database(db.clone());
        }

        let begin_sink = sink();
        let run_sink = sink();
        let pull_sink = sink();
        let commit_sink = sink();

        let connection = conn.connection_mut();
        connection.enqueue(&Request::Begin(begin), SinkHandler::boxed(begin_sink.clone()))?;
        connection.enqueue(&Request::Run(run), SinkHandler::boxed(run_sink.clone()))?;
        connection.enqueue(&Request::Pull(Pull::all()), SinkHandler::boxed(pull_sink.clone()))?;
        connection.enqueue(&Request::Commit, SinkHandler::boxed(commit_sink.clone()))?;
        connection.sync().await?;

        expect_success(&begin_sink, "BEGIN")?;
        let run_success = expect_success(&run_sink, "RUN")?;
        let pull_success = expect_success(&pull_sink, "PULL")?;
        let commit_success = expect_success(&commit_sink, "COMMIT")?;

        // Adopt the commit bookmark; an absent bookmark leaves the
        // session's causal point unchanged.
        if let Some(bookmark) = commit_success.bookmark() {
            *self.bookmark.lock() = Bookmark::new(bookmark);
        }

        let records = pull_sink.lock().records.split_off(0);
        collect_result(&statement.text, &run_success, records, &pull_success)
    }

    /// Open an explicit transaction carrying the session's bookmark.
    pub async fn begin_transaction(
        &self,
        config: Option<TransactionConfig>,
    ) -> Result<Transaction> {
        self.ensure_open()?;
        if self.tx_active.swap(true, Ordering::AcqRel) {
            return Err(Error::client("session already has an open transaction"));
        }

        let conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(err) => {
                self.tx_active.store(false, Ordering::Release);
                return Err(err);
            }
        };

        let bookmark = self.bookmark.lock().clone();
        let bookmark_slot = self.bookmark.clone();
        let tx_flag = self.tx_active.clone();
        let handler: ResourceHandler = Box::new(move |conn, final_bookmark| {
            if let Some(conn) = conn {
                conn.release();
            }
            // Adopt the transaction's final bookmark, then let the
            // session accept new work.
            if !final_bookmark.is_empty() {
                *bookmark_slot.lock() = final_bookmark;
            }
            tx_flag.store(false, Ordering::Release);
        });

        Transaction::begin(
            conn,
            bookmark,
            config.unwrap_or_default(),
            self.config.database.clone(),
            handler,
        )
        .await
    }

    /// Latest bookmark observed by this session.
    pub fn last_bookmark(&self) -> Bookmark {
        self.bookmark.lock().clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Close the session. Idempotent; further operations are rejected.
    pub async fn close(&self) -> Result<()> {
        *self.open.write() = false;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(Error::client("session is closed"))
        }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.config.database)
            .field("open", &*self.open.read())
            .field("bookmark", &*self.bookmark.lock())
            .finish()
    }
}
