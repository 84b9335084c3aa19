//! Records, result cursors and summaries.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;

use crate::bolt::message::Success;
use crate::bolt::packstream::PackValue;

use super::error::{Error, Result};
use super::types::Value;

/// One row of a result: field values addressed by position or by the
/// column keys shared across the whole result.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    keys: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(keys: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { keys, values }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value under a column key.
    pub fn get_by_key(&self, key: &str) -> Option<&Value> {
        let index = self.keys.iter().position(|k| k == key)?;
        self.values.get(index)
    }

    /// Typed value under a column key.
    pub fn get_as<T: TryFrom<Value, Error = Error>>(&self, key: &str) -> Result<T> {
        let value = self
            .get_by_key(key)
            .cloned()
            .ok_or_else(|| Error::client(format!("no column named {:?}", key)))?;
        T::try_from(value)
    }
}

/// Cursor over the records of one result. Yields lazily both as an
/// [`Iterator`] and as a [`Stream`].
#[derive(Debug, Default)]
pub struct RecordStream {
    records: VecDeque<Record>,
}

impl RecordStream {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The one record of a single-row result; an error when the result
    /// holds zero or more than one.
    pub fn single(mut self) -> Result<Record> {
        match (self.records.pop_front(), self.records.pop_front()) {
            (Some(record), None) => Ok(record),
            (None, _) => Err(Error::client("result contains no records")),
            (Some(_), Some(_)) => Err(Error::client("result contains more than one record")),
        }
    }

    pub fn first(mut self) -> Option<Record> {
        self.records.pop_front()
    }

    pub fn collect_all(self) -> Vec<Record> {
        self.records.into()
    }
}

impl Iterator for RecordStream {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.records.pop_front()
    }
}

impl Stream for RecordStream {
    type Item = Record;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Record>> {
        Poll::Ready(self.get_mut().records.pop_front())
    }
}

/// Update counters reported in a statement's terminal SUCCESS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
    pub properties_set: i64,
    pub labels_added: i64,
    pub labels_removed: i64,
    pub indexes_added: i64,
    pub indexes_removed: i64,
    pub constraints_added: i64,
    pub constraints_removed: i64,
}

impl Counters {
    pub fn contains_updates(&self) -> bool {
        self.nodes_created > 0
            || self.nodes_deleted > 0
            || self.relationships_created > 0
            || self.relationships_deleted > 0
            || self.properties_set > 0
            || self.labels_added > 0
            || self.labels_removed > 0
    }

    pub fn contains_system_updates(&self) -> bool {
        self.indexes_added > 0
            || self.indexes_removed > 0
            || self.constraints_added > 0
            || self.constraints_removed > 0
    }

    fn from_stats(stats: &HashMap<String, PackValue>) -> Self {
        let get = |key: &str| stats.get(key).and_then(|v| v.as_int()).unwrap_or(0);
        Self {
            nodes_created: get("nodes-created"),
            nodes_deleted: get("nodes-deleted"),
            relationships_created: get("relationships-created"),
            relationships_deleted: get("relationships-deleted"),
            properties_set: get("properties-set"),
            labels_added: get("labels-added"),
            labels_removed: get("labels-removed"),
            indexes_added: get("indexes-added"),
            indexes_removed: get("indexes-removed"),
            constraints_added: get("constraints-added"),
            constraints_removed: get("constraints-removed"),
        }
    }
}

/// Terminal summary of one executed statement.
#[derive(Debug, Clone, Default)]
pub struct ResultSummary {
    pub statement: Option<String>,
    pub server: Option<String>,
    pub database: Option<String>,
    pub counters: Counters,
    pub result_available_after: Option<Duration>,
    pub result_consumed_after: Option<Duration>,
}

impl ResultSummary {
    /// Build a summary from the RUN and PULL SUCCESS metadata.
    pub(crate) fn from_metadata(statement: &str, run: &Success, pull: &Success) -> Self {
        let millis = |success: &Success, key: &str| {
            success
                .get(key)
                .and_then(|v| v.as_int())
                .and_then(|ms| u64::try_from(ms).ok())
                .map(Duration::from_millis)
        };
        Self {
            statement: Some(statement.to_string()),
            server: run.server().or(pull.server()).map(String::from),
            database: pull.db().or(run.db()).map(String::from),
            counters: pull.stats().map(Counters::from_stats).unwrap_or_default(),
            result_available_after: millis(run, "t_first"),
            result_consumed_after: millis(pull, "t_last"),
        }
    }
}

/// The outcome of one statement: a record cursor plus its terminal
/// summary.
#[derive(Debug)]
pub struct QueryResult {
    pub records: RecordStream,
    pub keys: Arc<Vec<String>>,
    pub summary: ResultSummary,
}

impl QueryResult {
    pub fn new(records: Vec<Record>, keys: Arc<Vec<String>>, summary: ResultSummary) -> Self {
        Self {
            records: RecordStream::new(records),
            keys,
            summary,
        }
    }

    pub fn empty() -> Self {
        Self {
            records: RecordStream::empty(),
            keys: Arc::new(Vec::new()),
            summary: ResultSummary::default(),
        }
    }

    pub fn single(self) -> Result<Record> {
        self.records.single()
    }

    pub fn first(self) -> Option<Record> {
        self.records.first()
    }

    pub fn collect(self) -> Vec<Record> {
        self.records.collect_all()
    }
}

impl Iterator for QueryResult {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.records.next()
    }
}
