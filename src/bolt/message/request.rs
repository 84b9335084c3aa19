//! Request messages, client to server.

use std::collections::HashMap;
use std::time::Duration;

use super::tag;
use crate::bolt::packstream::{PackStruct, PackValue};

/// Authentication material carried in HELLO.
#[derive(Debug, Clone)]
pub struct Auth {
    /// Scheme name: "none", "basic", "bearer" or custom
    pub scheme: String,
    /// Principal (user name)
    pub principal: Option<String>,
    /// Credentials (password or token)
    pub credentials: Option<String>,
    /// Authentication realm
    pub realm: Option<String>,
}

impl Auth {
    pub fn none() -> Self {
        Self {
            scheme: "none".into(),
            principal: None,
            credentials: None,
            realm: None,
        }
    }

    pub fn basic(principal: impl Into<String>, credentials: impl Into<String>) -> Self {
        Self {
            scheme: "basic".into(),
            principal: Some(principal.into()),
            credentials: Some(credentials.into()),
            realm: None,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            scheme: "bearer".into(),
            principal: None,
            credentials: Some(token.into()),
            realm: None,
        }
    }

    fn write_into(&self, map: &mut HashMap<String, PackValue>) {
        map.insert("scheme".into(), PackValue::from(self.scheme.as_str()));
        if let Some(p) = &self.principal {
            map.insert("principal".into(), PackValue::from(p.as_str()));
        }
        if let Some(c) = &self.credentials {
            map.insert("credentials".into(), PackValue::from(c.as_str()));
        }
        if let Some(r) = &self.realm {
            map.insert("realm".into(), PackValue::from(r.as_str()));
        }
    }
}

/// HELLO: first message after the handshake.
#[derive(Debug, Clone)]
pub struct Hello {
    pub user_agent: String,
    pub auth: Auth,
}

impl Hello {
    pub fn new(user_agent: impl Into<String>, auth: Auth) -> Self {
        Self {
            user_agent: user_agent.into(),
            auth,
        }
    }

    fn to_struct(&self) -> PackStruct {
        let mut extra = HashMap::new();
        extra.insert("user_agent".into(), PackValue::from(self.user_agent.as_str()));
        self.auth.write_into(&mut extra);
        PackStruct::new(tag::HELLO, vec![PackValue::Map(extra)])
    }
}

/// RUN: execute a statement with named parameters.
#[derive(Debug, Clone)]
pub struct Run {
    pub statement: String,
    pub parameters: HashMap<String, PackValue>,
    pub extra: HashMap<String, PackValue>,
}

impl Run {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: HashMap::new(),
            extra: HashMap::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, PackValue>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.extra.insert("db".into(), PackValue::String(database.into()));
        self
    }

    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        if !bookmarks.is_empty() {
            self.extra.insert(
                "bookmarks".into(),
                PackValue::List(bookmarks.into_iter().map(PackValue::String).collect()),
            );
        }
        self
    }

    fn to_struct(&self) -> PackStruct {
        PackStruct::new(
            tag::RUN,
            vec![
                PackValue::from(self.statement.as_str()),
                PackValue::Map(self.parameters.clone()),
                PackValue::Map(self.extra.clone()),
            ],
        )
    }
}

/// PULL: fetch up to `n` pending records (-1 for all).
#[derive(Debug, Clone, Copy)]
pub struct Pull {
    pub n: i64,
    pub qid: Option<i64>,
}

impl Pull {
    pub fn all() -> Self {
        Self { n: -1, qid: None }
    }

    pub fn some(n: i64) -> Self {
        Self { n, qid: None }
    }

    fn to_struct(&self) -> PackStruct {
        let mut extra = HashMap::new();
        extra.insert("n".into(), PackValue::Integer(self.n));
        if let Some(qid) = self.qid {
            extra.insert("qid".into(), PackValue::Integer(qid));
        }
        PackStruct::new(tag::PULL, vec![PackValue::Map(extra)])
    }
}

/// DISCARD: drop up to `n` pending records (-1 for all).
#[derive(Debug, Clone, Copy)]
pub struct Discard {
    pub n: i64,
    pub qid: Option<i64>,
}

impl Discard {
    pub fn all() -> Self {
        Self { n: -1, qid: None }
    }

    fn to_struct(&self) -> PackStruct {
        let mut extra = HashMap::new();
        extra.insert("n".into(), PackValue::Integer(self.n));
        if let Some(qid) = self.qid {
            extra.insert("qid".into(), PackValue::Integer(qid));
        }
        PackStruct::new(tag::DISCARD, vec![PackValue::Map(extra)])
    }
}

/// BEGIN: open an explicit transaction.
#[derive(Debug, Clone, Default)]
pub struct Begin {
    pub bookmarks: Vec<String>,
    pub tx_timeout: Option<Duration>,
    pub database: Option<String>,
    pub metadata: HashMap<String, PackValue>,
}

impl Begin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = Some(timeout);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, PackValue>) -> Self {
        self.metadata = metadata;
        self
    }

    fn to_struct(&self) -> PackStruct {
        let mut extra = HashMap::new();
        if !self.bookmarks.is_empty() {
            extra.insert(
                "bookmarks".into(),
                PackValue::List(self.bookmarks.iter().map(|b| PackValue::from(b.as_str())).collect()),
            );
        }
        if let Some(timeout) = self.tx_timeout {
            extra.insert("tx_timeout".into(), PackValue::Integer(timeout.as_millis() as i64));
        }
        if let Some(db) = &self.database {
            extra.insert("db".into(), PackValue::from(db.as_str()));
        }
        if !self.metadata.is_empty() {
            extra.insert("tx_metadata".into(), PackValue::Map(self.metadata.clone()));
        }
        PackStruct::new(tag::BEGIN, vec![PackValue::Map(extra)])
    }
}

/// All request messages.
#[derive(Debug, Clone)]
pub enum Request {
    Hello(Hello),
    Run(Run),
    Pull(Pull),
    Discard(Discard),
    Begin(Begin),
    Commit,
    Rollback,
    Reset,
    Goodbye,
}

impl Request {
    pub fn tag(&self) -> u8 {
        match self {
            Request::Hello(_) => tag::HELLO,
            Request::Run(_) => tag::RUN,
            Request::Pull(_) => tag::PULL,
            Request::Discard(_) => tag::DISCARD,
            Request::Begin(_) => tag::BEGIN,
            Request::Commit => tag::COMMIT,
            Request::Rollback => tag::ROLLBACK,
            Request::Reset => tag::RESET,
            Request::Goodbye => tag::GOODBYE,
        }
    }

    /// Message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Hello(_) => "HELLO",
            Request::Run(_) => "RUN",
            Request::Pull(_) => "PULL",
            Request::Discard(_) => "DISCARD",
            Request::Begin(_) => "BEGIN",
            Request::Commit => "COMMIT",
            Request::Rollback => "ROLLBACK",
            Request::Reset => "RESET",
            Request::Goodbye => "GOODBYE",
        }
    }

    pub fn to_struct(&self) -> PackStruct {
        match self {
            Request::Hello(msg) => msg.to_struct(),
            Request::Run(msg) => msg.to_struct(),
            Request::Pull(msg) => msg.to_struct(),
            Request::Discard(msg) => msg.to_struct(),
            Request::Begin(msg) => msg.to_struct(),
            Request::Commit => PackStruct::new(tag::COMMIT, vec![]),
            Request::Rollback => PackStruct::new(tag::ROLLBACK, vec![]),
            Request::Reset => PackStruct::new(tag::RESET, vec![]),
            Request::Goodbye => PackStruct::new(tag::GOODBYE, vec![]),
        }
    }
}
