//! # Lodestone Driver
//!
//! A Rust driver for the [Lodestone](https://github.com/lodestone-db)
//! graph database, speaking the Bolt binary protocol over TCP with
//! optional TLS.
//!
//! ## Features
//!
//! - **Bolt protocol** - chunked framing, PackStream value codec and a
//!   pipelined request/response engine
//! - **Async core** - built on Tokio; a [`blocking`] façade drives the
//!   same pipeline from synchronous code
//! - **Connection pooling** - opened, authenticated connections reused
//!   across sessions
//! - **Transactions** - explicit transactions with bookmark-based
//!   causal consistency
//! - **Typed values** - graph, spatial and temporal types with
//!   conversions
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use lodestone_driver::{params, AuthToken, Driver, SessionConfig, Statement};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Driver::new(
//!         "bolt://localhost:7697",
//!         AuthToken::basic("lode", "secret"),
//!     )?;
//!     let session = driver.session(SessionConfig::default())?;
//!
//!     let stmt = Statement::new("CREATE (n:Person {name: $name}) RETURN n")
//!         .with_params(params! { "name" => "Ada" });
//!     let result = session.run(stmt).await?;
//!     for record in result {
//!         println!("{:?}", record);
//!     }
//!
//!     session.close().await?;
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Explicit transactions
//!
//! ```rust,no_run
//! # use lodestone_driver::{AuthToken, Driver, SessionConfig};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let driver = Driver::new("bolt://localhost:7697", AuthToken::none())?;
//! # let session = driver.session(SessionConfig::default())?;
//! let mut tx = session.begin_transaction(None).await?;
//! tx.run("CREATE (n:Node {id: 1})").await?;
//! tx.run("CREATE (n:Node {id: 2})").await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - driver, session, transaction and value types
//! - [`bolt`] - low-level wire protocol
//! - [`blocking`] - synchronous façade over the async core

pub mod blocking;
pub mod bolt;
pub mod driver;

pub use driver::{
    AuthToken, Bookmark, Driver, DriverConfig, DriverConfigBuilder, Encryption, Error, Node,
    Path, Point, QueryResult, Record, Relationship, Result, ResultSummary, ServerAddress,
    Session, SessionConfig, Statement, Transaction, TransactionConfig, TransactionState,
    TrustStrategy, Value,
};

pub use bolt::{BoltVersion, PackValue};
