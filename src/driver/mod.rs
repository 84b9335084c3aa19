//! High-level driver API.
//!
//! Core types:
//!
//! - [`Driver`] - entry point; owns the connection pool
//! - [`Session`] - serialises work, carries the bookmark
//! - [`Transaction`] - explicit transaction state machine
//! - [`QueryResult`] / [`Record`] - lazy result cursor
//! - [`Value`] - type-safe database values
//!
//! ```rust,no_run
//! use lodestone_driver::{AuthToken, Driver, SessionConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = Driver::new("bolt://localhost:7697", AuthToken::basic("lode", "secret"))?;
//! let session = driver.session(SessionConfig::default())?;
//!
//! let result = session.run("MATCH (n) RETURN n LIMIT 10").await?;
//! for record in result {
//!     println!("{:?}", record);
//! }
//!
//! session.close().await?;
//! driver.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod bolt;
mod driver;
mod error;
mod pool;
mod record;
mod session;
mod transaction;
mod types;

pub use driver::{
    AuthToken, Driver, DriverConfig, DriverConfigBuilder, Encryption, ServerAddress,
    TrustStrategy,
};
pub use error::{Error, Result};
pub use pool::{ConnectionPool, PoolConfig, PoolMetrics, PooledConnection};
pub use record::{Counters, QueryResult, Record, RecordStream, ResultSummary};
pub use session::{Bookmark, Session, SessionConfig, Statement};
pub use transaction::{ResourceHandler, Transaction, TransactionConfig, TransactionState};
pub use types::{
    Duration, Node, OffsetTime, Path, Point, Relationship, UnboundRelationship, Value,
    ZonedDateTime,
};

/// Build a parameter map for [`Session::run`] and
/// [`Transaction::run`].
///
/// ```rust
/// use lodestone_driver::{params, Statement};
///
/// let stmt = Statement::new("CREATE (n {name: $name})").with_params(params! {
///     "name" => "Ada",
/// });
/// ```
#[macro_export]
macro_rules! params {
    () => {
        std::collections::HashMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(
            map.insert($key.into(), $crate::driver::Value::from($value));
        )+
        map
    }};
}
