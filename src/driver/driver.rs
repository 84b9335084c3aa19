//! Driver entry point and configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::bolt::chunk::{DEFAULT_READ_BUFFER, MAX_READ_BUFFER};
use crate::bolt::message::Auth;

use super::error::{Error, Result};
use super::pool::{ConnectionPool, PoolConfig};
use super::session::{Session, SessionConfig};

/// Authentication material sent in HELLO.
#[derive(Debug, Clone, Default)]
pub enum AuthToken {
    /// No authentication
    #[default]
    None,
    /// User name and password
    Basic {
        username: String,
        password: String,
        realm: Option<String>,
    },
    /// Opaque bearer token
    Bearer { token: String },
    /// Custom scheme
    Custom {
        scheme: String,
        principal: String,
        credentials: String,
    },
}

impl AuthToken {
    pub fn none() -> Self {
        Self::None
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: None,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer { token: token.into() }
    }

    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
            Self::Custom { scheme, .. } => scheme,
        }
    }

    /// Convert to the wire-level HELLO payload.
    pub(crate) fn to_wire(&self) -> Auth {
        match self {
            Self::None => Auth::none(),
            Self::Basic { username, password, realm } => {
                let mut auth = Auth::basic(username.clone(), password.clone());
                auth.realm = realm.clone();
                auth
            }
            Self::Bearer { token } => Auth::bearer(token.clone()),
            Self::Custom { scheme, principal, credentials } => Auth {
                scheme: scheme.clone(),
                principal: Some(principal.clone()),
                credentials: Some(credentials.clone()),
                realm: None,
            },
        }
    }
}

/// Whether the transport wraps the stream in TLS before HELLO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    /// Plain TCP
    #[default]
    Off,
    /// TLS required; connect fails if the handshake does
    Required,
}

/// Certificate validation policy used when encryption is on.
#[derive(Debug, Clone, Default)]
pub enum TrustStrategy {
    /// Validate against the bundled system roots
    #[default]
    TrustSystemCas,
    /// Accept any certificate. Development only.
    TrustAllCertificates,
    /// Validate against the supplied DER-encoded roots
    TrustCustomCas { certificates: Vec<Vec<u8>> },
}

/// Host and port of a Lodestone server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub const DEFAULT_PORT: u16 = 7697;

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Parse `bolt://host[:port]` and the `+s` TLS variants.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .trim_start_matches("bolt+s://")
            .trim_start_matches("bolt://")
            .trim_start_matches("lodestone+s://")
            .trim_start_matches("lodestone://");

        let parts: Vec<&str> = rest.split(':').collect();
        match parts.len() {
            1 if !parts[0].is_empty() => Ok(Self::new(parts[0], Self::DEFAULT_PORT)),
            2 => {
                let port = parts[1]
                    .parse()
                    .map_err(|_| Error::client(format!("invalid port in URI {:?}", uri)))?;
                Ok(Self::new(parts[0], port))
            }
            _ => Err(Error::client(format!("invalid server URI {:?}", uri))),
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", Self::DEFAULT_PORT)
    }
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub address: ServerAddress,
    pub auth: AuthToken,
    pub encryption: Encryption,
    pub trust_strategy: TrustStrategy,
    /// Include IPv6 addresses when resolving the host
    pub ipv6_enabled: bool,
    /// Wall-clock bound on each socket connect attempt
    pub connection_timeout: Duration,
    pub socket_keepalive: bool,
    /// Capacity the chunk reader shrinks back to
    pub default_read_buffer_size: usize,
    /// Reader capacity that triggers a shrink once crossed
    pub max_read_buffer_size: usize,
    pub user_agent: String,
    pub max_connection_pool_size: usize,
    pub connection_acquisition_timeout: Duration,
}

impl DriverConfig {
    pub fn new(uri: &str, auth: AuthToken) -> Result<Self> {
        let encryption = if uri.contains("+s://") {
            Encryption::Required
        } else {
            Encryption::Off
        };
        Ok(Self {
            address: ServerAddress::from_uri(uri)?,
            auth,
            encryption,
            ..Self::default()
        })
    }

    pub fn builder(uri: &str, auth: AuthToken) -> Result<DriverConfigBuilder> {
        Ok(DriverConfigBuilder {
            config: Self::new(uri, auth)?,
        })
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: ServerAddress::default(),
            auth: AuthToken::default(),
            encryption: Encryption::Off,
            trust_strategy: TrustStrategy::default(),
            ipv6_enabled: true,
            connection_timeout: Duration::from_secs(30),
            socket_keepalive: true,
            default_read_buffer_size: DEFAULT_READ_BUFFER,
            max_read_buffer_size: MAX_READ_BUFFER,
            user_agent: format!("Lodestone-Driver/{}", env!("CARGO_PKG_VERSION")),
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Duration::from_secs(60),
        }
    }
}

/// Builder for [`DriverConfig`].
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    pub fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.config.encryption = encryption;
        self
    }

    pub fn with_trust_strategy(mut self, strategy: TrustStrategy) -> Self {
        self.config.trust_strategy = strategy;
        self
    }

    pub fn with_ipv6_enabled(mut self, enabled: bool) -> Self {
        self.config.ipv6_enabled = enabled;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    pub fn with_socket_keepalive(mut self, keepalive: bool) -> Self {
        self.config.socket_keepalive = keepalive;
        self
    }

    pub fn with_read_buffer_sizes(mut self, default: usize, max: usize) -> Self {
        self.config.default_read_buffer_size = default;
        self.config.max_read_buffer_size = max;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn with_max_connection_pool_size(mut self, size: usize) -> Self {
        self.config.max_connection_pool_size = size;
        self
    }

    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = timeout;
        self
    }

    pub fn build(self) -> DriverConfig {
        self.config
    }
}

/// Entry point: owns the connection pool and creates sessions.
pub struct Driver {
    config: Arc<DriverConfig>,
    pool: Arc<ConnectionPool>,
    open: RwLock<bool>,
}

impl Driver {
    pub fn new(uri: &str, auth: AuthToken) -> Result<Self> {
        Self::with_config(DriverConfig::new(uri, auth)?)
    }

    pub fn with_config(config: DriverConfig) -> Result<Self> {
        let config = Arc::new(config);
        let pool_config = PoolConfig {
            max_size: config.max_connection_pool_size,
            acquisition_timeout: config.connection_acquisition_timeout,
            ..PoolConfig::default()
        };
        let pool = Arc::new(ConnectionPool::new(config.clone(), pool_config));
        Ok(Self {
            config,
            pool,
            open: RwLock::new(true),
        })
    }

    /// Create a session with the given configuration.
    pub fn session(&self, config: SessionConfig) -> Result<Session> {
        self.ensure_open()?;
        Ok(Session::new(self.pool.clone(), config))
    }

    /// Create a session with default configuration.
    pub fn default_session(&self) -> Result<Session> {
        self.session(SessionConfig::default())
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Close the driver and every pooled connection. Idempotent.
    pub async fn close(&self) -> Result<()> {
        {
            let mut open = self.open.write();
            if !*open {
                return Ok(());
            }
            *open = false;
        }
        self.pool.close().await
    }

    /// Open, authenticate and release one connection to prove the
    /// server is reachable.
    pub async fn verify_connectivity(&self) -> Result<()> {
        self.ensure_open()?;
        let conn = self.pool.acquire().await?;
        conn.release();
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(Error::client("driver is closed"))
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("address", &self.config.address)
            .field("open", &*self.open.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_schemes() {
        assert_eq!(AuthToken::none().scheme(), "none");
        assert_eq!(AuthToken::basic("u", "p").scheme(), "basic");
        assert_eq!(AuthToken::bearer("t").scheme(), "bearer");

        let wire = AuthToken::basic("ada", "pw").to_wire();
        assert_eq!(wire.scheme, "basic");
        assert_eq!(wire.principal.as_deref(), Some("ada"));
        assert_eq!(wire.credentials.as_deref(), Some("pw"));
    }

    #[test]
    fn address_from_uri() {
        let addr = ServerAddress::from_uri("bolt://localhost:7697").unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 7697);

        let addr = ServerAddress::from_uri("bolt://example.com").unwrap();
        assert_eq!(addr.port, ServerAddress::DEFAULT_PORT);

        let addr = ServerAddress::from_uri("lodestone://db.internal:9999").unwrap();
        assert_eq!(addr.host, "db.internal");
        assert_eq!(addr.port, 9999);

        assert!(ServerAddress::from_uri("bolt://host:port:extra").is_err());
        assert!(ServerAddress::from_uri("bolt://host:notaport").is_err());
    }

    #[test]
    fn uri_scheme_selects_encryption() {
        let config = DriverConfig::new("bolt://localhost", AuthToken::none()).unwrap();
        assert_eq!(config.encryption, Encryption::Off);

        let config = DriverConfig::new("bolt+s://localhost", AuthToken::none()).unwrap();
        assert_eq!(config.encryption, Encryption::Required);
    }

    #[test]
    fn builder_sets_options() {
        let config = DriverConfig::builder("bolt://localhost", AuthToken::none())
            .unwrap()
            .with_ipv6_enabled(false)
            .with_connection_timeout(Duration::from_millis(100))
            .with_socket_keepalive(false)
            .with_read_buffer_sizes(1024, 4096)
            .with_user_agent("test-agent/1.0")
            .with_max_connection_pool_size(5)
            .build();

        assert!(!config.ipv6_enabled);
        assert_eq!(config.connection_timeout, Duration::from_millis(100));
        assert!(!config.socket_keepalive);
        assert_eq!(config.default_read_buffer_size, 1024);
        assert_eq!(config.max_read_buffer_size, 4096);
        assert_eq!(config.user_agent, "test-agent/1.0");
        assert_eq!(config.max_connection_pool_size, 5);
    }

    #[test]
    fn driver_creation_and_session() {
        let driver = Driver::new("bolt://localhost:7697", AuthToken::none()).unwrap();
        assert!(driver.session(SessionConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn closed_driver_rejects_sessions() {
        let driver = Driver::new("bolt://localhost:7697", AuthToken::none()).unwrap();
        driver.close().await.unwrap();
        assert!(matches!(
            driver.session(SessionConfig::default()).unwrap_err(),
            Error::Client(_)
        ));
        // close is idempotent
        driver.close().await.unwrap();
    }
}
