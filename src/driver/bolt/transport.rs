//! Socket transport: address resolution, connect fallback, timeouts,
//! keepalive and the optional TLS wrap.

use std::net::SocketAddr;
use std::sync::Arc;
use std::pin::Pin;
use std::task::{Context, Poll};

use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_rustls::TlsConnector;

use crate::driver::driver::{DriverConfig, Encryption, ServerAddress, TrustStrategy};
use crate::driver::error::{Error, Result};

/// A connected byte stream, plain or TLS-wrapped.
///
/// Read and write halves share one socket; the message engine issues
/// reads and writes from separate points but never two of either at a
/// time, so a single owned stream suffices.
pub enum TransportStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    #[cfg(test)]
    Mem(tokio::io::DuplexStream),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            TransportStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(test)]
            TransportStream::Mem(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            TransportStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(test)]
            TransportStream::Mem(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_flush(cx),
            TransportStream::Tls(s) => Pin::new(s).poll_flush(cx),
            #[cfg(test)]
            TransportStream::Mem(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            TransportStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(test)]
            TransportStream::Mem(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Connect to `address`, trying each resolved candidate in order and
/// wrapping the stream in TLS when the configuration requires it.
pub async fn connect(address: &ServerAddress, config: &DriverConfig) -> Result<TransportStream> {
    let candidates = resolve(address, config.ipv6_enabled).await?;
    let stream = connect_to_candidates(&candidates, config).await?;

    match config.encryption {
        Encryption::Off => Ok(TransportStream::Plain(stream)),
        Encryption::Required => {
            let tls = wrap_tls(stream, &address.host, &config.trust_strategy).await?;
            Ok(TransportStream::Tls(Box::new(tls)))
        }
    }
}

/// Resolve the host to its candidate socket addresses. IPv6 addresses
/// are included only when enabled.
async fn resolve(address: &ServerAddress, ipv6_enabled: bool) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = lookup_host((address.host.as_str(), address.port))
        .await
        .map_err(|e| Error::ServiceUnavailable {
            reason: format!("could not resolve {}: {}", address, e),
            attempts: vec![],
        })?
        .filter(|addr| ipv6_enabled || addr.is_ipv4())
        .collect();

    if addrs.is_empty() {
        return Err(Error::ServiceUnavailable {
            reason: format!("{} resolved to no usable addresses", address),
            attempts: vec![],
        });
    }
    Ok(addrs)
}

/// Try each candidate in order. Every failure is recorded; the first
/// success wins and its predecessors' errors are dropped.
pub(crate) async fn connect_to_candidates(
    candidates: &[SocketAddr],
    config: &DriverConfig,
) -> Result<TcpStream> {
    let mut attempts = Vec::new();
    let mut timed_out = false;

    for addr in candidates {
        match connect_one(*addr, config).await {
            Ok(stream) => {
                if !attempts.is_empty() {
                    tracing::debug!(?addr, skipped = attempts.len(), "connected after fallback");
                }
                return Ok(stream);
            }
            Err(err) => {
                timed_out = matches!(err, Error::ConnectTimeout { .. });
                tracing::debug!(?addr, %err, "connect attempt failed");
                attempts.push(format!("{}: {}", addr, err));
            }
        }
    }

    // A lone blackholed address surfaces as the cancellation itself;
    // a list that ran dry surfaces as service-unavailable with every
    // inner error.
    if candidates.len() == 1 && timed_out {
        return Err(Error::ConnectTimeout {
            timeout: config.connection_timeout,
        });
    }
    Err(Error::ServiceUnavailable {
        reason: format!("no address reachable ({} tried)", candidates.len()),
        attempts,
    })
}

/// One bounded connect attempt. On timeout the half-open socket is
/// dropped, which closes it.
async fn connect_one(addr: SocketAddr, config: &DriverConfig) -> Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| Error::transport(format!("socket create failed: {}", e)))?;

    if config.socket_keepalive {
        socket
            .set_keepalive(true)
            .map_err(|e| Error::transport(format!("keepalive failed: {}", e)))?;
    }

    let stream = tokio::time::timeout(config.connection_timeout, socket.connect(addr))
        .await
        .map_err(|_| Error::ConnectTimeout {
            timeout: config.connection_timeout,
        })?
        .map_err(|e| Error::transport(format!("connect to {} failed: {}", addr, e)))?;

    stream
        .set_nodelay(true)
        .map_err(|e| Error::transport(format!("nodelay failed: {}", e)))?;
    Ok(stream)
}

/// Perform the TLS client handshake with the validation policy chosen
/// by the trust strategy.
async fn wrap_tls(
    stream: TcpStream,
    host: &str,
    trust: &TrustStrategy,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let tls_config = client_tls_config(trust)?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::security(format!("invalid TLS server name {:?}", host)))?;

    TlsConnector::from(Arc::new(tls_config))
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::security(format!("TLS handshake failed: {}", e)))
}

fn client_tls_config(trust: &TrustStrategy) -> Result<rustls::ClientConfig> {
    match trust {
        TrustStrategy::TrustSystemCas => {
            let roots = rustls::RootCertStore::from_iter(
                webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
            );
            Ok(rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth())
        }
        TrustStrategy::TrustCustomCas { certificates } => {
            let mut roots = rustls::RootCertStore::empty();
            for der in certificates {
                roots
                    .add(CertificateDer::from(der.clone()))
                    .map_err(|e| Error::security(format!("invalid trust certificate: {}", e)))?;
            }
            Ok(rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth())
        }
        TrustStrategy::TrustAllCertificates => Ok(rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAllCertificates))
            .with_no_client_auth()),
    }
}

/// Verifier that accepts every certificate. Development only.
#[derive(Debug)]
struct AcceptAllCertificates;

impl rustls::client::danger::ServerCertVerifier for AcceptAllCertificates {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio::net::TcpListener;

    fn quick_config() -> DriverConfig {
        DriverConfig {
            connection_timeout: Duration::from_millis(200),
            ..DriverConfig::default()
        }
    }

    #[tokio::test]
    async fn connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect_to_candidates(&[addr], &quick_config()).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn falls_back_past_unreachable_candidate() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let good = listener.local_addr().unwrap();
        // Port 1 on loopback refuses immediately.
        let bad: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let stream = connect_to_candidates(&[bad, good], &quick_config())
            .await
            .unwrap();
        // The inner failure is swallowed by the later success.
        assert_eq!(stream.peer_addr().unwrap(), good);
    }

    #[tokio::test]
    async fn all_candidates_failing_reports_every_attempt() {
        let bad1: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let bad2: SocketAddr = "127.0.0.1:2".parse().unwrap();

        let err = connect_to_candidates(&[bad1, bad2], &quick_config())
            .await
            .unwrap_err();
        match err {
            Error::ServiceUnavailable { attempts, .. } => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].contains("127.0.0.1:1"));
                assert!(attempts[1].contains("127.0.0.1:2"));
            }
            other => panic!("expected ServiceUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn blackholed_connect_is_cancelled_within_the_timeout() {
        // TEST-NET-1 space is not routable; depending on the network
        // sandbox the attempt either times out or is rejected at once.
        // Either way the bounded attempt must resolve promptly.
        let addr: SocketAddr = "192.0.2.1:7697".parse().unwrap();
        let config = DriverConfig {
            connection_timeout: Duration::from_millis(100),
            ..DriverConfig::default()
        };

        let start = Instant::now();
        let err = connect_to_candidates(&[addr], &config).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(2));
        match err {
            Error::ConnectTimeout { timeout } => {
                assert_eq!(timeout, Duration::from_millis(100));
            }
            Error::ServiceUnavailable { .. } => {}
            other => panic!("expected timeout or unavailability, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn resolves_loopback() {
        let address = ServerAddress::new("localhost", 7697);
        let addrs = resolve(&address, true).await.unwrap();
        assert!(!addrs.is_empty());

        let v4_only = resolve(&address, false).await.unwrap();
        assert!(v4_only.iter().all(|a| a.is_ipv4()));
    }

    #[test]
    fn tls_configs_build() {
        assert!(client_tls_config(&TrustStrategy::TrustSystemCas).is_ok());
        assert!(client_tls_config(&TrustStrategy::TrustAllCertificates).is_ok());
        // Garbage DER must be rejected, not silently trusted.
        let err = client_tls_config(&TrustStrategy::TrustCustomCas {
            certificates: vec![vec![0xDE, 0xAD]],
        })
        .unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }
}
