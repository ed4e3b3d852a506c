//! Byte transport: opening a line-oriented duplex stream to a server.
//!
//! The engine only needs something that reads and writes bytes; the
//! [`Connector`] trait is the seam where tests substitute in-memory pipes and
//! where [`TcpConnector`] picks plain TCP or TLS from the `secure` flag.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::line::LineCodec;

/// Any duplex byte stream the engine can run over.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Type-erased stream handed out by connectors.
pub type BoxedStream = Box<dyn Stream>;

/// A stream framed into lines.
pub type LineTransport = Framed<BoxedStream, LineCodec>;

/// Frame a raw stream with the default [`LineCodec`].
pub fn framed(stream: BoxedStream) -> LineTransport {
    Framed::new(stream, LineCodec::new())
}

/// Opens connections to IRC servers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `host:port`, wrapping the socket in TLS when `secure`.
    async fn connect(&self, host: &str, port: u16, secure: bool) -> io::Result<BoxedStream>;
}

/// The real network connector.
#[derive(Clone, Default)]
pub struct TcpConnector {
    tls: Option<Arc<ClientConfig>>,
}

impl TcpConnector {
    /// Connector using the platform trust store for TLS.
    pub fn new() -> Self {
        Self { tls: None }
    }

    /// Connector with a caller-supplied TLS configuration.
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        Self { tls: Some(config) }
    }

    fn tls_config(&self) -> Arc<ClientConfig> {
        if let Some(config) = &self.tls {
            return Arc::clone(config);
        }

        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            warn!(error = %err, "Failed to load a native root certificate");
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!(added, ignored, "Loaded native root certificates");

        Arc::new(
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16, secure: bool) -> io::Result<BoxedStream> {
        debug!(host = %host, port, secure, "Connecting to server");
        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;

        if !secure {
            return Ok(Box::new(tcp));
        }

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let connector = TlsConnector::from(self.tls_config());
        let tls = connector.connect(server_name, tcp).await?;
        debug!(host = %host, "TLS handshake complete");
        Ok(Box::new(tls))
    }
}
