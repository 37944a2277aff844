//! TLS layering over caller-dialed streams.
//!
//! Transports hand us already-established byte streams (a fronted tunnel, a
//! smart-dialed TCP connection, a DNS tunnel). When the destination port
//! calls for TLS we wrap the stream with a BoringSSL client handshake here,
//! so the round-tripper the race engine receives is fully pre-connected.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use boring::ssl::{SslConnector, SslMethod, SslVersion};
use boring::x509::X509;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_boring::SslStream;

use crate::error::{Error, Result};

/// Any established byte stream a dialer can produce.
pub trait Stream: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin> Stream for T {}

/// Boxed stream handed across the `StreamDialer` boundary.
pub type BoxedStream = Box<dyn Stream>;

/// Stream that is either plaintext or TLS-wrapped.
pub enum MaybeTlsStream {
    Plain(BoxedStream),
    Tls(SslStream<BoxedStream>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// BoringSSL client-side TLS over an arbitrary dialed stream, with an
/// optional pinned root CA.
#[derive(Clone, Default)]
pub struct TlsConnector {
    root_ca_pem: Option<String>,
}

impl TlsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a PEM-encoded root CA. When set, only chains anchored at this
    /// certificate verify.
    pub fn with_root_ca(root_ca_pem: impl Into<String>) -> Self {
        Self {
            root_ca_pem: Some(root_ca_pem.into()),
        }
    }

    fn configure_ssl(&self) -> Result<SslConnector> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("failed to create SSL connector: {}", e)))?;

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| Error::tls(format!("failed to set min TLS version: {}", e)))?;
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_3))
            .map_err(|e| Error::tls(format!("failed to set max TLS version: {}", e)))?;

        if let Some(pem) = &self.root_ca_pem {
            let cert = X509::from_pem(pem.as_bytes())
                .map_err(|e| Error::tls(format!("failed to decode root CA PEM block: {}", e)))?;
            builder
                .cert_store_mut()
                .add_cert(cert)
                .map_err(|e| Error::tls(format!("failed to append root CA to pool: {}", e)))?;
        }

        builder
            .set_alpn_protos(b"\x08http/1.1")
            .map_err(|e| Error::tls(format!("failed to set ALPN: {}", e)))?;

        Ok(builder.build())
    }

    /// Run a TLS handshake over `stream` with SNI `host`.
    pub async fn connect(&self, stream: BoxedStream, host: &str) -> Result<MaybeTlsStream> {
        let connector = self.configure_ssl()?;
        let config = connector
            .configure()
            .map_err(|e| Error::tls(format!("failed to configure SSL: {}", e)))?;

        let ssl_stream = tokio_boring::connect(config, host, stream)
            .await
            .map_err(|e| Error::tls(format!("TLS handshake failed: {}", e)))?;

        Ok(MaybeTlsStream::Tls(ssl_stream))
    }
}
