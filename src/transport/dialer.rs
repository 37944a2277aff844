//! Stream-dialer backed transports.
//!
//! A [`StreamDialer`] collaborator produces established byte streams
//! (smart-dialed TCP, DNS tunnels). [`DialerTransport`] turns one into a
//! full [`Transport`]: it dials during `new_round_tripper`, runs the TLS
//! handshake there when the port calls for it, and hands the race engine a
//! pre-connected single-shot round-tripper.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::transport::connector::{BoxedStream, MaybeTlsStream, TlsConnector};
use crate::transport::h1::H1Connection;
use crate::transport::{RoundTripper, Transport};

/// Produces established byte streams to `host:port` destinations.
///
/// Implementations must honour `cancel`: when it fires mid-dial, abandon
/// the attempt and return promptly.
#[async_trait]
pub trait StreamDialer: Send + Sync {
    async fn dial_stream(&self, cancel: CancellationToken, addr: &str) -> Result<BoxedStream>;
}

/// A [`Transport`] that dials a stream and speaks HTTP/1.1 over it.
pub struct DialerTransport {
    name: String,
    max_length: usize,
    dialer: Arc<dyn StreamDialer>,
    tls: TlsConnector,
}

impl DialerTransport {
    pub fn new(name: impl Into<String>, dialer: Arc<dyn StreamDialer>, tls: TlsConnector) -> Self {
        Self {
            name: name.into(),
            max_length: 0,
            dialer,
            tls,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }
}

#[async_trait]
impl Transport for DialerTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_length(&self) -> usize {
        self.max_length
    }

    async fn new_round_tripper(
        &self,
        cancel: CancellationToken,
        addr: &str,
    ) -> Result<Box<dyn RoundTripper>> {
        let stream = tokio::select! {
            stream = self.dialer.dial_stream(cancel.clone(), addr) => stream?,
            () = cancel.cancelled() => return Err(Error::Canceled),
        };

        // The scheme is gone by the time a dialer sees an address, so the
        // port decides whether this destination speaks TLS.
        let (host, port) = split_host_port(addr)?;
        let stream = if port == 443 {
            tokio::select! {
                tls = self.tls.connect(stream, host) => tls?,
                () = cancel.cancelled() => return Err(Error::Canceled),
            }
        } else {
            MaybeTlsStream::Plain(stream)
        };

        Ok(Box::new(StreamRoundTripper::new(stream, cancel)))
    }
}

/// Pre-connected round-tripper over an established stream. Sends exactly
/// one request; a second call is an error.
pub struct StreamRoundTripper {
    conn: Mutex<Option<H1Connection>>,
    cancel: CancellationToken,
}

impl StreamRoundTripper {
    pub fn new(stream: MaybeTlsStream, cancel: CancellationToken) -> Self {
        Self {
            conn: Mutex::new(Some(H1Connection::new(stream))),
            cancel,
        }
    }
}

#[async_trait]
impl RoundTripper for StreamRoundTripper {
    async fn round_trip(&self, req: Request) -> Result<Response> {
        let conn = self
            .conn
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::connection("connection already consumed"))?;

        tokio::select! {
            resp = conn.send_request(req) => resp,
            () = self.cancel.cancelled() => Err(Error::Canceled),
        }
    }
}

/// Split `host:port`, keeping IPv6 brackets on the host.
fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::connection(format!("address missing port: {}", addr)))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::connection(format!("invalid port in address: {}", addr)))?;
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_host_port_variants() {
        assert_eq!(split_host_port("example.com:443").unwrap(), ("example.com", 443));
        assert_eq!(split_host_port("[::1]:8080").unwrap(), ("[::1]", 8080));
        assert!(split_host_port("example.com").is_err());
        assert!(split_host_port("example.com:notaport").is_err());
    }
}
