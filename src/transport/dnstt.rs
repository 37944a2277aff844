//! DNS-tunnel transport wrapper.

use std::sync::Arc;

use crate::transport::connector::TlsConnector;
use crate::transport::dialer::{DialerTransport, StreamDialer};
use crate::transport::Transport;

/// Registry name of the DNS-tunnel transport.
pub const DNSTT_TRANSPORT: &str = "dnstt";

/// Wrap a DNS-tunnel stream dialer as the `"dnstt"` transport.
pub fn dnstt_transport(dialer: Arc<dyn StreamDialer>, tls: TlsConnector) -> Arc<dyn Transport> {
    Arc::new(DialerTransport::new(DNSTT_TRANSPORT, dialer, tls))
}
