//! Smart-dialer ("proxyless") transport wrapper.
//!
//! A [`StrategyFinder`] collaborator probes DNS and TLS evasion strategies
//! against the caller's domains and returns whichever stream dialer works
//! from the current network. The strategy catalogue ships inside the binary
//! so the bootstrap phase needs no prior fetch; its schema belongs to the
//! collaborator.

use std::sync::Arc;

use crate::error::Result;
use crate::options::LogWriter;
use crate::transport::connector::TlsConnector;
use crate::transport::dialer::{DialerTransport, StreamDialer};
use crate::transport::Transport;

/// Registry name of the smart-dialer transport.
pub const SMART_TRANSPORT: &str = "smart";

/// Embedded strategy catalogue handed opaquely to the [`StrategyFinder`].
pub const SMART_DIALER_CONFIG: &[u8] = include_bytes!("smart_dialer_config.yml");

/// Probes circumvention strategies and yields a working stream dialer.
///
/// `config` is the raw strategy catalogue; `log_writer` receives the
/// finder's own probe narration.
pub trait StrategyFinder: Send + Sync {
    fn new_dialer(
        &self,
        domains: &[String],
        config: &[u8],
        log_writer: LogWriter,
    ) -> Result<Arc<dyn StreamDialer>>;
}

/// Build the `"smart"` transport from a strategy-finder collaborator.
pub fn smart_transport(
    finder: &dyn StrategyFinder,
    domains: &[String],
    log_writer: LogWriter,
    tls: TlsConnector,
) -> Result<Arc<dyn Transport>> {
    let dialer = finder.new_dialer(domains, SMART_DIALER_CONFIG, log_writer)?;
    Ok(Arc::new(DialerTransport::new(SMART_TRANSPORT, dialer, tls)))
}
