//! # Kindling
//!
//! HTTP client for fetching small, bootstrap-critical resources through
//! networks that actively interfere with direct TCP, DNS, and TLS.
//!
//! Callers see a single HTTP client; behind it a set of independent
//! circumvention transports (domain fronting, smart dialing, DNS
//! tunneling, AMP-cache relaying, and anything user-contributed) race to
//! establish connections in parallel. The request itself is transmitted
//! serially over one ready connection at a time, so non-idempotent
//! requests reach the origin at most once per successful run. The first
//! transport to complete the request wins; the rest are cancelled.

// Core modules
pub mod client;
pub mod error;
pub mod options;
pub mod race;
pub mod registry;
pub mod request;
pub mod response;

// Transport capability and strategy wrappers
pub mod transport;

// Re-exports for convenient access
pub use client::{HttpClient, Kindling, RequestBuilder};
pub use error::{Error, Result};
pub use options::{
    with_amp_cache, with_dns_tunnel, with_domain_fronting, with_log_writer, with_panic_listener,
    with_proxyless, with_root_ca, with_transport, KindlingOption, LogWriter, PanicListener,
};
pub use request::{Body, Request, HEADER_APP, HEADER_METHOD};
pub use response::Response;

// Transport re-exports
pub use transport::amp::{AMP_MAX_BODY, AMP_TRANSPORT};
pub use transport::connector::{BoxedStream, MaybeTlsStream, TlsConnector};
pub use transport::dialer::{DialerTransport, StreamDialer, StreamRoundTripper};
pub use transport::dnstt::DNSTT_TRANSPORT;
pub use transport::fronted::FRONTED_TRANSPORT;
pub use transport::smart::{StrategyFinder, SMART_TRANSPORT};
pub use transport::{RoundTripper, RoundTripperFactory, Transport};
