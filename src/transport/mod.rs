//! Transport capability traits and the concrete strategy wrappers.
//!
//! A [`Transport`] is one circumvention strategy: it can pre-establish a
//! connection to an address and hand back a [`RoundTripper`] that will carry
//! exactly one request over it. The race engine treats every strategy
//! uniformly through this surface; the wrappers in the submodules convert
//! caller-supplied collaborators (fronting machinery, smart dialers, DNS
//! tunnels, AMP relays) into named registry entries.

pub mod amp;
pub mod connector;
pub mod dialer;
pub mod dnstt;
pub mod fronted;
pub mod h1;
pub mod smart;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// A pre-connected, single-shot request sender.
///
/// All expensive establishment work (TCP, TLS, tunnel bring-up) happened
/// before this value existed; `round_trip` only transmits the request and
/// reads the response.
#[async_trait]
pub trait RoundTripper: Send + Sync {
    async fn round_trip(&self, req: Request) -> Result<Response>;
}

/// Produces pre-connected round-trippers on demand.
///
/// `addr` is always `host:port`. Implementations must complete every
/// expensive establishment step before returning, and must honour `cancel`
/// by abandoning establishment promptly when it fires.
#[async_trait]
pub trait RoundTripperFactory: Send + Sync {
    async fn new_round_tripper(
        &self,
        cancel: CancellationToken,
        addr: &str,
    ) -> Result<Box<dyn RoundTripper>>;
}

/// One circumvention strategy, as seen by the registry and race engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable name, used for diagnostics and for replacement by name.
    fn name(&self) -> &str;

    /// Largest request body this transport can carry, in bytes.
    /// Zero means no limit.
    fn max_length(&self) -> usize {
        0
    }

    /// Establish a connection to `addr` (`host:port`) and return a
    /// round-tripper ready to send one request over it.
    async fn new_round_tripper(
        &self,
        cancel: CancellationToken,
        addr: &str,
    ) -> Result<Box<dyn RoundTripper>>;
}

/// Adapts a [`RoundTripperFactory`] into a named [`Transport`].
///
/// Used by the fronted and AMP wrappers, and by transport replacement,
/// which preserves the replaced entry's name and size limit.
pub struct FactoryTransport {
    name: String,
    max_length: usize,
    factory: Arc<dyn RoundTripperFactory>,
}

impl FactoryTransport {
    pub fn new(
        name: impl Into<String>,
        max_length: usize,
        factory: Arc<dyn RoundTripperFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            max_length,
            factory,
        }
    }
}

#[async_trait]
impl Transport for FactoryTransport {
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
        self.factory.new_round_tripper(cancel, addr).await
    }
}
