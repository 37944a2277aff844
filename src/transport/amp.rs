//! AMP-cache relay transport wrapper.

use std::sync::Arc;

use crate::transport::{FactoryTransport, RoundTripperFactory, Transport};

/// Registry name of the AMP-cache transport.
pub const AMP_TRANSPORT: &str = "amp";

/// AMP caches reject request payloads above 6kb.
pub const AMP_MAX_BODY: usize = 6000;

/// Wrap an AMP-cache relay collaborator as the `"amp"` transport.
///
/// Requests with bodies larger than [`AMP_MAX_BODY`] skip this transport
/// entirely.
pub fn amp_transport(relay: Arc<dyn RoundTripperFactory>) -> Arc<dyn Transport> {
    Arc::new(FactoryTransport::new(AMP_TRANSPORT, AMP_MAX_BODY, relay))
}
