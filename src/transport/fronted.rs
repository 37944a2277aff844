//! Domain-fronting transport wrapper.
//!
//! The fronting machinery itself (collecting front candidates, SNI/Host
//! splitting, credential rotation) lives in a collaborator; it only has to
//! hand over pre-connected round-trippers.

use std::sync::Arc;

use crate::transport::{FactoryTransport, RoundTripperFactory, Transport};

/// Registry name of the domain-fronting transport.
pub const FRONTED_TRANSPORT: &str = "fronted";

/// Wrap a fronting collaborator as the `"fronted"` transport.
pub fn fronted_transport(fronter: Arc<dyn RoundTripperFactory>) -> Arc<dyn Transport> {
    Arc::new(FactoryTransport::new(FRONTED_TRANSPORT, 0, fronter))
}
