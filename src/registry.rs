//! Ordered transport registry with replace-by-name.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::transport::{FactoryTransport, RoundTripperFactory, Transport};

/// Ordered list of configured transports with unique names.
///
/// The only mutations are append (at construction, through options) and
/// [`Registry::replace`]. The race engine takes a snapshot per request, so
/// a replace never affects requests already in flight.
#[derive(Default)]
pub struct Registry {
    entries: Mutex<Vec<Arc<dyn Transport>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transport. An entry whose name is already registered is
    /// ignored with a warning.
    pub fn push(&self, transport: Arc<dyn Transport>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.iter().any(|t| t.name() == transport.name()) {
            tracing::warn!(
                transport = transport.name(),
                "transport already registered, ignoring duplicate"
            );
            return;
        }
        entries.push(transport);
    }

    /// Substitute the transport named `name` with one built from `factory`,
    /// keeping the original name, size limit, and position.
    pub fn replace(&self, name: &str, factory: Arc<dyn RoundTripperFactory>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for entry in entries.iter_mut() {
            if entry.name() == name {
                *entry = Arc::new(FactoryTransport::new(name, entry.max_length(), factory));
                return Ok(());
            }
        }
        Err(Error::TransportNotFound(name.to_string()))
    }

    /// Current entries, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn Transport>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
