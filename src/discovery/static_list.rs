//! Discovery from a fixed table of names.
//!
//! Useful where multicast is unavailable and in tests. Entries can be added
//! and removed at runtime; a browsing [`ServiceBrowser`](crate::ServiceBrowser)
//! sees the change as found/lost notifications.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{DiscoveryEvent, ServiceDiscovery};
use crate::error::{RemoteAddressBookError, Result};
use crate::handler::BoxFuture;

#[derive(Default)]
struct Table {
    services: BTreeMap<String, SocketAddr>,
    events: Option<mpsc::UnboundedSender<DiscoveryEvent>>,
}

impl Table {
    fn announce(&self, name: &str, addr: SocketAddr) {
        if let Some(events) = &self.events {
            let _ = events.send(DiscoveryEvent::Found(name.to_string()));
            let _ = events.send(DiscoveryEvent::Resolved {
                name: name.to_string(),
                addr,
            });
        }
    }
}

/// Name table implementing [`ServiceDiscovery`].
#[derive(Clone, Default)]
pub struct StaticDiscovery {
    table: Arc<Mutex<Table>>,
}

impl StaticDiscovery {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service (builder form).
    pub fn with_service(self, name: impl Into<String>, addr: SocketAddr) -> Self {
        self.insert(name, addr);
        self
    }

    /// Add or replace a service.
    pub fn insert(&self, name: impl Into<String>, addr: SocketAddr) {
        let name = name.into();
        let mut table = self.table.lock();
        table.announce(&name, addr);
        table.services.insert(name, addr);
    }

    /// Remove a service. Returns `false` if it was not listed.
    pub fn remove(&self, name: &str) -> bool {
        let mut table = self.table.lock();
        let removed = table.services.remove(name).is_some();
        if removed {
            if let Some(events) = &table.events {
                let _ = events.send(DiscoveryEvent::Lost(name.to_string()));
            }
        }
        removed
    }
}

impl ServiceDiscovery for StaticDiscovery {
    fn start_browsing(&self, events: mpsc::UnboundedSender<DiscoveryEvent>) -> Result<()> {
        let mut table = self.table.lock();
        table.events = Some(events);
        for (name, addr) in &table.services {
            table.announce(name, *addr);
        }
        Ok(())
    }

    fn stop_browsing(&self) {
        self.table.lock().events = None;
    }

    fn resolve(&self, name: &str) -> BoxFuture<'static, Result<SocketAddr>> {
        let result = self
            .table
            .lock()
            .services
            .get(name)
            .copied()
            .ok_or_else(|| RemoteAddressBookError::ServiceNotFound(name.to_string()));
        Box::pin(async move { result })
    }
}
