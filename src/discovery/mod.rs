//! Service discovery capability.
//!
//! The [`ServiceBrowser`](crate::ServiceBrowser) only needs four things from a
//! discovery mechanism: begin browsing, stop browsing, notifications about
//! services appearing, disappearing and resolving, and resolution of a name
//! to an address. [`ServiceDiscovery`] is that capability.
//!
//! Implementations:
//! - [`MdnsDiscovery`] - multicast DNS on the local network
//! - [`StaticDiscovery`] - a fixed name table

mod mdns;
mod static_list;

pub use mdns::MdnsDiscovery;
pub use static_list::StaticDiscovery;

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::handler::BoxFuture;

/// Notification from a discovery mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A service started advertising.
    Found(String),
    /// A service stopped advertising.
    Lost(String),
    /// A service's address became known.
    Resolved {
        /// Service name.
        name: String,
        /// Connectable address.
        addr: SocketAddr,
    },
    /// A service could not be resolved.
    ResolveFailed {
        /// Service name.
        name: String,
        /// Why resolution failed.
        reason: String,
    },
}

impl DiscoveryEvent {
    /// Name of the service the event is about.
    pub fn name(&self) -> &str {
        match self {
            Self::Found(name) | Self::Lost(name) => name,
            Self::Resolved { name, .. } | Self::ResolveFailed { name, .. } => name,
        }
    }
}

/// Source of service names and addresses.
pub trait ServiceDiscovery: Send + Sync + 'static {
    /// Begin browsing; notifications go to `events` until browsing stops.
    fn start_browsing(&self, events: mpsc::UnboundedSender<DiscoveryEvent>) -> Result<()>;

    /// Stop browsing. Idempotent.
    fn stop_browsing(&self);

    /// Resolve `name` to a connectable address.
    ///
    /// The future may wait for a resolution to arrive; callers bound it with
    /// their own timeout.
    fn resolve(&self, name: &str) -> BoxFuture<'static, Result<SocketAddr>>;
}
