//! Service browser: discovery, connect, and the handlers wired into every
//! connection.
//!
//! The [`ServiceBrowserBuilder`] provides a fluent API for configuring the
//! browser. The [`ServiceBrowser`] manages the lifecycle:
//! 1. Browse continuously, keeping a live set of advertised names
//! 2. Resolve a chosen name to an address
//! 3. Open a connection and wrap it in a dispatcher
//! 4. Hand back a [`RemoteAddressBookHandle`]
//!
//! # Example
//!
//! ```ignore
//! use remote_address_book::{RemoteAddressBook, ServiceBrowser};
//!
//! let browser = ServiceBrowser::mdns(ConnectionConfig::default())?;
//! browser.start()?;
//! // ... wait for discovery ...
//! for name in browser.available_service_names()? {
//!     println!("{name}");
//! }
//! let book = browser.connect("Alice's Contacts").await?;
//! let people = book.all_people().await?;
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::config::ConnectionConfig;
use crate::discovery::{DiscoveryEvent, MdnsDiscovery, ServiceDiscovery};
use crate::dispatcher::{ErrorHandler, RemoteCommandDispatcher};
use crate::error::{RemoteAddressBookError, Result};
use crate::handler::CommandHandler;
use crate::remote::RemoteAddressBookHandle;
use crate::transport;

/// Builder for configuring and creating a [`ServiceBrowser`].
pub struct ServiceBrowserBuilder {
    discovery: Arc<dyn ServiceDiscovery>,
    config: ConnectionConfig,
    runtime: Option<Handle>,
}

impl ServiceBrowserBuilder {
    /// Create a builder browsing with `discovery`.
    pub fn new(discovery: impl ServiceDiscovery) -> Self {
        Self {
            discovery: Arc::new(discovery),
            config: ConnectionConfig::default(),
            runtime: None,
        }
    }

    /// Replace the whole connection configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the time allowed for resolving a service name.
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.config.resolve_timeout = timeout;
        self
    }

    /// Set the time allowed for the TCP connect.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Expire requests that get no reply within `timeout`.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of concurrent inbound request handlers.
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Set the per-connection send queue capacity.
    pub fn send_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.send_queue_capacity = capacity;
        self
    }

    /// Set the largest accepted frame payload.
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Drive discovery and connections on `runtime` instead of the current
    /// one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the browser. Browsing starts with [`ServiceBrowser::start`].
    ///
    /// # Errors
    ///
    /// `Discovery` if no runtime was given and none is current.
    pub fn build(self) -> Result<ServiceBrowser> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|e| RemoteAddressBookError::Discovery(e.to_string()))?,
        };

        Ok(ServiceBrowser {
            discovery: self.discovery,
            config: self.config,
            runtime,
            names: Arc::new(RwLock::new(BTreeSet::new())),
            events_task: Mutex::new(None),
            handler: RwLock::new(None),
            error_handler: RwLock::new(None),
        })
    }
}

/// Discovers peers and connects to them.
///
/// Dropping the browser stops browsing. Connections already made stay open.
pub struct ServiceBrowser {
    discovery: Arc<dyn ServiceDiscovery>,
    config: ConnectionConfig,
    runtime: Handle,
    /// Currently advertised names.
    names: Arc<RwLock<BTreeSet<String>>>,
    events_task: Mutex<Option<AbortHandle>>,
    handler: RwLock<Option<Arc<dyn CommandHandler>>>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl ServiceBrowser {
    /// Create a builder browsing with `discovery`.
    pub fn builder(discovery: impl ServiceDiscovery) -> ServiceBrowserBuilder {
        ServiceBrowserBuilder::new(discovery)
    }

    /// Browse for `config.service_type` over mDNS on the current runtime.
    pub fn mdns(config: ConnectionConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| RemoteAddressBookError::Discovery(e.to_string()))?;
        let discovery = MdnsDiscovery::new(config.service_type.clone(), &runtime)?;
        Self::builder(discovery).config(config).runtime(runtime).build()
    }

    /// Begin continuous discovery. Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut task = self.events_task.lock();
        if task.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.discovery.start_browsing(tx)?;
        let handle = self.runtime.spawn(apply_events(rx, self.names.clone()));
        *task = Some(handle.abort_handle());

        tracing::debug!("browsing for {}", self.config.service_type);
        Ok(())
    }

    /// Stop discovery and forget the names seen so far. Idempotent.
    pub fn stop(&self) {
        if let Some(task) = self.events_task.lock().take() {
            task.abort();
            self.discovery.stop_browsing();
            self.names.write().clear();
        }
    }

    /// Check if discovery is running.
    pub fn is_browsing(&self) -> bool {
        self.events_task.lock().is_some()
    }

    /// Snapshot of the names advertised right now, in sorted order.
    ///
    /// Empty, not an error, before anything has been discovered.
    pub fn available_service_names(&self) -> Result<Vec<String>> {
        Ok(self.names.read().iter().cloned().collect())
    }

    /// Install the handler for requests peers send on connections made from
    /// now on, and the sink for their connection failures.
    pub fn set_command_handler(&self, handler: Arc<dyn CommandHandler>, error_handler: ErrorHandler) {
        *self.handler.write() = Some(handler);
        *self.error_handler.write() = Some(error_handler);
    }

    /// Resolve `name` and connect to it.
    ///
    /// # Errors
    ///
    /// `ServiceNotFound` if the name does not resolve within the resolve
    /// timeout; `Io` if the connection cannot be opened.
    pub async fn connect(&self, name: &str) -> Result<RemoteAddressBookHandle> {
        let resolution =
            tokio::time::timeout(self.config.resolve_timeout, self.discovery.resolve(name)).await;
        let addr = match resolution {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                tracing::debug!("resolving {:?} failed: {}", name, e);
                return Err(RemoteAddressBookError::ServiceNotFound(name.to_string()));
            }
            Err(_) => {
                tracing::debug!(
                    "resolving {:?} timed out after {:?}",
                    name,
                    self.config.resolve_timeout
                );
                return Err(RemoteAddressBookError::ServiceNotFound(name.to_string()));
            }
        };

        let stream = transport::connect(addr, self.config.connect_timeout).await?;
        let dispatcher = RemoteCommandDispatcher::new(stream, &self.runtime, &self.config);

        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            dispatcher.register_command_handler(handler);
        }
        let error_handler = self.error_handler.read().clone();
        if let Some(error_handler) = error_handler {
            dispatcher.set_error_handler(error_handler);
        }

        tracing::debug!("connected to {:?} at {}", name, addr);
        Ok(RemoteAddressBookHandle::new(name, dispatcher))
    }
}

impl Drop for ServiceBrowser {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Keep `names` in step with discovery notifications.
async fn apply_events(
    mut events: mpsc::UnboundedReceiver<DiscoveryEvent>,
    names: Arc<RwLock<BTreeSet<String>>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            DiscoveryEvent::Found(name) => {
                tracing::debug!("service found: {:?}", name);
                names.write().insert(name);
            }
            DiscoveryEvent::Lost(name) => {
                tracing::debug!("service lost: {:?}", name);
                names.write().remove(&name);
            }
            DiscoveryEvent::Resolved { name, addr } => {
                tracing::debug!("service resolved: {:?} at {}", name, addr);
                names.write().insert(name);
            }
            DiscoveryEvent::ResolveFailed { name, reason } => {
                tracing::warn!("Could not resolve {:?}: {}", name, reason);
            }
        }
    }
}
