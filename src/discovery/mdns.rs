//! Multicast DNS discovery using `mdns-sd`.
//!
//! The daemon's browse channel is drained by a task on the discovery's
//! runtime, which forwards what matters to the browser. Resolved addresses
//! are cached; [`resolve`](ServiceDiscovery::resolve) answers from the cache
//! or waits for the next resolution.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};

use super::{DiscoveryEvent, ServiceDiscovery};
use crate::error::{RemoteAddressBookError, Result};
use crate::handler::BoxFuture;

fn discovery_error(e: impl std::fmt::Display) -> RemoteAddressBookError {
    RemoteAddressBookError::Discovery(e.to_string())
}

/// Instance name of a full service name, e.g. `Alice's Contacts` for
/// `Alice's Contacts._remote-address-book._tcp.local.`.
fn instance_name<'a>(service_type: &str, fullname: &'a str) -> &'a str {
    fullname
        .strip_suffix(service_type)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname)
}

fn fullname(service_type: &str, instance_name: &str) -> String {
    format!("{}.{}", instance_name, service_type)
}

/// What browsing has learned about one service type.
struct Catalog {
    service_type: String,
    resolved: Mutex<HashMap<String, SocketAddr>>,
    resolved_notify: Notify,
    browsing: AtomicBool,
}

impl Catalog {
    fn new(service_type: String) -> Self {
        Self {
            service_type,
            resolved: Mutex::new(HashMap::new()),
            resolved_notify: Notify::new(),
            browsing: AtomicBool::new(false),
        }
    }

    fn instance_name<'a>(&self, fullname: &'a str) -> &'a str {
        instance_name(&self.service_type, fullname)
    }

    fn record_resolved(&self, name: String, addr: SocketAddr) {
        self.resolved.lock().insert(name, addr);
        self.resolved_notify.notify_waiters();
    }

    /// Wait until `name` has an address.
    async fn resolved_addr(&self, name: &str) -> SocketAddr {
        loop {
            // Registered before the lookup so a resolution in between is
            // not missed.
            let notified = self.resolved_notify.notified();
            let cached = self.resolved.lock().get(name).copied();
            if let Some(addr) = cached {
                return addr;
            }
            notified.await;
        }
    }

    fn handle_event(&self, event: ServiceEvent, events: &mpsc::UnboundedSender<DiscoveryEvent>) {
        let forwarded = match event {
            ServiceEvent::ServiceFound(_, fullname) => {
                DiscoveryEvent::Found(self.instance_name(&fullname).to_string())
            }
            ServiceEvent::ServiceResolved(info) => {
                let name = self.instance_name(info.get_fullname()).to_string();
                let addr = info
                    .get_addresses()
                    .iter()
                    .next()
                    .map(|ip| SocketAddr::new(IpAddr::from(*ip), info.get_port()));
                match addr {
                    Some(addr) => {
                        self.record_resolved(name.clone(), addr);
                        DiscoveryEvent::Resolved { name, addr }
                    }
                    None => DiscoveryEvent::ResolveFailed {
                        name,
                        reason: "no address advertised".to_string(),
                    },
                }
            }
            ServiceEvent::ServiceRemoved(_, fullname) => {
                let name = self.instance_name(&fullname).to_string();
                self.resolved.lock().remove(&name);
                DiscoveryEvent::Lost(name)
            }
            _ => return,
        };

        if events.send(forwarded).is_err() {
            self.browsing.store(false, Ordering::Release);
        }
    }
}

struct Shared {
    daemon: ServiceDaemon,
    catalog: Catalog,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!("mdns daemon shutdown: {}", e);
        }
    }
}

/// mDNS implementation of [`ServiceDiscovery`].
#[derive(Clone)]
pub struct MdnsDiscovery {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl MdnsDiscovery {
    /// Start an mDNS daemon for `service_type`
    /// (e.g. [`DEFAULT_SERVICE_TYPE`](crate::config::DEFAULT_SERVICE_TYPE)).
    ///
    /// The browse task runs on `runtime`.
    pub fn new(service_type: impl Into<String>, runtime: &Handle) -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(discovery_error)?;
        Ok(Self {
            shared: Arc::new(Shared {
                daemon,
                catalog: Catalog::new(service_type.into()),
            }),
            runtime: runtime.clone(),
        })
    }

    /// Advertise a service instance reachable at `addr`.
    pub fn advertise(&self, instance_name: &str, addr: SocketAddr) -> Result<()> {
        let host = hostname::get()
            .map_err(discovery_error)?
            .to_string_lossy()
            .into_owned();
        let host_name = format!("{}.local.", host.trim_end_matches(".local"));
        let ip = addr.ip().to_string();

        let info = ServiceInfo::new(
            &self.shared.catalog.service_type,
            instance_name,
            &host_name,
            ip.as_str(),
            addr.port(),
            None::<HashMap<String, String>>,
        )
        .map_err(discovery_error)?;

        self.shared.daemon.register(info).map_err(discovery_error)?;
        tracing::debug!("advertising {:?} at {}", instance_name, addr);
        Ok(())
    }

    /// Stop advertising a service instance.
    pub fn withdraw(&self, instance_name: &str) -> Result<()> {
        self.shared
            .daemon
            .unregister(&fullname(&self.shared.catalog.service_type, instance_name))
            .map_err(discovery_error)?;
        Ok(())
    }
}

impl ServiceDiscovery for MdnsDiscovery {
    fn start_browsing(&self, events: mpsc::UnboundedSender<DiscoveryEvent>) -> Result<()> {
        let catalog = &self.shared.catalog;
        let receiver = self
            .shared
            .daemon
            .browse(&catalog.service_type)
            .map_err(discovery_error)?;
        catalog.browsing.store(true, Ordering::Release);

        let shared = self.shared.clone();
        self.runtime.spawn(async move {
            let catalog = &shared.catalog;
            // The daemon drops its sender after `stop_browse`, ending the loop.
            while let Ok(event) = receiver.recv_async().await {
                catalog.handle_event(event, &events);
                if !catalog.browsing.load(Ordering::Acquire) {
                    break;
                }
            }
            tracing::debug!("mdns browsing stopped for {}", catalog.service_type);
        });
        Ok(())
    }

    fn stop_browsing(&self) {
        let catalog = &self.shared.catalog;
        if catalog.browsing.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.shared.daemon.stop_browse(&catalog.service_type) {
                tracing::debug!("mdns stop_browse: {}", e);
            }
        }
    }

    fn resolve(&self, name: &str) -> BoxFuture<'static, Result<SocketAddr>> {
        let shared = self.shared.clone();
        let name = name.to_string();
        Box::pin(async move { Ok(shared.catalog.resolved_addr(&name).await) })
    }
}
