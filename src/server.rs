//! Server role: accept connections and answer peers' requests.
//!
//! Every accepted connection gets its own [`RemoteCommandDispatcher`] with
//! the server's handler installed, so the serving side speaks exactly the
//! same protocol as the browsing side.
//!
//! # Example
//!
//! ```ignore
//! use remote_address_book::{AddressBookServer, ConnectionConfig};
//! use remote_address_book::handler::handler_fn;
//!
//! let server = Arc::new(
//!     AddressBookServer::bind("0.0.0.0:0".parse()?, Arc::new(handler_fn(answer)), ConnectionConfig::default())
//!         .await?,
//! );
//! server.advertise(&mdns, "Alice's Contacts")?;
//! server.serve().await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::ConnectionConfig;
use crate::discovery::MdnsDiscovery;
use crate::dispatcher::RemoteCommandDispatcher;
use crate::error::{RemoteAddressBookError, Result};
use crate::handler::CommandHandler;
use crate::transport::AddressBookListener;

/// Serves one address book to any number of peers.
pub struct AddressBookServer {
    listener: AddressBookListener,
    handler: Arc<dyn CommandHandler>,
    config: ConnectionConfig,
    runtime: Handle,
    connections: Mutex<Vec<RemoteCommandDispatcher>>,
    shutdown_tx: watch::Sender<bool>,
}

impl AddressBookServer {
    /// Bind to `addr` on the current runtime. Port 0 picks a free port.
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn CommandHandler>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| RemoteAddressBookError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let listener = AddressBookListener::bind(addr).await?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            listener,
            handler,
            config,
            runtime,
            connections: Mutex::new(Vec::new()),
            shutdown_tx,
        })
    }

    /// Get the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Advertise this server over mDNS as `instance_name`.
    pub fn advertise(&self, discovery: &MdnsDiscovery, instance_name: &str) -> Result<()> {
        discovery.advertise(instance_name, self.local_addr()?)
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        let mut connections = self.connections.lock();
        connections.retain(RemoteCommandDispatcher::is_connected);
        connections.len()
    }

    /// Accept connections until [`shutdown`](Self::shutdown) is called.
    ///
    /// A failed accept is logged and does not stop the loop.
    pub async fn serve(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("accepted connection from {}", peer);
                        self.adopt(stream, peer);
                    }
                    Err(e) => tracing::error!("Accept error: {}", e),
                },
                _ = shutdown_rx.changed() => {}
            }
        }

        tracing::debug!("server stopped accepting");
        Ok(())
    }

    fn adopt(&self, stream: crate::transport::AddressBookStream, peer: SocketAddr) {
        let dispatcher = RemoteCommandDispatcher::new(stream, &self.runtime, &self.config);
        dispatcher.register_command_handler(self.handler.clone());
        dispatcher.set_error_handler(Arc::new(move |e| {
            tracing::debug!("connection from {} ended: {}", peer, e);
        }));

        let mut connections = self.connections.lock();
        connections.retain(RemoteCommandDispatcher::is_connected);
        connections.push(dispatcher);
    }

    /// Stop accepting and close every open connection.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let connections = std::mem::take(&mut *self.connections.lock());
        for connection in &connections {
            connection.disconnect();
        }
    }
}
