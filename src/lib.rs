//! # remote-address-book
//!
//! Discover address book peers on the local network, connect to one, and
//! query it over a framed request/reply protocol.
//!
//! ## Architecture
//!
//! - **Discovery**: mDNS (or a static table) keeps a live set of advertised
//!   service names and resolves a name to an address
//! - **Connection**: one TCP stream per peer carrying
//!   `[u32 big-endian length][MessagePack map]` frames
//! - **Dispatch**: every request carries a fresh transaction id; replies are
//!   matched by that id, not by arrival order
//!
//! All tasks of a connection run on the runtime it was created on.
//!
//! ## Example
//!
//! ```ignore
//! use remote_address_book::{ConnectionConfig, RemoteAddressBook, ServiceBrowser};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let browser = ServiceBrowser::mdns(ConnectionConfig::default())?;
//!     browser.start()?;
//!
//!     let book = browser.connect("Alice's Contacts").await?;
//!     for person in book.all_people().await? {
//!         println!("{person}");
//!     }
//!     book.disconnect();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;
pub mod writer;

mod browser;
mod remote;
mod server;

pub use browser::{ServiceBrowser, ServiceBrowserBuilder};
pub use config::ConnectionConfig;
pub use discovery::{DiscoveryEvent, MdnsDiscovery, ServiceDiscovery, StaticDiscovery};
pub use dispatcher::{ErrorHandler, RemoteCommandDispatcher};
pub use error::{ErrorCode, RemoteAddressBookError, Result};
pub use handler::{CommandHandler, InboundRequest};
pub use remote::{RemoteAddressBook, RemoteAddressBookHandle};
pub use server::AddressBookServer;
