//! Handler module - serving inbound requests.
//!
//! Provides:
//! - [`CommandHandler`] - answers requests arriving from the peer
//! - [`InboundRequest`] - a validated request as the handler sees it
//! - [`handler_fn`] - adapts an async closure into a handler
//!
//! # Example
//!
//! ```
//! use remote_address_book::handler::{handler_fn, InboundRequest};
//! use remote_address_book::protocol::{CommandName, RemoteError};
//! use serde_json::json;
//!
//! let handler = handler_fn(|request: InboundRequest| async move {
//!     match request.name {
//!         CommandName::AllPeople => Ok(json!([{"id": "1", "name": "Alice"}])),
//!         name => Err(RemoteError::unsupported(name)),
//!     }
//! });
//! # let _ = handler;
//! ```

mod command_handler;
mod request;

pub use command_handler::{handler_fn, BoxFuture, CommandHandler, FnHandler, HandlerResult};
pub use request::InboundRequest;
