//! Connection and discovery configuration.
//!
//! [`ConnectionConfig`] is filled by the fluent builders
//! ([`ServiceBrowserBuilder`](crate::ServiceBrowserBuilder),
//! [`AddressBookServer::bind`](crate::AddressBookServer::bind)) and can also
//! be deserialized from an application's own config file:
//!
//! ```
//! use remote_address_book::ConnectionConfig;
//!
//! let config: ConnectionConfig =
//!     serde_json::from_str(r#"{"resolve_timeout_ms": 1500, "request_timeout_ms": 10000}"#)
//!         .unwrap();
//! assert_eq!(config.resolve_timeout.as_millis(), 1500);
//! assert_eq!(config.send_queue_capacity, 1024);
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// mDNS service type peers advertise.
pub const DEFAULT_SERVICE_TYPE: &str = "_remote-address-book._tcp.local.";

/// Default send queue capacity (frames).
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 1024;

/// Default maximum concurrent command handlers per connection.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 64;

/// Default read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default time allowed for name resolution.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for the TCP connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings shared by browsers, connections and servers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// mDNS service type to browse and advertise.
    pub service_type: String,
    /// Largest accepted frame payload.
    pub max_payload_size: u32,
    /// Frames queued for the writer before `send` reports backpressure.
    pub send_queue_capacity: usize,
    /// Inbound requests handled concurrently before new ones are refused.
    pub max_concurrent_handlers: usize,
    /// Size of the socket read buffer.
    pub read_buffer_size: usize,
    /// Time allowed for resolving a service name.
    #[serde(rename = "resolve_timeout_ms", deserialize_with = "millis")]
    pub resolve_timeout: Duration,
    /// Time allowed for the TCP connect.
    #[serde(rename = "connect_timeout_ms", deserialize_with = "millis")]
    pub connect_timeout: Duration,
    /// Expiry for outstanding requests; `None` waits until the connection closes.
    #[serde(rename = "request_timeout_ms", deserialize_with = "optional_millis")]
    pub request_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
        }
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn optional_millis<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.service_type, DEFAULT_SERVICE_TYPE);
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
        assert_eq!(config.send_queue_capacity, DEFAULT_SEND_QUEUE_CAPACITY);
        assert_eq!(config.max_concurrent_handlers, DEFAULT_MAX_CONCURRENT_HANDLERS);
        assert_eq!(config.resolve_timeout, DEFAULT_RESOLVE_TIMEOUT);
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"service_type": "_contacts._tcp.local.", "connect_timeout_ms": 250}"#,
        )
        .unwrap();
        assert_eq!(config.service_type, "_contacts._tcp.local.");
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.resolve_timeout, DEFAULT_RESOLVE_TIMEOUT);
    }

    #[test]
    fn test_deserialize_request_timeout() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"request_timeout_ms": null}"#).unwrap();
        assert_eq!(config.request_timeout, None);

        let config: ConnectionConfig =
            serde_json::from_str(r#"{"request_timeout_ms": 30}"#).unwrap();
        assert_eq!(config.request_timeout, Some(Duration::from_millis(30)));
    }
}
