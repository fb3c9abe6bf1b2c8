//! The handler trait and its closure adapter.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::InboundRequest;
use crate::protocol::RemoteError;

/// Result type for handler functions. The error travels back to the peer.
pub type HandlerResult = std::result::Result<Value, RemoteError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Answers requests the peer sends on a connection.
///
/// Each call runs on its own task; a slow handler does not hold up the
/// connection's read loop.
pub trait CommandHandler: Send + Sync + 'static {
    /// Handle one request.
    fn call(&self, request: InboundRequest) -> BoxFuture<'static, HandlerResult>;
}

/// A [`CommandHandler`] backed by an async closure.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`CommandHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(InboundRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { f }
}

impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(InboundRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: InboundRequest) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.f)(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::protocol::{CommandName, TransactionId};
    use serde_json::json;
    use std::sync::Arc;

    fn request(name: CommandName, person_id: Option<&str>) -> InboundRequest {
        InboundRequest {
            name,
            uuid: TransactionId::new(),
            person_id: person_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let handler = handler_fn(|request: InboundRequest| async move {
            Ok(json!([format!("{}@example.com", request.person_id.unwrap_or_default())]))
        });

        let value = handler
            .call(request(CommandName::GetEmailAddresses, Some("alice")))
            .await
            .unwrap();

        assert_eq!(value, json!(["alice@example.com"]));
    }

    #[tokio::test]
    async fn test_handler_as_trait_object() {
        let handler: Arc<dyn CommandHandler> = Arc::new(handler_fn(|request: InboundRequest| async move {
            Err(RemoteError::unsupported(request.name))
        }));

        let err = handler
            .call(request(CommandName::GetPhoneNumbers, Some("7")))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::Protocol.as_i64());
        assert!(err.message.contains("get-phone-numbers"));
    }
}
