//! Pending request table.
//!
//! Maps each outstanding transaction id to the one-shot sender its caller is
//! waiting on. Completing an entry removes it and consumes the sender, so a
//! request completes at most once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{RemoteAddressBookError, Result};
use crate::protocol::TransactionId;

type Completion = oneshot::Sender<Result<Value>>;

#[derive(Default)]
struct Table {
    entries: HashMap<TransactionId, Completion>,
    closed: bool,
}

/// Outstanding requests of one connection.
#[derive(Default)]
pub struct PendingRequests {
    table: Mutex<Table>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `uuid` and return the receiving end of its completion.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` once [`fail_all`](Self::fail_all) has run.
    pub fn insert(&self, uuid: TransactionId) -> Result<oneshot::Receiver<Result<Value>>> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(RemoteAddressBookError::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        table.entries.insert(uuid, tx);
        Ok(rx)
    }

    /// Complete `uuid` with `result`. Returns `false` if no such request is
    /// outstanding.
    pub fn complete(&self, uuid: &TransactionId, result: Result<Value>) -> bool {
        let Some(tx) = self.table.lock().entries.remove(uuid) else {
            return false;
        };
        // The waiter may have given up; the entry is gone either way.
        let _ = tx.send(result);
        true
    }

    /// Forget `uuid` without completing it.
    pub fn remove(&self, uuid: &TransactionId) -> bool {
        self.table.lock().entries.remove(uuid).is_some()
    }

    /// Complete every outstanding request with `ConnectionClosed` and refuse
    /// new ones. Returns the number of requests failed.
    pub fn fail_all(&self) -> usize {
        let entries = {
            let mut table = self.table.lock();
            table.closed = true;
            std::mem::take(&mut table.entries)
        };

        let count = entries.len();
        for (_, tx) in entries {
            let _ = tx.send(Err(RemoteAddressBookError::ConnectionClosed));
        }
        count
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Check if no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The caller's end of an issued request.
///
/// Resolves exactly once: with the peer's reply, with `ConnectionClosed` when
/// the connection ends first, or with `RequestTimedOut` when a request
/// timeout is configured and expires. Dropping it unanswered forgets the
/// request, so a later reply is discarded as unmatched.
#[must_use = "a pending reply does nothing unless waited on"]
pub struct PendingReply {
    uuid: TransactionId,
    rx: oneshot::Receiver<Result<Value>>,
    table: Arc<PendingRequests>,
    timeout: Option<Duration>,
}

impl PendingReply {
    pub(crate) fn new(
        uuid: TransactionId,
        rx: oneshot::Receiver<Result<Value>>,
        table: Arc<PendingRequests>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            uuid,
            rx,
            table,
            timeout,
        }
    }

    /// Transaction id of the request.
    pub fn transaction_id(&self) -> TransactionId {
        self.uuid
    }

    /// Wait for the outcome.
    pub async fn wait(mut self) -> Result<Value> {
        let received = match self.timeout {
            None => (&mut self.rx).await,
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::debug!("request {} timed out after {:?}", self.uuid, limit);
                    return Err(RemoteAddressBookError::RequestTimedOut(self.uuid.to_string()));
                }
            },
        };

        received.unwrap_or(Err(RemoteAddressBookError::ConnectionClosed))
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        // No-op once the entry was completed or failed.
        if self.table.remove(&self.uuid) {
            tracing::debug!("request {} abandoned before its reply", self.uuid);
        }
    }
}
