//! Request/response correlation for the controller side of an RPC call
//! (spec §4.12): a table of in-flight `request_id`s, each resolved once by
//! the matching `response` frame, and timed out if none arrives.

use crate::message::RpcOutcome;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum PendingError {
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),
    #[error("link disconnected before a response arrived")]
    Disconnected,
}

/// Shared between the writer task (which inserts a slot before sending a
/// request) and the reader task (which resolves a slot on the matching
/// response).
#[derive(Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<HashMap<String, oneshot::Sender<RpcOutcome>>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `request_id` as awaiting a response, returning a future
    /// that resolves once [`resolve`](Self::resolve) is called for it or
    /// `timeout` elapses.
    pub async fn wait_for(
        &self,
        request_id: String,
        timeout: Duration,
    ) -> Result<RpcOutcome, PendingError> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(request_id, tx);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(PendingError::Disconnected),
            Err(_) => Err(PendingError::Timeout(timeout)),
        }
    }

    /// Called by the reader task when a `response` frame arrives.
    /// A response with no matching pending request (already timed out,
    /// or a stray duplicate) is silently dropped.
    pub fn resolve(&self, request_id: &str, outcome: RpcOutcome) {
        if let Some(tx) = self.inner.lock().remove(request_id) {
            let _ = tx.send(outcome);
        }
    }

    /// Called when the underlying connection drops: every still-pending
    /// caller gets [`PendingError::Disconnected`] instead of hanging until
    /// its timeout.
    pub fn fail_all(&self) {
        for (_, tx) in self.inner.lock().drain() {
            drop(tx);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RpcOutcome;

    #[tokio::test]
    async fn resolve_unblocks_the_matching_waiter() {
        let pending = PendingRequests::new();
        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move {
                pending
                    .wait_for("r1".to_string(), Duration::from_secs(5))
                    .await
            })
        };

        tokio::task::yield_now().await;
        pending.resolve(
            "r1",
            RpcOutcome::Result {
                result: serde_json::json!({"ok": true}),
            },
        );

        let outcome = waiter.await.unwrap().unwrap();
        match outcome {
            RpcOutcome::Result { result } => assert_eq!(result["ok"], true),
            RpcOutcome::Error { .. } => panic!("unexpected error outcome"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let pending = PendingRequests::new();
        let err = pending
            .wait_for("r2".to_string(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, PendingError::Timeout(_)));
    }

    #[tokio::test]
    async fn resolve_with_no_waiter_is_a_no_op() {
        let pending = PendingRequests::new();
        pending.resolve(
            "ghost",
            RpcOutcome::Result {
                result: serde_json::Value::Null,
            },
        );
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn fail_all_disconnects_pending_waiters() {
        let pending = PendingRequests::new();
        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move {
                pending
                    .wait_for("r3".to_string(), Duration::from_secs(5))
                    .await
            })
        };

        tokio::task::yield_now().await;
        pending.fail_all();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, PendingError::Disconnected));
    }
}
