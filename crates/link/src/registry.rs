//! Method dispatch for the `request`/`response` RPC pair (spec §4.12): the
//! daemon registers handlers by name, the controller calls them by name.
//! Unknown methods and handler panics-as-errors both become typed
//! `RpcError`s rather than dropping the connection.

use crate::message::{RpcError, RpcOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// One RPC method implementation.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    async fn call(&self, params: serde_json::Value) -> Result<serde_json::Value, String>;
}

#[async_trait]
impl<F, Fut> RpcHandler for F
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<serde_json::Value, String>> + Send + 'static,
{
    async fn call(&self, params: serde_json::Value) -> Result<serde_json::Value, String> {
        (self)(params).await
    }
}

/// A name → handler table, consulted on every incoming `request` frame.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn RpcHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: impl Into<String>, handler: impl RpcHandler) {
        self.handlers.insert(method.into(), Arc::new(handler));
    }

    pub async fn dispatch(&self, method: &str, params: serde_json::Value) -> RpcOutcome {
        let Some(handler) = self.handlers.get(method) else {
            return RpcOutcome::Error {
                error: RpcError::unknown_method(method),
            };
        };

        match handler.call(params).await {
            Ok(result) => RpcOutcome::Result { result },
            Err(detail) => RpcOutcome::Error {
                error: RpcError::handler_error(detail),
            },
        }
    }
}
