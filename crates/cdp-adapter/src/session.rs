use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::AdapterError;
use crate::protocol;

/// Capability surface of one attached page.
///
/// Implementations route a DevTools command to the page's session and hand back the raw
/// `result` object. Everything the perception crates need is built on top of this.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError>;

    /// Evaluate an expression in the page's main world and return it by value. Promises are
    /// awaited.
    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        let response = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        protocol::unwrap_evaluation(response)
    }
}

#[async_trait]
impl<T> PageSession for Arc<T>
where
    T: PageSession + ?Sized,
{
    async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        (**self).send_command(method, params).await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        (**self).evaluate(expression).await
    }
}
