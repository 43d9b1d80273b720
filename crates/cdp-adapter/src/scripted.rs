//! Offline page session with canned protocol responses.
//!
//! Used by the perception crates' tests and for replaying captured sessions without a browser.
//! Responses are queued per method; a queue that runs dry falls back to the method's standing
//! handler, if any.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{AdapterError, AdapterErrorKind};
use crate::session::PageSession;

type Handler = Box<dyn Fn(&Value) -> Result<Value, AdapterError> + Send + Sync>;

#[derive(Default)]
pub struct ScriptedSession {
    queued: Mutex<HashMap<String, VecDeque<Result<Value, AdapterError>>>>,
    handlers: Mutex<HashMap<String, Handler>>,
    commands: Mutex<Vec<(String, Value)>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one successful response for `method`.
    pub fn respond(&self, method: &str, value: Value) {
        self.queued
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(Ok(value));
    }

    /// Queue one failure for `method`.
    pub fn fail(&self, method: &str, error: AdapterError) {
        self.queued
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Answer every otherwise unscripted call to `method` with `handler(params)`.
    pub fn handle<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, AdapterError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .insert(method.to_string(), Box::new(handler));
    }

    pub fn commands(&self) -> Vec<(String, Value)> {
        self.commands.lock().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|(name, _)| name == method)
            .count()
    }
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.commands
            .lock()
            .push((method.to_string(), params.clone()));

        let queued = self
            .queued
            .lock()
            .get_mut(method)
            .and_then(|queue| queue.pop_front());
        if let Some(response) = queued {
            return response;
        }

        let handlers = self.handlers.lock();
        match handlers.get(method) {
            Some(handler) => handler(&params),
            None => Err(AdapterError::new(AdapterErrorKind::UnexpectedResponse)
                .with_hint(format!("no scripted response for {method}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn queued_responses_win_over_handlers() {
        let session = ScriptedSession::new();
        session.handle("Runtime.evaluate", |_| {
            Ok(json!({ "result": { "type": "number", "value": 2 } }))
        });
        session.respond(
            "Runtime.evaluate",
            json!({ "result": { "type": "number", "value": 1 } }),
        );

        assert_eq!(session.evaluate("1").await.unwrap(), json!(1));
        assert_eq!(session.evaluate("2").await.unwrap(), json!(2));
        assert_eq!(session.count("Runtime.evaluate"), 2);
    }

    #[tokio::test]
    async fn unscripted_methods_fail() {
        let session = ScriptedSession::new();
        let err = session
            .send_command("DOM.describeNode", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::UnexpectedResponse);
    }
}
