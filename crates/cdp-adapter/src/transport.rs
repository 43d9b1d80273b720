use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{AdapterError, AdapterErrorKind};
use crate::session::PageSession;

/// Wire-level seam to a running browser. Launching/attaching lives outside this workspace;
/// anything that can deliver commands to an attached session can back a [`TransportSession`].
#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn send_command(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn send_command(
        &self,
        _session_id: &str,
        method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("transport not available for method {method}")))
    }
}

/// [`PageSession`] bound to one attached target of a transport.
pub struct TransportSession {
    transport: Arc<dyn CdpTransport>,
    session_id: String,
    command_timeout: Duration,
}

impl TransportSession {
    pub fn new(transport: Arc<dyn CdpTransport>, session_id: impl Into<String>) -> Self {
        Self {
            transport,
            session_id: session_id.into(),
            command_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl PageSession for TransportSession {
    async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let call = self
            .transport
            .send_command(&self.session_id, method, params);
        match timeout(self.command_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                debug!(target: "cdp-adapter", method, "command timed out");
                Err(AdapterError::new(AdapterErrorKind::Timeout)
                    .with_hint(format!("{method} exceeded {:?}", self.command_timeout))
                    .retriable(true))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct RecordingTransport {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CdpTransport for RecordingTransport {
        async fn send_command(
            &self,
            session_id: &str,
            method: &str,
            _params: Value,
        ) -> Result<Value, AdapterError> {
            self.seen
                .lock()
                .push((session_id.to_string(), method.to_string()));
            if method == "Runtime.evaluate" {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(json!({ "ok": true }))
        }
    }

    #[tokio::test]
    async fn routes_commands_to_bound_session() {
        let transport = Arc::new(RecordingTransport {
            seen: Mutex::new(Vec::new()),
        });
        let session = TransportSession::new(transport.clone(), "S1");
        assert_eq!(session.session_id(), "S1");
        session
            .send_command("DOM.describeNode", json!({}))
            .await
            .unwrap();
        assert_eq!(
            transport.seen.lock().clone(),
            vec![("S1".to_string(), "DOM.describeNode".to_string())]
        );
    }

    #[tokio::test]
    async fn slow_commands_time_out() {
        let transport = Arc::new(RecordingTransport {
            seen: Mutex::new(Vec::new()),
        });
        let session = TransportSession::new(transport, "S1")
            .with_command_timeout(Duration::from_millis(20));
        let err = session
            .send_command("Runtime.evaluate", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Timeout);
        assert!(err.retriable);
    }

    #[tokio::test]
    async fn noop_transport_rejects_commands() {
        let session = TransportSession::new(Arc::new(NoopTransport), "S1");
        let err = session.evaluate("1").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Internal);
    }
}
