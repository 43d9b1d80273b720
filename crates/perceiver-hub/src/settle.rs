//! Bounded "page is stable" gate.
//!
//! The wait always fails open: a page that never settles, or a signal that errors, only costs the
//! configured timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cdp_adapter::{AdapterError, PageSession};
use tracing::{debug, warn};

use crate::metrics;

/// Resolves once the page has stopped mutating for a quiet window.
const DOM_QUIET_FUNCTION: &str = r#"(() => new Promise(resolve => {
  const quietMs = 500;
  let timer = setTimeout(done, quietMs);
  const observer = new MutationObserver(() => {
    clearTimeout(timer);
    timer = setTimeout(done, quietMs);
  });
  function done() { observer.disconnect(); resolve(true); }
  observer.observe(document.documentElement || document, { childList: true, subtree: true, attributes: true, characterData: true });
}))()"#;

#[async_trait]
pub trait SettleSignal: Send + Sync {
    /// Returns once the page looks settled. May never return on a busy page.
    async fn settled(&self) -> Result<(), AdapterError>;
}

/// Settle signal driven by a `MutationObserver` inside the page.
pub struct DomSettleSignal<S>
where
    S: PageSession + ?Sized,
{
    session: Arc<S>,
}

impl<S> DomSettleSignal<S>
where
    S: PageSession + ?Sized,
{
    pub fn new(session: Arc<S>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl<S> SettleSignal for DomSettleSignal<S>
where
    S: PageSession + ?Sized,
{
    async fn settled(&self) -> Result<(), AdapterError> {
        self.session.evaluate(DOM_QUIET_FUNCTION).await.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled,
    TimedOut,
    Failed,
}

/// Race `signal` against `timeout`. Never blocks longer than `timeout`.
pub async fn wait_for_settled(signal: &dyn SettleSignal, timeout: Duration) -> SettleOutcome {
    let started = Instant::now();
    match tokio::time::timeout(timeout, signal.settled()).await {
        Ok(Ok(())) => {
            debug!(
                target: "perceiver-hub",
                elapsed_ms = started.elapsed().as_millis() as u64,
                "page settled"
            );
            SettleOutcome::Settled
        }
        Ok(Err(err)) => {
            warn!(target: "perceiver-hub", %err, "settle signal failed; continuing");
            SettleOutcome::Failed
        }
        Err(_) => {
            metrics::record_settle_timeout();
            warn!(
                target: "perceiver-hub",
                timeout_ms = timeout.as_millis() as u64,
                "page did not settle in time; continuing"
            );
            SettleOutcome::TimedOut
        }
    }
}
