//! Word-level bounding box measurement.
//!
//! Measuring mutates the page: every word of every candidate's text nodes is wrapped in a span so
//! the browser will report a box for it. [`LayoutProbe::capture`] snapshots the scope's markup
//! first and [`LayoutProbe::restore`] puts it back.

use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::PageSession;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::LayoutError;
use crate::model::{ContainerBox, WordBox};

/// Pre-mutation state of the measured scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeCapture {
    /// Root xpath of the scope; `None` for the whole page.
    pub scope: Option<String>,
    pub container: ContainerBox,
    pub markup: String,
}

#[async_trait]
pub trait LayoutProbe: Send + Sync {
    async fn capture(&self, scope: Option<&str>) -> Result<ProbeCapture, LayoutError>;
    /// Boxes of the words under each xpath, in page-absolute coordinates.
    async fn measure(&self, xpaths: &[String]) -> Result<Vec<WordBox>, LayoutError>;
    async fn restore(&self, capture: &ProbeCapture) -> Result<(), LayoutError>;
}

const CAPTURE_FUNCTION: &str = r#"(scope) => {
  const root = scope
    ? document.evaluate(scope, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue
    : document.body;
  if (!root) { return null; }
  if (!scope) {
    const doc = document.documentElement;
    return {
      markup: root.innerHTML,
      x: 0,
      y: 0,
      width: Math.max(doc.scrollWidth, doc.clientWidth),
      height: Math.max(doc.scrollHeight, doc.clientHeight),
    };
  }
  const rect = root.getBoundingClientRect();
  return {
    markup: root.innerHTML,
    x: rect.left + window.scrollX,
    y: rect.top + window.scrollY,
    width: rect.width,
    height: rect.height,
  };
}"#;

const MEASURE_FUNCTION: &str = r#"(xpaths) => {
  const boxes = [];
  const seen = new Set();
  for (const xpath of xpaths) {
    let element = null;
    try {
      element = document.evaluate(xpath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    } catch (e) { continue; }
    if (!element || seen.has(element)) { continue; }
    seen.add(element);
    const target = element.nodeType === Node.TEXT_NODE ? element.parentElement : element;
    if (!target) { continue; }
    const walker = document.createTreeWalker(target, NodeFilter.SHOW_TEXT);
    const texts = [];
    while (walker.nextNode()) { texts.push(walker.currentNode); }
    for (const textNode of texts) {
      const parent = textNode.parentElement;
      if (!parent || parent.hasAttribute('data-perception-word')) { continue; }
      const parts = textNode.textContent.split(/(\s+)/);
      if (!parts.some(p => p.trim())) { continue; }
      const fragment = document.createDocumentFragment();
      for (const part of parts) {
        if (!part.trim()) { fragment.appendChild(document.createTextNode(part)); continue; }
        const span = document.createElement('span');
        span.setAttribute('data-perception-word', '');
        span.textContent = part;
        fragment.appendChild(span);
      }
      parent.replaceChild(fragment, textNode);
    }
    for (const span of target.querySelectorAll('span[data-perception-word]')) {
      const rect = span.getBoundingClientRect();
      if (rect.width === 0 || rect.height === 0) { continue; }
      boxes.push({
        text: span.textContent,
        x: rect.left + window.scrollX,
        y: rect.top + window.scrollY,
        width: rect.width,
        height: rect.height,
      });
    }
  }
  return boxes;
}"#;

const RESTORE_FUNCTION: &str = r#"(scope, markup) => {
  const root = scope
    ? document.evaluate(scope, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue
    : document.body;
  if (!root) { return false; }
  root.innerHTML = markup;
  return true;
}"#;

/// [`LayoutProbe`] driving the page through `Runtime.evaluate`.
pub struct CdpLayoutProbe<S>
where
    S: PageSession + ?Sized,
{
    session: Arc<S>,
}

impl<S> CdpLayoutProbe<S>
where
    S: PageSession + ?Sized,
{
    pub fn new(session: Arc<S>) -> Self {
        Self { session }
    }

    async fn invoke(&self, function: &str, args: &[Value]) -> Result<Value, LayoutError> {
        let args = args
            .iter()
            .map(|arg| serde_json::to_string(arg))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| LayoutError::MalformedProbe(err.to_string()))?;
        let expression = format!("({function})({})", args.join(", "));
        Ok(self.session.evaluate(&expression).await?)
    }
}

#[derive(Deserialize)]
struct CaptureReply {
    markup: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[async_trait]
impl<S> LayoutProbe for CdpLayoutProbe<S>
where
    S: PageSession + ?Sized + 'static,
{
    async fn capture(&self, scope: Option<&str>) -> Result<ProbeCapture, LayoutError> {
        let scope_arg = scope.map(Value::from).unwrap_or(Value::Null);
        let reply = self.invoke(CAPTURE_FUNCTION, &[scope_arg]).await?;
        if reply.is_null() {
            return Err(LayoutError::ScopeNotFound(
                scope.unwrap_or("document.body").to_string(),
            ));
        }
        let reply: CaptureReply = serde_json::from_value(reply)
            .map_err(|err| LayoutError::MalformedProbe(err.to_string()))?;
        Ok(ProbeCapture {
            scope: scope.map(str::to_string),
            container: ContainerBox {
                x: reply.x,
                y: reply.y,
                width: reply.width,
                height: reply.height,
            },
            markup: reply.markup,
        })
    }

    async fn measure(&self, xpaths: &[String]) -> Result<Vec<WordBox>, LayoutError> {
        if xpaths.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self
            .invoke(MEASURE_FUNCTION, &[Value::from(xpaths.to_vec())])
            .await?;
        let boxes: Vec<WordBox> = serde_json::from_value(reply)
            .map_err(|err| LayoutError::MalformedProbe(err.to_string()))?;
        debug!(target: "perceiver-layout", xpaths = xpaths.len(), words = boxes.len(), "measured words");
        Ok(boxes)
    }

    async fn restore(&self, capture: &ProbeCapture) -> Result<(), LayoutError> {
        let scope_arg = capture
            .scope
            .as_deref()
            .map(Value::from)
            .unwrap_or(Value::Null);
        let restored = self
            .invoke(
                RESTORE_FUNCTION,
                &[scope_arg, Value::from(capture.markup.as_str())],
            )
            .await?;
        if restored.as_bool() != Some(true) {
            let scope = capture.scope.as_deref().unwrap_or("document.body");
            return Err(LayoutError::ScopeNotFound(scope.to_string()));
        }
        Ok(())
    }
}
