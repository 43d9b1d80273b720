//! Port to the in-page candidate scanner.
//!
//! The scanner script is injected by whoever owns the page (it ships with the action layer, not
//! with this crate). It exposes `window.processAllOfDom(rootXpath?)` for full scans and
//! `window.processDom(chunksSeen)` for viewport-sized chunks, both resolving to
//! `{outputString, selectorMap, chunk?, chunks?}`.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::PageSession;
use perception_core_types::{CandidateIndex, ChunkScan, ScanResult, SelectorMap};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::ScanError;

#[async_trait]
pub trait CandidateScanner: Send + Sync {
    /// Serialize every candidate, optionally limited to the subtree under `root_xpath`.
    async fn scan(&self, root_xpath: Option<&str>) -> Result<ScanResult, ScanError>;

    /// Serialize the first chunk not in `seen`.
    async fn scan_chunk(&self, seen: &BTreeSet<usize>) -> Result<ChunkScan, ScanError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScannerPayload {
    #[serde(default)]
    output_string: String,
    #[serde(default)]
    selector_map: serde_json::Map<String, Value>,
    #[serde(default)]
    chunk: Option<usize>,
    #[serde(default)]
    chunks: Option<Vec<usize>>,
}

impl ScannerPayload {
    fn selectors(&self) -> SelectorMap {
        let mut map = SelectorMap::new();
        for (key, paths) in &self.selector_map {
            let ranked: Vec<String> = match paths {
                Value::String(path) => vec![path.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            if ranked.is_empty() {
                continue;
            }
            map.insert(CandidateIndex::new(key), ranked);
        }
        map
    }
}

/// Scanner reached through `Runtime.evaluate` on the page session.
pub struct InjectedScanner<S>
where
    S: PageSession + ?Sized,
{
    session: Arc<S>,
}

impl<S> InjectedScanner<S>
where
    S: PageSession + ?Sized,
{
    pub fn new(session: Arc<S>) -> Self {
        Self { session }
    }

    async fn call(&self, function: &str, argument: Value) -> Result<ScannerPayload, ScanError> {
        let expression = format!(
            "(async () => {{ if (typeof window.{function} !== 'function') {{ return null; }} return await window.{function}({argument}); }})()"
        );
        let value = self.session.evaluate(&expression).await?;
        if value.is_null() {
            return Err(ScanError::NotInjected(function.to_string()));
        }
        serde_json::from_value(value).map_err(|err| ScanError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl<S> CandidateScanner for InjectedScanner<S>
where
    S: PageSession + ?Sized,
{
    async fn scan(&self, root_xpath: Option<&str>) -> Result<ScanResult, ScanError> {
        let argument = root_xpath.map_or(Value::Null, |xpath| Value::String(xpath.to_string()));
        let payload = self.call("processAllOfDom", argument).await?;
        let result = ScanResult {
            candidates: payload.selectors(),
            serialized_text: payload.output_string,
        };
        debug!(
            target: "perceiver-hub",
            candidates = result.candidates.len(),
            chars = result.serialized_text.len(),
            "full scan"
        );
        Ok(result)
    }

    async fn scan_chunk(&self, seen: &BTreeSet<usize>) -> Result<ChunkScan, ScanError> {
        let seen: Vec<usize> = seen.iter().copied().collect();
        let payload = self.call("processDom", Value::from(seen)).await?;
        let chunk_index = payload
            .chunk
            .ok_or_else(|| ScanError::Malformed("missing `chunk`".to_string()))?;
        let total_chunks = payload.chunks.as_ref().map_or(0, Vec::len);
        Ok(ChunkScan {
            candidates: payload.selectors(),
            serialized_text: payload.output_string,
            chunk_index,
            total_chunks,
        })
    }
}
