//! Validated, retried, cached access to the model boundary.

use std::sync::Arc;

use chrono::Utc;
use perception_core_types::RequestId;
use response_cache::{CacheKey, CacheOp, ResponseCache};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::audit::{AuditQueue, AuditRecord};
use crate::errors::{HubError, ModelError, Result};
use crate::llm::{CompletionCall, ExtractCall, ObserveCall, PerceptionModel, RefineCall};
use crate::metrics;
use crate::models::{CompletionOutput, ExtractOutput, ModelOutput, ObserveOutput, RefineOutput};

#[derive(Clone, Copy)]
enum Call<'a> {
    Extract(&'a ExtractCall),
    Refine(&'a RefineCall),
    Completion(&'a CompletionCall),
    Observe(&'a ObserveCall),
}

impl Call<'_> {
    fn op(&self) -> CacheOp {
        match self {
            Call::Extract(_) => CacheOp::Extract,
            Call::Refine(_) => CacheOp::Refine,
            Call::Completion(_) => CacheOp::Completion,
            Call::Observe(_) => CacheOp::Observe,
        }
    }

    fn payload(&self) -> Value {
        let encoded = match self {
            Call::Extract(call) => serde_json::to_value(call),
            Call::Refine(call) => serde_json::to_value(call),
            Call::Completion(call) => serde_json::to_value(call),
            Call::Observe(call) => serde_json::to_value(call),
        };
        encoded.unwrap_or(Value::Null)
    }
}

pub struct Inference {
    model: Arc<dyn PerceptionModel>,
    cache: Option<Arc<ResponseCache>>,
    audit: Option<Arc<AuditQueue>>,
    max_retries: u32,
}

impl Inference {
    pub fn new(model: Arc<dyn PerceptionModel>) -> Self {
        Self {
            model,
            cache: None,
            audit: None,
            max_retries: 2,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditQueue>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    pub async fn extract(
        &self,
        request_id: &RequestId,
        call: &ExtractCall,
    ) -> Result<ExtractOutput> {
        self.run(request_id, Call::Extract(call)).await
    }

    pub async fn refine(&self, request_id: &RequestId, call: &RefineCall) -> Result<RefineOutput> {
        self.run(request_id, Call::Refine(call)).await
    }

    pub async fn check_completion(
        &self,
        request_id: &RequestId,
        call: &CompletionCall,
    ) -> Result<CompletionOutput> {
        self.run(request_id, Call::Completion(call)).await
    }

    pub async fn observe(
        &self,
        request_id: &RequestId,
        call: &ObserveCall,
    ) -> Result<ObserveOutput> {
        self.run(request_id, Call::Observe(call)).await
    }

    /// Purge everything this request cached. Called whenever a request is abandoned.
    pub fn abandon(&self, request_id: &RequestId) {
        if let Some(cache) = &self.cache {
            let removed = cache.purge(request_id);
            debug!(target: "perceiver-hub", %request_id, removed, "purged cache for failed request");
        }
    }

    async fn run<O>(&self, request_id: &RequestId, call: Call<'_>) -> Result<O>
    where
        O: DeserializeOwned + Serialize + ModelOutput,
    {
        let op = call.op();
        let payload = call.payload();
        let key = match &self.cache {
            Some(_) => match CacheKey::derive(op, &payload) {
                Ok(key) => Some(key),
                Err(err) => {
                    debug!(target: "perceiver-hub", %op, %err, "call not cacheable");
                    None
                }
            },
            None => None,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get_as::<O>(key) {
                metrics::record_cache_hit();
                let cached = serde_json::to_value(&hit).ok();
                self.record(request_id, op, 0, true, &payload, cached, None);
                return Ok(hit);
            }
        }

        let attempts = self.max_retries + 1;
        let mut last_error = ModelError::Malformed("no attempt made".to_string());
        for attempt in 1..=attempts {
            metrics::record_model_call(attempt);
            let raw = self.invoke(call).await;
            let outcome = raw.clone().and_then(decode::<O>);
            match outcome {
                Ok(output) => {
                    self.record(request_id, op, attempt, false, &payload, raw.ok(), None);
                    if let (Some(cache), Some(key)) = (&self.cache, &key) {
                        if let Ok(value) = serde_json::to_value(&output) {
                            cache.put(key.clone(), value, request_id);
                        }
                    }
                    return Ok(output);
                }
                Err(err) => {
                    warn!(
                        target: "perceiver-hub",
                        %request_id,
                        %op,
                        attempt,
                        attempts,
                        %err,
                        "model call attempt failed"
                    );
                    self.record(
                        request_id,
                        op,
                        attempt,
                        false,
                        &payload,
                        raw.ok(),
                        Some(err.to_string()),
                    );
                    last_error = err;
                }
            }
        }

        metrics::record_model_failure();
        self.abandon(request_id);
        Err(HubError::ModelCall {
            op,
            attempts,
            source: last_error,
        })
    }

    async fn invoke(&self, call: Call<'_>) -> std::result::Result<Value, ModelError> {
        match call {
            Call::Extract(call) => self.model.extract(call).await,
            Call::Refine(call) => self.model.refine(call).await,
            Call::Completion(call) => self.model.check_completion(call).await,
            Call::Observe(call) => self.model.observe(call).await,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        request_id: &RequestId,
        op: CacheOp,
        attempt: u32,
        cached: bool,
        call: &Value,
        response: Option<Value>,
        error: Option<String>,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        audit.push(AuditRecord {
            request_id: request_id.clone(),
            op,
            attempt,
            cached,
            recorded_at: Utc::now(),
            call: call.clone(),
            response,
            error,
        });
    }
}

/// Raw model JSON -> validated output. Providers that return text get the first JSON object in
/// it parsed.
fn decode<O>(raw: Value) -> std::result::Result<O, ModelError>
where
    O: DeserializeOwned + ModelOutput,
{
    let value = match raw {
        Value::String(text) => {
            let object = extract_json_object(&text)
                .ok_or_else(|| ModelError::Malformed("no JSON object in response".to_string()))?;
            serde_json::from_str(&object).map_err(|err| ModelError::Malformed(err.to_string()))?
        }
        other => other,
    };
    let output: O =
        serde_json::from_value(value).map_err(|err| ModelError::Malformed(err.to_string()))?;
    output.validate().map_err(ModelError::Malformed)?;
    Ok(output)
}

fn extract_json_object(raw: &str) -> Option<String> {
    if raw.trim_start().starts_with('{') {
        return Some(trim_symmetric(raw));
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(trim_symmetric(block));
            }
        }
    }

    let start = raw.find('{')?;
    let mut depth = 0i32;
    for (idx, ch) in raw[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(trim_symmetric(&raw[start..=start + idx]));
                }
            }
            _ => {}
        }
    }
    None
}

fn trim_symmetric(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct QueuedModel {
        extract: Mutex<VecDeque<std::result::Result<Value, ModelError>>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl PerceptionModel for QueuedModel {
        async fn extract(&self, _: &ExtractCall) -> std::result::Result<Value, ModelError> {
            *self.calls.lock() += 1;
            self.extract
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Transport("exhausted".into())))
        }
        async fn refine(&self, _: &RefineCall) -> std::result::Result<Value, ModelError> {
            unreachable!()
        }
        async fn check_completion(
            &self,
            _: &CompletionCall,
        ) -> std::result::Result<Value, ModelError> {
            unreachable!()
        }
        async fn observe(&self, _: &ObserveCall) -> std::result::Result<Value, ModelError> {
            unreachable!()
        }
    }

    fn call(content: &str) -> ExtractCall {
        ExtractCall {
            instruction: "title".into(),
            content: content.into(),
            schema: json!({ "type": "object" }),
            prior: None,
            chunk: None,
        }
    }

    #[tokio::test]
    async fn malformed_output_is_retried() {
        let model = Arc::new(QueuedModel::default());
        model.extract.lock().extend([
            Ok(json!({ "nothing": true })),
            Ok(json!("Sure! ```json\n{\"data\": {\"title\": \"Hi\"}, \"completed\": true}\n```")),
        ]);
        let inference = Inference::new(model.clone());
        let out = inference
            .extract(&RequestId::new(), &call("page"))
            .await
            .unwrap();
        assert_eq!(out.data, json!({ "title": "Hi" }));
        assert!(out.completed);
        assert_eq!(*model.calls.lock(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_purge_request_cache() {
        let model = Arc::new(QueuedModel::default());
        model
            .extract
            .lock()
            .push_back(Ok(json!({ "data": { "title": "first" } })));
        let cache = Arc::new(ResponseCache::default());
        let audit = Arc::new(AuditQueue::new(32));
        let inference = Inference::new(model.clone())
            .with_cache(cache.clone())
            .with_audit(audit.clone());
        let request = RequestId::new();

        inference.extract(&request, &call("chunk 0")).await.unwrap();
        assert_eq!(cache.len(), 1);

        let err = inference
            .extract(&request, &call("chunk 1"))
            .await
            .unwrap_err();
        match err {
            HubError::ModelCall { op, attempts, .. } => {
                assert_eq!(op, CacheOp::Extract);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(cache.is_empty());
        assert_eq!(*model.calls.lock(), 4);
        assert_eq!(audit.len(), 4);
    }

    #[tokio::test]
    async fn cached_results_skip_the_model() {
        let model = Arc::new(QueuedModel::default());
        model
            .extract
            .lock()
            .push_back(Ok(json!({ "data": { "title": "cached" } })));
        let cache = Arc::new(ResponseCache::default());
        let inference = Inference::new(model.clone()).with_cache(cache);

        let first = inference.extract(&RequestId::new(), &call("same")).await.unwrap();
        let second = inference.extract(&RequestId::new(), &call("same")).await.unwrap();
        assert_eq!(first.data, second.data);
        assert_eq!(*model.calls.lock(), 1);
    }

    #[test]
    fn json_objects_are_found_in_prose() {
        assert_eq!(
            extract_json_object("answer: {\"a\": {\"b\": 1}} done").as_deref(),
            Some("{\"a\": {\"b\": 1}}")
        );
        assert!(extract_json_object("no json here").is_none());
    }
}
