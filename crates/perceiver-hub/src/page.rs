//! Page session wrapper carrying the perception capabilities.
use crate::audit::{AuditQueue, AuditSink, JsonlFileSink};
use crate::errors::{HubError, Result};
use crate::extract::ExtractionOrchestrator;
use crate::inference::Inference;
use crate::llm::PerceptionModel;
use crate::models::*;
use crate::observe::ObservationResolver;
use crate::scanner::{CandidateScanner, InjectedScanner};
use crate::settings::HubSettings;
use crate::settle::{wait_for_settled, DomSettleSignal, SettleOutcome, SettleSignal};
use async_trait::async_trait;
use cdp_adapter::{AdapterError, PageSession};
use perception_core_types::{PageId, RequestId};
use perceiver_layout::{CdpLayoutProbe, LayoutProbe};
use perceiver_structural::{
    AccessibilityTree, AdapterPort, StructuralPerceiver, StructuralPerceiverImpl,
};
use response_cache::ResponseCache;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Perception surface of one page
#[async_trait]
pub trait PerceptionHub: Send + Sync {
    /// Extract schema-shaped data from the page
    async fn extract(&self, options: ExtractOptions) -> Result<ExtractResult>;

    /// Find and ground the elements matching an instruction
    async fn observe(&self, options: ObserveOptions) -> Result<Vec<ObservationResult>>;

    /// Pruned accessibility tree (empty when the page cannot be queried)
    async fn accessibility_tree(&self) -> AccessibilityTree;

    /// Bounded wait for the DOM to stop mutating
    async fn wait_for_settled_dom(&self, timeout: Option<Duration>) -> SettleOutcome;
}

/// Collaborators a page is assembled from
pub struct PageParts {
    pub scanner: Arc<dyn CandidateScanner>,
    pub probe: Arc<dyn LayoutProbe>,
    pub structural: Arc<dyn StructuralPerceiver>,
    pub settle: Arc<dyn SettleSignal>,
    pub model: Arc<dyn PerceptionModel>,
}

/// A page session plus perception.
///
/// Implements [`PageSession`] by delegation, so it can be handed to anything that drives the raw
/// page. Cache and audit queue belong to this page alone.
pub struct PerceptionPage<S>
where
    S: PageSession + ?Sized,
{
    session: Arc<S>,
    page_id: PageId,
    settings: HubSettings,
    structural: Arc<dyn StructuralPerceiver>,
    settle: Arc<dyn SettleSignal>,
    inference: Arc<Inference>,
    extractor: ExtractionOrchestrator,
    resolver: ObservationResolver,
    audit: Arc<AuditQueue>,
}

impl<S> PerceptionPage<S>
where
    S: PageSession + ?Sized + 'static,
{
    /// Wrap a live page session, talking to the page through CDP
    pub fn new(session: Arc<S>, model: Arc<dyn PerceptionModel>, settings: HubSettings) -> Self {
        let port = Arc::new(AdapterPort::new(session.clone()));
        let parts = PageParts {
            scanner: Arc::new(InjectedScanner::new(session.clone())),
            probe: Arc::new(CdpLayoutProbe::new(session.clone())),
            structural: Arc::new(StructuralPerceiverImpl::new(port)),
            settle: Arc::new(DomSettleSignal::new(session.clone())),
            model,
        };
        Self::from_parts(session, parts, settings)
    }

    /// Assemble a page from explicit collaborators
    pub fn from_parts(session: Arc<S>, parts: PageParts, settings: HubSettings) -> Self {
        let audit = Arc::new(AuditQueue::new(settings.audit.capacity));
        let mut inference = Inference::new(parts.model).with_max_retries(settings.model_retries);
        if settings.audit.enabled {
            inference = inference.with_audit(audit.clone());
        }
        if settings.cache.enabled {
            inference = inference.with_cache(Arc::new(ResponseCache::new(settings.cache.ttl)));
        }
        let inference = Arc::new(inference);

        let extractor =
            ExtractionOrchestrator::new(parts.scanner.clone(), parts.probe, inference.clone())
                .with_settle(parts.settle.clone(), settings.settle_timeout)
                .with_layout(settings.layout.clone());
        let resolver =
            ObservationResolver::new(parts.scanner, parts.structural.clone(), inference.clone())
                .with_tree_options(settings.tree.clone())
                .with_accessibility_default(settings.observe_with_accessibility_tree);

        Self {
            session,
            page_id: PageId::new(),
            settings,
            structural: parts.structural,
            settle: parts.settle,
            inference,
            extractor,
            resolver,
            audit,
        }
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.inference.cache()
    }

    pub fn audit(&self) -> &Arc<AuditQueue> {
        &self.audit
    }

    /// Start writing audit records to the configured file, if auditing is enabled. Must be called
    /// inside a tokio runtime.
    pub fn start_audit_flush(&self) {
        if !self.settings.audit.enabled {
            return;
        }
        let sink: Arc<dyn AuditSink> = Arc::new(JsonlFileSink::new(&self.settings.audit.path));
        self.start_audit_flush_to(sink);
    }

    /// Start (or restart) the audit flush task against `sink`
    pub fn start_audit_flush_to(&self, sink: Arc<dyn AuditSink>) {
        info!(
            target: "perceiver-hub",
            page = %self.page_id.0,
            "audit flush started"
        );
        self.audit
            .start_flush(sink, self.settings.audit.flush_interval);
    }

    /// Stop the audit flush task after writing out what is queued
    pub async fn stop_audit_flush(&self) {
        self.audit.stop().await;
    }

    /// Extract into `T`. The output schema is derived from `T` and replaces `options.schema`.
    pub async fn extract_typed<T>(&self, mut options: ExtractOptions) -> Result<TypedExtract<T>>
    where
        T: JsonSchema + DeserializeOwned,
    {
        options.schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|err| HubError::InvalidRequest(err.to_string()))?;
        let request_id = options.request_id.get_or_insert_with(RequestId::new).clone();
        let result = self.extractor.extract(&options).await?;
        let data: T = match serde_json::from_value(result.data) {
            Ok(data) => data,
            Err(err) => {
                warn!(
                    target: "perceiver-hub",
                    %request_id,
                    %err,
                    "extracted data does not fit the requested type"
                );
                self.inference.abandon(&request_id);
                return Err(HubError::Decode(err.to_string()));
            }
        };
        Ok(TypedExtract {
            data,
            completed: result.completed,
            progress: result.progress,
        })
    }
}

#[async_trait]
impl<S> PerceptionHub for PerceptionPage<S>
where
    S: PageSession + ?Sized + 'static,
{
    async fn extract(&self, options: ExtractOptions) -> Result<ExtractResult> {
        if options.instruction.trim().is_empty() {
            return Err(HubError::InvalidRequest("empty extract instruction".into()));
        }
        self.extractor.extract(&options).await
    }

    async fn observe(&self, options: ObserveOptions) -> Result<Vec<ObservationResult>> {
        if options.instruction.trim().is_empty() {
            return Err(HubError::InvalidRequest("empty observe instruction".into()));
        }
        self.resolver.observe(&options).await
    }

    async fn accessibility_tree(&self) -> AccessibilityTree {
        self.structural.accessibility_tree(&self.settings.tree).await
    }

    async fn wait_for_settled_dom(&self, timeout: Option<Duration>) -> SettleOutcome {
        let timeout = timeout.unwrap_or(self.settings.settle_timeout);
        wait_for_settled(self.settle.as_ref(), timeout).await
    }
}

#[async_trait]
impl<S> PageSession for PerceptionPage<S>
where
    S: PageSession + ?Sized + 'static,
{
    async fn send_command(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, AdapterError> {
        self.session.send_command(method, params).await
    }

    async fn evaluate(&self, expression: &str) -> std::result::Result<Value, AdapterError> {
        self.session.evaluate(expression).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeModel, FakeProbe, FakeScanner};
    use cdp_adapter::ScriptedSession;
    use serde::Deserialize;
    use serde_json::json;

    struct Idle;

    #[async_trait]
    impl SettleSignal for Idle {
        async fn settled(&self) -> std::result::Result<(), AdapterError> {
            Ok(())
        }
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Headline {
        title: String,
    }

    fn page(model: Arc<FakeModel>) -> PerceptionPage<ScriptedSession> {
        page_with(model, HubSettings::default())
    }

    fn page_with(model: Arc<FakeModel>, settings: HubSettings) -> PerceptionPage<ScriptedSession> {
        let session = Arc::new(ScriptedSession::new());
        let port = Arc::new(AdapterPort::new(session.clone()));
        let parts = PageParts {
            scanner: Arc::new(FakeScanner::chunked(1)),
            probe: Arc::new(FakeProbe::new(None)),
            structural: Arc::new(StructuralPerceiverImpl::new(port)),
            settle: Arc::new(Idle),
            model,
        };
        PerceptionPage::from_parts(session, parts, settings)
    }

    #[tokio::test]
    async fn typed_extract_decodes_into_the_schema_type() {
        let model = Arc::new(FakeModel::default());
        model.queue_extract(json!({ "data": { "title": "Hello" }, "completed": true }));
        let mut settings = HubSettings::default();
        settings.audit.enabled = true;
        let page = page_with(model.clone(), settings);

        let typed = page
            .extract_typed::<Headline>(ExtractOptions::new("headline", Value::Null))
            .await
            .unwrap();
        assert_eq!(typed.data.title, "Hello");
        assert!(typed.completed);

        let schema = &model.extract_calls.lock()[0].schema;
        assert_eq!(schema["properties"]["title"]["type"], json!("string"));
        // Extract and completion check, both audited.
        assert_eq!(page.audit().len(), 2);
    }

    #[tokio::test]
    async fn typed_extract_reports_shape_mismatch_and_forgets_it() {
        let model = Arc::new(FakeModel::default());
        model.queue_extract(json!({ "data": { "heading": 3 }, "completed": true }));
        model.queue_extract(json!({ "data": { "title": "Hello" }, "completed": true }));
        let page = page(model.clone());

        let err = page
            .extract_typed::<Headline>(ExtractOptions::new("headline", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Decode(_)));
        assert_eq!(page.cache().map(|cache| cache.len()), Some(0));

        // The same request again reaches the model instead of a cached bad answer.
        let typed = page
            .extract_typed::<Headline>(ExtractOptions::new("headline", Value::Null))
            .await
            .unwrap();
        assert_eq!(typed.data.title, "Hello");
        assert_eq!(model.extract_calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn model_calls_are_not_queued_while_auditing_is_off() {
        let model = Arc::new(FakeModel::default());
        model.queue_extract(json!({ "data": { "title": "Hello" }, "completed": true }));
        let page = page(model);
        page.extract(ExtractOptions::new("headline", json!({ "type": "object" })))
            .await
            .unwrap();
        assert!(page.audit().is_empty());
    }

    #[tokio::test]
    async fn failed_accessibility_query_yields_empty_tree() {
        let page = page(Arc::new(FakeModel::default()));
        // Nothing scripted: every CDP call fails.
        let tree = page.accessibility_tree().await;
        assert!(tree.is_empty());
        assert!(tree.simplified.is_empty());
        assert_eq!(page.session().count("Accessibility.disable"), 1);
    }

    #[tokio::test]
    async fn page_delegates_raw_commands() {
        let page = page(Arc::new(FakeModel::default()));
        page.session()
            .respond("Page.navigate", json!({ "frameId": "main" }));
        let response = page
            .send_command("Page.navigate", json!({ "url": "https://example.com" }))
            .await
            .unwrap();
        assert_eq!(response["frameId"], "main");
        assert_eq!(
            page.wait_for_settled_dom(Some(Duration::from_millis(50)))
                .await,
            SettleOutcome::Settled
        );
        assert!(matches!(
            page.observe(ObserveOptions::new("  ")).await,
            Err(HubError::InvalidRequest(_))
        ));
    }
}
