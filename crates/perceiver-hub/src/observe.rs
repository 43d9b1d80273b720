//! Observation resolver: ask the model which elements match an instruction, then ground each
//! returned identifier to a live locator.
//!
//! Identifiers are resolved in order:
//! 1. the scan's candidate index (DOM mode, and a11y mode for identifiers that are not tree
//!    nodes);
//! 2. in a11y mode, the backend id -> candidate correlation built for the same scan;
//! 3. in a11y mode, re-resolving the backend node and synthesising an xpath from the live object.
//!
//! An identifier nothing resolves is dropped from the result, never raised.

use std::sync::Arc;

use perception_core_types::{BackendNodeId, CandidateIndex, Locator, RequestId, ScanResult};
use perceiver_structural::{AccessibilityTree, CorrelationMap, StructuralPerceiver, TreeOptions};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::inference::Inference;
use crate::llm::ObserveCall;
use crate::metrics;
use crate::models::{ObservationResult, ObserveOptions, ObservedElement};
use crate::scanner::CandidateScanner;

/// Everything one observe call resolves against.
struct ScanState {
    scan: ScanResult,
    accessibility: Option<(AccessibilityTree, CorrelationMap)>,
}

pub struct ObservationResolver {
    scanner: Arc<dyn CandidateScanner>,
    structural: Arc<dyn StructuralPerceiver>,
    inference: Arc<Inference>,
    tree_options: TreeOptions,
    use_accessibility_tree: bool,
}

impl ObservationResolver {
    pub fn new(
        scanner: Arc<dyn CandidateScanner>,
        structural: Arc<dyn StructuralPerceiver>,
        inference: Arc<Inference>,
    ) -> Self {
        Self {
            scanner,
            structural,
            inference,
            tree_options: TreeOptions::default(),
            use_accessibility_tree: false,
        }
    }

    pub fn with_tree_options(mut self, options: TreeOptions) -> Self {
        self.tree_options = options;
        self
    }

    /// Mode used when a call does not choose one.
    pub fn with_accessibility_default(mut self, enabled: bool) -> Self {
        self.use_accessibility_tree = enabled;
        self
    }

    pub async fn observe(&self, options: &ObserveOptions) -> Result<Vec<ObservationResult>> {
        let request_id = options.request_id.clone().unwrap_or_default();
        let use_tree = options
            .use_accessibility_tree
            .unwrap_or(self.use_accessibility_tree);

        let state = self
            .scan_state(&request_id, options.root_xpath.as_deref(), use_tree)
            .await;
        let content = match &state.accessibility {
            Some((tree, _)) => tree.simplified.clone(),
            None => state.scan.serialized_text.clone(),
        };
        if content.trim().is_empty() {
            info!(
                target: "perceiver-hub",
                %request_id,
                accessibility = use_tree,
                "nothing to observe"
            );
            return Ok(Vec::new());
        }

        let output = self
            .inference
            .observe(
                &request_id,
                &ObserveCall {
                    instruction: options.instruction.clone(),
                    content,
                    want_action: options.want_action,
                    accessibility_tree: use_tree,
                },
            )
            .await?;

        let mut results = Vec::with_capacity(output.elements.len());
        for element in &output.elements {
            match self.resolve(&state, &element.identifier).await {
                Some(locator) => {
                    results.push(self.to_result(element, locator, options.want_action));
                }
                None => {
                    metrics::record_resolution_omitted();
                    warn!(
                        target: "perceiver-hub",
                        %request_id,
                        identifier = %element.identifier,
                        "observed element could not be resolved; omitting"
                    );
                }
            }
        }
        info!(
            target: "perceiver-hub",
            %request_id,
            returned = output.elements.len(),
            resolved = results.len(),
            "observe finished"
        );
        Ok(results)
    }

    async fn scan_state(
        &self,
        request_id: &RequestId,
        root_xpath: Option<&str>,
        use_tree: bool,
    ) -> ScanState {
        let scan = match self.scanner.scan(root_xpath).await {
            Ok(scan) => scan,
            Err(err) => {
                metrics::record_scan_failure();
                warn!(target: "perceiver-hub", %request_id, %err, "candidate scan failed");
                ScanResult::default()
            }
        };
        if !use_tree {
            return ScanState {
                scan,
                accessibility: None,
            };
        }

        let tree = self.structural.accessibility_tree(&self.tree_options).await;
        let correlation = if scan.candidates.is_empty() {
            CorrelationMap::default()
        } else {
            self.structural.correlate(&scan.candidates).await
        };
        debug!(
            target: "perceiver-hub",
            %request_id,
            nodes = tree.len(),
            correlated = correlation.len(),
            "accessibility scan ready"
        );
        ScanState {
            scan,
            accessibility: Some((tree, correlation)),
        }
    }

    async fn resolve(&self, state: &ScanState, identifier: &str) -> Option<Locator> {
        let direct = state
            .scan
            .primary_xpath(&CandidateIndex::new(identifier))
            .map(Locator::from_xpath);

        let Some((tree, correlation)) = &state.accessibility else {
            return direct;
        };

        let backend_id = match tree.get(identifier) {
            // A candidate with the same index is a different element; never ground onto it.
            Some(node) => match node.backend_dom_node_id {
                Some(backend_id) => backend_id,
                None => {
                    debug!(target: "perceiver-hub", identifier, "tree node has no DOM node");
                    return None;
                }
            },
            None => {
                if direct.is_some() {
                    return direct;
                }
                identifier.trim().parse::<BackendNodeId>().ok()?
            }
        };

        if let Some(index) = correlation.candidate_for(backend_id) {
            if let Some(xpath) = state.scan.primary_xpath(index) {
                return Some(Locator::from_xpath(xpath).with_backend(Some(backend_id)));
            }
        }

        metrics::record_resolution_fallback();
        match self.structural.xpath_for_backend_node(backend_id).await {
            Ok(Some(xpath)) => {
                debug!(
                    target: "perceiver-hub",
                    identifier,
                    backend_id,
                    %xpath,
                    "resolved through live node"
                );
                Some(Locator::from_xpath(xpath).with_backend(Some(backend_id)))
            }
            Ok(None) => None,
            Err(err) => {
                debug!(target: "perceiver-hub", identifier, backend_id, %err, "live node resolution failed");
                None
            }
        }
    }

    fn to_result(
        &self,
        element: &ObservedElement,
        locator: Locator,
        want_action: bool,
    ) -> ObservationResult {
        let (method, arguments) = if want_action {
            (element.method.clone(), element.argument_strings())
        } else {
            (None, Vec::new())
        };
        ObservationResult {
            identifier: element.identifier.clone(),
            description: element.description.clone(),
            locator,
            method,
            arguments,
        }
    }
}
