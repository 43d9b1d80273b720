//! Extraction orchestrator.
//!
//! Two strategies share one entry point:
//! - **DOM chunks**: one extract/refine/completion round per viewport-sized chunk, stopping as
//!   soon as the model reports completion or the scanner runs out of chunks.
//! - **Text layout**: a single pass over the page's reconstructed visual layout. The probe's page
//!   mutations are always rolled back, whatever happens in between.
//!
//! Scan and probe failures are absorbed (the caller's prior content passes through). Model
//! failures end the call; by then [`Inference`] has already purged the request's cache entries.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use perception_core_types::RequestId;
use perceiver_layout::{
    annotate, reconstruct, LayoutError, LayoutOptions, LayoutProbe, ProbeCapture, TextAnnotation,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::errors::{Result, ScanError};
use crate::inference::Inference;
use crate::llm::{ChunkProgress, CompletionCall, ExtractCall, RefineCall};
use crate::metrics;
use crate::models::{ExtractOptions, ExtractResult, ExtractStrategy};
use crate::scanner::CandidateScanner;
use crate::settle::{wait_for_settled, SettleSignal};

/// Why the layout pass produced no annotations.
#[derive(Debug, Error)]
enum LayoutPassError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Probe(#[from] LayoutError),
}

/// Accumulated state of one chunked extract call.
struct ExtractionState {
    data: Option<Value>,
    progress: String,
    seen: BTreeSet<usize>,
    completed: bool,
}

impl ExtractionState {
    fn new(prior: Option<Value>) -> Self {
        Self {
            data: prior.filter(|value| !value.is_null()),
            progress: String::new(),
            seen: BTreeSet::new(),
            completed: false,
        }
    }

    fn into_result(self, chunks_total: usize) -> ExtractResult {
        ExtractResult {
            data: self.data.unwrap_or(Value::Null),
            completed: self.completed,
            progress: self.progress,
            chunks_processed: self.seen.len(),
            chunks_total,
        }
    }
}

pub struct ExtractionOrchestrator {
    scanner: Arc<dyn CandidateScanner>,
    probe: Arc<dyn LayoutProbe>,
    inference: Arc<Inference>,
    settle: Option<(Arc<dyn SettleSignal>, Duration)>,
    layout: LayoutOptions,
}

impl ExtractionOrchestrator {
    pub fn new(
        scanner: Arc<dyn CandidateScanner>,
        probe: Arc<dyn LayoutProbe>,
        inference: Arc<Inference>,
    ) -> Self {
        Self {
            scanner,
            probe,
            inference,
            settle: None,
            layout: LayoutOptions::default(),
        }
    }

    /// Wait (at most `timeout`) for the page to settle before scanning each follow-up chunk.
    pub fn with_settle(mut self, signal: Arc<dyn SettleSignal>, timeout: Duration) -> Self {
        self.settle = Some((signal, timeout));
        self
    }

    pub fn with_layout(mut self, layout: LayoutOptions) -> Self {
        self.layout = layout;
        self
    }

    pub async fn extract(&self, options: &ExtractOptions) -> Result<ExtractResult> {
        let request_id = options.request_id.clone().unwrap_or_default();
        info!(
            target: "perceiver-hub",
            %request_id,
            strategy = ?options.strategy,
            "extract started"
        );
        let result = match options.strategy {
            ExtractStrategy::DomChunks => self.extract_chunks(&request_id, options).await,
            ExtractStrategy::TextLayout => self.extract_layout(&request_id, options).await,
        }?;
        info!(
            target: "perceiver-hub",
            %request_id,
            completed = result.completed,
            chunks = result.chunks_processed,
            total = result.chunks_total,
            "extract finished"
        );
        Ok(result)
    }

    async fn extract_chunks(
        &self,
        request_id: &RequestId,
        options: &ExtractOptions,
    ) -> Result<ExtractResult> {
        let mut state = ExtractionState::new(options.prior.clone());
        let mut chunk = match self.scanner.scan_chunk(&state.seen).await {
            Ok(chunk) => chunk,
            Err(err) => {
                metrics::record_scan_failure();
                warn!(target: "perceiver-hub", %request_id, %err, "chunk scan failed; keeping prior content");
                return Ok(ExtractResult::passthrough(options.prior.clone()));
            }
        };
        let total = chunk.total_chunks;
        if total == 0 {
            warn!(target: "perceiver-hub", %request_id, "scanner reported no chunks");
            return Ok(ExtractResult::passthrough(options.prior.clone()));
        }

        loop {
            if !state.seen.insert(chunk.chunk_index) {
                debug!(
                    target: "perceiver-hub",
                    %request_id,
                    chunk = chunk.chunk_index,
                    "scanner repeated a chunk; treating as exhausted"
                );
                break;
            }

            let extracted = self
                .inference
                .extract(
                    request_id,
                    &ExtractCall {
                        instruction: options.instruction.clone(),
                        content: chunk.serialized_text,
                        schema: options.schema.clone(),
                        prior: state.data.clone(),
                        chunk: Some(ChunkProgress {
                            index: chunk.chunk_index,
                            total,
                        }),
                    },
                )
                .await?;

            let merged = match state.data.take() {
                Some(previous) => {
                    self.inference
                        .refine(
                            request_id,
                            &RefineCall {
                                instruction: options.instruction.clone(),
                                schema: options.schema.clone(),
                                previous,
                                latest: extracted.data,
                            },
                        )
                        .await?
                        .data
                }
                None => extracted.data,
            };
            state.data = Some(merged);
            state.progress = extracted.progress;
            metrics::record_chunk();

            let check = self
                .inference
                .check_completion(
                    request_id,
                    &CompletionCall {
                        instruction: options.instruction.clone(),
                        extracted: state.data.clone().unwrap_or(Value::Null),
                        chunks_seen: state.seen.len(),
                        chunks_total: total,
                    },
                )
                .await?;
            if !check.progress.is_empty() {
                state.progress = check.progress;
            }
            state.completed = extracted.completed || check.completed;

            debug!(
                target: "perceiver-hub",
                %request_id,
                chunk = chunk.chunk_index,
                seen = state.seen.len(),
                total,
                completed = state.completed,
                "chunk processed"
            );
            if state.completed || state.seen.len() >= total {
                break;
            }

            self.settle().await;
            chunk = match self.scanner.scan_chunk(&state.seen).await {
                Ok(next) => next,
                Err(err) => {
                    metrics::record_scan_failure();
                    warn!(
                        target: "perceiver-hub",
                        %request_id,
                        %err,
                        "chunk scan failed; returning accumulated content"
                    );
                    break;
                }
            };
        }

        Ok(state.into_result(total))
    }

    async fn extract_layout(
        &self,
        request_id: &RequestId,
        options: &ExtractOptions,
    ) -> Result<ExtractResult> {
        let root = options.root_xpath.as_deref();
        let capture = match self.probe.capture(root).await {
            Ok(capture) => capture,
            Err(err) => {
                metrics::record_probe_failure();
                warn!(target: "perceiver-hub", %request_id, %err, "layout capture failed; keeping prior content");
                return Ok(ExtractResult::passthrough(options.prior.clone()));
            }
        };

        let measured = self.measure(&capture).await;
        if let Err(err) = self.probe.restore(&capture).await {
            metrics::record_probe_failure();
            warn!(target: "perceiver-hub", %request_id, %err, "failed to restore page after probing");
        }

        let annotations = match measured {
            Ok(annotations) => annotations,
            Err(err) => {
                match err {
                    LayoutPassError::Scan(_) => metrics::record_scan_failure(),
                    LayoutPassError::Probe(_) => metrics::record_probe_failure(),
                }
                warn!(target: "perceiver-hub", %request_id, %err, "layout pass failed; keeping prior content");
                return Ok(ExtractResult::passthrough(options.prior.clone()));
            }
        };

        let content = reconstruct(
            &annotations,
            capture.container.width,
            capture.container.height,
            &self.layout,
        );
        debug!(
            target: "perceiver-hub",
            %request_id,
            annotations = annotations.len(),
            chars = content.len(),
            "layout reconstructed"
        );

        let extracted = self
            .inference
            .extract(
                request_id,
                &ExtractCall {
                    instruction: options.instruction.clone(),
                    content,
                    schema: options.schema.clone(),
                    prior: options.prior.clone().filter(|value| !value.is_null()),
                    chunk: None,
                },
            )
            .await?;
        metrics::record_chunk();

        Ok(ExtractResult {
            data: extracted.data,
            completed: extracted.completed,
            progress: extracted.progress,
            chunks_processed: 1,
            chunks_total: 1,
        })
    }

    /// Scan, measure and deduplicate. Runs between capture and restore.
    async fn measure(
        &self,
        capture: &ProbeCapture,
    ) -> std::result::Result<Vec<TextAnnotation>, LayoutPassError> {
        let scan = self.scanner.scan(capture.scope.as_deref()).await?;
        if scan.candidates.is_empty() {
            return Err(ScanError::Empty.into());
        }
        let xpaths: Vec<String> = scan
            .candidates
            .keys()
            .filter_map(|index| scan.primary_xpath(index).map(str::to_string))
            .collect();
        let words = self.probe.measure(&xpaths).await?;
        Ok(annotate(&words, &capture.container, &self.layout))
    }

    async fn settle(&self) {
        if let Some((signal, timeout)) = &self.settle {
            wait_for_settled(signal.as_ref(), *timeout).await;
        }
    }
}
