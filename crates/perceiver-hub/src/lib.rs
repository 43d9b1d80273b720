//! Perception Hub - extraction and observation over a live page
//!
//! This crate turns a page into model-sized text, runs the model calls, and grounds the answers
//! back onto the live page.
//!
//! # Architecture
//!
//! - **Extraction**: DOM-chunk or text-layout strategy driving extract/refine/completion calls
//!   ([`ExtractionOrchestrator`])
//! - **Observation**: DOM-indexed or accessibility text in, grounded locators out
//!   ([`ObservationResolver`])
//! - **Inference**: validation, bounded retries, request-scoped caching and auditing around the
//!   [`PerceptionModel`] boundary
//! - **Page**: [`PerceptionPage`] wraps a [`cdp_adapter::PageSession`] and wires all of the above
//!
//! # Example
//!
//! ```rust,no_run
//! use perceiver_hub::{ExtractOptions, HubSettings, PerceptionHub, PerceptionModel, PerceptionPage};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     session: Arc<cdp_adapter::TransportSession>,
//! #     model: Arc<dyn PerceptionModel>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let page = PerceptionPage::new(session, model, HubSettings::default());
//! page.wait_for_settled_dom(None).await;
//!
//! let result = page
//!     .extract(ExtractOptions::new(
//!         "the article title",
//!         json!({ "type": "object", "properties": { "title": { "type": "string" } } }),
//!     ))
//!     .await?;
//! println!("{} (completed: {})", result.data, result.completed);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod errors;
pub mod extract;
pub mod inference;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod observe;
pub mod page;
pub mod scanner;
pub mod settings;
pub mod settle;

#[cfg(test)]
mod fakes;

// Re-exports
pub use audit::{AuditQueue, AuditRecord, AuditSink, JsonlFileSink};
pub use errors::{HubError, ModelError, Result, ScanError};
pub use extract::ExtractionOrchestrator;
pub use inference::Inference;
pub use llm::{ChunkProgress, CompletionCall, ExtractCall, ObserveCall, PerceptionModel, RefineCall};
pub use metrics::HubMetrics;
pub use models::{
    ExtractOptions, ExtractResult, ExtractStrategy, ObservationResult, ObserveOptions,
    TypedExtract,
};
pub use observe::ObservationResolver;
pub use page::{PageParts, PerceptionHub, PerceptionPage};
pub use scanner::{CandidateScanner, InjectedScanner};
pub use settings::{AuditSettings, CacheSettings, HubSettings};
pub use settle::{wait_for_settled, DomSettleSignal, SettleOutcome, SettleSignal};
