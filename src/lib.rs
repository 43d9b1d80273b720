//! SoulBrowser perception and grounding.
//!
//! Turns a live page into bounded text a model can reason over, and maps the model's answers back
//! onto live locators. The pieces live in the member crates; this crate adds configuration,
//! logging setup and a one-call way to open a page.
//!
//! ```rust,no_run
//! use soul_perception::{open_page, ObserveOptions, PerceptionHub, PerceptionModel};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     session: Arc<cdp_adapter::TransportSession>,
//! #     model: Arc<dyn PerceptionModel>,
//! # ) -> anyhow::Result<()> {
//! let page = open_page(session, model, None).await?;
//! for element in page.observe(ObserveOptions::new("the search box").with_action()).await? {
//!     println!("{} -> {:?}", element.description, element.locator.selector());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod telemetry;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

pub use cdp_adapter::{AdapterError, AdapterErrorKind, PageSession, ScriptedSession};
pub use config::{load_config, LoadedConfig, PerceptionConfig};
pub use perception_core_types::{
    CandidateIndex, ChunkScan, Locator, PageId, RequestId, ScanResult, SelectorMap,
};
pub use perceiver_hub::{
    ExtractOptions, ExtractResult, ExtractStrategy, HubError, HubSettings, ObservationResult,
    ObserveOptions, PerceptionHub, PerceptionModel, PerceptionPage, SettleOutcome, TypedExtract,
};
pub use perceiver_layout::{LayoutOptions, TextAnnotation};
pub use perceiver_structural::{AccessibilityNode, AccessibilityTree, TreeOptions};
pub use response_cache::{CacheKey, CacheOp, ResponseCache};

/// Wrap `session` with perception, configured from the config file (see [`load_config`]).
/// Starts the audit flush task when auditing is enabled, so it must run inside a tokio runtime.
pub async fn open_page<S>(
    session: Arc<S>,
    model: Arc<dyn PerceptionModel>,
    config_path: Option<&Path>,
) -> Result<PerceptionPage<S>>
where
    S: PageSession + ?Sized + 'static,
{
    let loaded = load_config(config_path).await?;
    let settings = loaded.config.hub_settings();
    let page = PerceptionPage::new(session, model, settings);
    page.start_audit_flush();
    info!(
        page = %page.page_id().0,
        config = %loaded.path.display(),
        "perception page opened"
    );
    Ok(page)
}
