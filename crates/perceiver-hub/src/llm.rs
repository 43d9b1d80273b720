//! Model boundary.
//!
//! Provider adapters live outside this workspace. They implement [`PerceptionModel`], render the
//! call structs into prompts, and hand back whatever JSON the model produced. Validation,
//! retries, and caching happen in [`crate::inference::Inference`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ModelError;

/// Position of the chunk being extracted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProgress {
    pub index: usize,
    pub total: usize,
}

/// Structured extraction over one piece of serialized page content.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractCall {
    pub instruction: String,
    pub content: String,
    pub schema: Value,
    /// Content accumulated by earlier chunks, if any.
    pub prior: Option<Value>,
    pub chunk: Option<ChunkProgress>,
}

/// Merge previously accumulated data with the newest extraction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefineCall {
    pub instruction: String,
    pub schema: Value,
    pub previous: Value,
    pub latest: Value,
}

/// Ask whether accumulated data already satisfies the instruction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionCall {
    pub instruction: String,
    pub extracted: Value,
    pub chunks_seen: usize,
    pub chunks_total: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObserveCall {
    pub instruction: String,
    pub content: String,
    pub want_action: bool,
    /// `content` is an accessibility tree rendering rather than DOM-indexed text.
    pub accessibility_tree: bool,
}

#[async_trait]
pub trait PerceptionModel: Send + Sync {
    /// Expected shape: `{data, progress, completed}`.
    async fn extract(&self, call: &ExtractCall) -> Result<Value, ModelError>;
    /// Expected shape: `{data}`.
    async fn refine(&self, call: &RefineCall) -> Result<Value, ModelError>;
    /// Expected shape: `{completed, progress}`.
    async fn check_completion(&self, call: &CompletionCall) -> Result<Value, ModelError>;
    /// Expected shape: `{elements: [{identifier, description, method?, arguments?}]}`.
    async fn observe(&self, call: &ObserveCall) -> Result<Value, ModelError>;
}
