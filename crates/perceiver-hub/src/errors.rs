//! Error types for the perception hub.
//!
//! Only [`HubError::ModelCall`] ends an extract/observe call. Scan, probe, settle, resolution and
//! cache problems are absorbed where they happen and show up in logs only.

use response_cache::CacheOp;
use thiserror::Error;

/// Failure of the external candidate scanner.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scanner script not injected: {0}")]
    NotInjected(String),
    #[error("scanner evaluation failed: {0}")]
    Evaluation(String),
    #[error("scanner returned malformed output: {0}")]
    Malformed(String),
    #[error("scanner returned no candidates")]
    Empty,
}

impl From<cdp_adapter::AdapterError> for ScanError {
    fn from(err: cdp_adapter::AdapterError) -> Self {
        ScanError::Evaluation(err.to_string())
    }
}

/// One failed attempt at the model boundary.
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    #[error("model transport failed: {0}")]
    Transport(String),
    #[error("model call timed out: {0}")]
    Timeout(String),
    #[error("model returned malformed output: {0}")]
    Malformed(String),
}

/// Errors surfaced to callers of the hub.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("{op} model call failed after {attempts} attempt(s): {source}")]
    ModelCall {
        op: CacheOp,
        attempts: u32,
        #[source]
        source: ModelError,
    },

    #[error("extracted data does not match the requested type: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for hub operations
pub type Result<T> = std::result::Result<T, HubError>;
