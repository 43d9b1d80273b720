use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("cdp command failed: {0}")]
    Cdp(String),
    #[error("probe script returned malformed data: {0}")]
    MalformedProbe(String),
    #[error("scope not found: {0}")]
    ScopeNotFound(String),
}

impl From<AdapterError> for LayoutError {
    fn from(err: AdapterError) -> Self {
        LayoutError::Cdp(err.to_string())
    }
}
