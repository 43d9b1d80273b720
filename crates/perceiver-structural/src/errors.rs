use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerceiverError {
    #[error("cdp command failed: {0}")]
    Cdp(String),
    #[error("malformed accessibility payload: {0}")]
    MalformedPayload(String),
}

impl From<AdapterError> for PerceiverError {
    fn from(err: AdapterError) -> Self {
        PerceiverError::Cdp(err.to_string())
    }
}
