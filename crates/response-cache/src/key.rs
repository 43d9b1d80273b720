use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

/// Kind of model call a cached value answers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOp {
    Extract,
    Refine,
    Completion,
    Observe,
}

impl CacheOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOp::Extract => "extract",
            CacheOp::Refine => "refine",
            CacheOp::Completion => "completion",
            CacheOp::Observe => "observe",
        }
    }
}

impl fmt::Display for CacheOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content address of one model call: SHA-256 over the canonical JSON of `{op, inputs}`.
///
/// `serde_json` maps keep keys sorted, so field order in `inputs` does not change the key.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive<T>(op: CacheOp, inputs: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        let inputs = serde_json::to_value(inputs)?;
        let canonical = json!({ "op": op, "inputs": inputs });
        let bytes = serde_json::to_vec(&canonical)?;
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
