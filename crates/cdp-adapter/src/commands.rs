//! Command parameter and result types exposed by the CDP adapter interface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Options for `Accessibility.getFullAXTree`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AxSnapshotConfig {
    pub frame_id: Option<String>,
    pub max_depth: Option<u32>,
}

/// Flat accessibility node list as returned by the browser, plus the raw payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AxSnapshotResult {
    pub nodes: Vec<Value>,
    pub tree_id: Option<String>,
    pub raw: Value,
}

/// Handle to a live JS object inside the page (`Runtime.RemoteObjectId`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RemoteObjectId(pub String);

impl RemoteObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
