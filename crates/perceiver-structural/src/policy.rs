use serde::{Deserialize, Serialize};

/// Knobs for accessibility tree construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    /// Replace surviving generic roles with the live element's tag name. One node resolution
    /// per structural node.
    pub resolve_structural_roles: bool,
    pub decorate_scrollables: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            resolve_structural_roles: false,
            decorate_scrollables: true,
        }
    }
}
