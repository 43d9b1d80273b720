use std::collections::HashMap;

use perception_core_types::BackendNodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `Accessibility.AXValue`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AxValue {
    #[serde(rename = "type", default)]
    pub value_type: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl AxValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value_type: "string".to_string(),
            value: Some(Value::String(value.into())),
        }
    }

    /// Value rendered as text; non-string JSON values use their JSON form.
    pub fn text(&self) -> Option<String> {
        match self.value.as_ref()? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AxProperty {
    pub name: String,
    #[serde(default)]
    pub value: Option<AxValue>,
}

/// One entry of the flat node list returned by `Accessibility.getFullAXTree`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAxNode {
    pub node_id: String,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub role: Option<AxValue>,
    #[serde(default)]
    pub name: Option<AxValue>,
    #[serde(default)]
    pub description: Option<AxValue>,
    #[serde(default)]
    pub value: Option<AxValue>,
    #[serde(default, rename = "backendDOMNodeId")]
    pub backend_dom_node_id: Option<BackendNodeId>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    #[serde(default)]
    pub properties: Vec<AxProperty>,
}

impl RawAxNode {
    pub fn role_text(&self) -> String {
        self.role
            .as_ref()
            .and_then(AxValue::text)
            .unwrap_or_default()
    }

    pub fn name_text(&self) -> Option<String> {
        self.name.as_ref().and_then(AxValue::text)
    }

    pub fn property_text(&self, name: &str) -> Option<String> {
        self.properties
            .iter()
            .find(|prop| prop.name == name)
            .and_then(|prop| prop.value.as_ref())
            .and_then(AxValue::text)
    }

    /// Chromium reports synthetic nodes with negative ids.
    pub fn is_synthetic(&self) -> bool {
        self.node_id
            .parse::<i64>()
            .map(|id| id < 0)
            .unwrap_or(false)
    }
}

/// A node of the pruned accessibility tree.
///
/// Nodes live in the [`AccessibilityTree`] arena; `children` holds arena indices, while
/// `parent_id`/`child_ids` mirror the pruned structure by identifier.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccessibilityNode {
    pub node_id: String,
    pub role: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub value: Option<String>,
    pub backend_dom_node_id: Option<BackendNodeId>,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    #[serde(skip)]
    pub(crate) children: Vec<usize>,
}

impl AccessibilityNode {
    pub fn has_name(&self) -> bool {
        self.name
            .as_deref()
            .map(|name| !name.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Arena-backed accessibility forest plus its indented text rendering.
#[derive(Clone, Debug, Default)]
pub struct AccessibilityTree {
    pub(crate) nodes: Vec<AccessibilityNode>,
    pub(crate) roots: Vec<usize>,
    pub(crate) index: HashMap<String, usize>,
    pub simplified: String,
    pub iframes: Vec<String>,
    pub id_to_url: HashMap<String, String>,
}

impl AccessibilityTree {
    /// "No observation possible".
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> impl Iterator<Item = &AccessibilityNode> {
        self.roots.iter().map(move |idx| &self.nodes[*idx])
    }

    pub fn children<'a>(
        &'a self,
        node: &'a AccessibilityNode,
    ) -> impl Iterator<Item = &'a AccessibilityNode> + 'a {
        node.children.iter().map(move |idx| &self.nodes[*idx])
    }

    pub fn get(&self, node_id: &str) -> Option<&AccessibilityNode> {
        self.index.get(node_id).map(|idx| &self.nodes[*idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccessibilityNode> {
        self.nodes.iter()
    }
}
