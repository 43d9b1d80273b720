use async_trait::async_trait;
use perception_core_types::{BackendNodeId, SelectorMap};

use crate::errors::PerceiverError;
use crate::model::AccessibilityTree;
use crate::policy::TreeOptions;
use crate::resolver::CorrelationMap;

#[async_trait]
pub trait StructuralPerceiver: Send + Sync {
    /// Pruned accessibility tree of the page. Never fails: a query that errors or returns no
    /// nodes yields [`AccessibilityTree::empty`].
    async fn accessibility_tree(&self, options: &TreeOptions) -> AccessibilityTree;

    /// Re-resolve a backend node and synthesise its xpath from the live object.
    async fn xpath_for_backend_node(
        &self,
        backend_node_id: BackendNodeId,
    ) -> Result<Option<String>, PerceiverError>;

    async fn correlate(&self, selectors: &SelectorMap) -> CorrelationMap;
}
