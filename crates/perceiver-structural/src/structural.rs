use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use perception_core_types::{BackendNodeId, SelectorMap};
use tracing::{debug, warn};

use crate::api::StructuralPerceiver;
use crate::errors::PerceiverError;
use crate::events;
use crate::metrics;
use crate::model::{AccessibilityTree, RawAxNode};
use crate::policy::TreeOptions;
use crate::ports::AccessibilityPort;
use crate::resolver::{build_correlation_map, CorrelationMap};
use crate::tree;

pub struct StructuralPerceiverImpl<P>
where
    P: AccessibilityPort + ?Sized,
{
    port: Arc<P>,
}

impl<P> StructuralPerceiverImpl<P>
where
    P: AccessibilityPort + ?Sized,
{
    pub fn new(port: Arc<P>) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &Arc<P> {
        &self.port
    }

    async fn fetch_nodes(&self) -> Result<Vec<RawAxNode>, PerceiverError> {
        self.port.enable().await?;
        self.port.full_tree().await
    }

    async fn scrollables(&self) -> HashSet<BackendNodeId> {
        match self.port.scrollable_backend_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                debug!(target: "perceiver-structural", ?err, "scrollable lookup failed");
                HashSet::new()
            }
        }
    }

    async fn resolve_structural_roles(&self, tree: &mut AccessibilityTree) {
        let mut changed = false;
        for idx in 0..tree.nodes.len() {
            if !tree::is_structural(&tree.nodes[idx].role) {
                continue;
            }
            let Some(backend_id) = tree.nodes[idx].backend_dom_node_id else {
                continue;
            };
            metrics::record_role_lookup();
            match self.port.tag_name(backend_id).await {
                Ok(Some(tag)) => {
                    tree.nodes[idx].role = tag;
                    changed = true;
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(target: "perceiver-structural", backend_id, ?err, "tag name lookup failed");
                }
            }
        }
        if changed {
            tree.simplified = tree::render_simplified(tree);
        }
    }
}

#[async_trait]
impl<P> StructuralPerceiver for StructuralPerceiverImpl<P>
where
    P: AccessibilityPort + ?Sized,
{
    async fn accessibility_tree(&self, options: &TreeOptions) -> AccessibilityTree {
        let started = Instant::now();
        let scrollable = if options.decorate_scrollables {
            self.scrollables().await
        } else {
            HashSet::new()
        };

        let fetched = self.fetch_nodes().await;
        if let Err(err) = self.port.disable().await {
            debug!(target: "perceiver-structural", ?err, "accessibility disable failed");
        }

        let mut nodes = match fetched {
            Ok(nodes) if !nodes.is_empty() => nodes,
            Ok(_) => {
                warn!(target: "perceiver-structural", "accessibility query returned no nodes");
                events::emit_tree(0, 0, started.elapsed());
                return AccessibilityTree::empty();
            }
            Err(err) => {
                warn!(target: "perceiver-structural", ?err, "accessibility query failed");
                events::emit_tree(0, 0, started.elapsed());
                return AccessibilityTree::empty();
            }
        };

        tree::decorate_scrollables(&mut nodes, &scrollable);
        let mut built = tree::build_tree(&nodes);
        if options.resolve_structural_roles {
            self.resolve_structural_roles(&mut built).await;
        }

        events::emit_tree(built.len(), built.iframes.len(), started.elapsed());
        built
    }

    async fn xpath_for_backend_node(
        &self,
        backend_node_id: BackendNodeId,
    ) -> Result<Option<String>, PerceiverError> {
        self.port.xpath_for_backend_node(backend_node_id).await
    }

    async fn correlate(&self, selectors: &SelectorMap) -> CorrelationMap {
        build_correlation_map(&*self.port, selectors).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::AdapterPort;
    use cdp_adapter::{AdapterError, AdapterErrorKind, ScriptedSession};
    use serde_json::json;

    fn scripted() -> Arc<ScriptedSession> {
        let session = Arc::new(ScriptedSession::new());
        session.handle("Accessibility.enable", |_| Ok(json!({})));
        session.handle("Accessibility.disable", |_| Ok(json!({})));
        session.handle("Runtime.evaluate", |_| {
            Ok(json!({ "result": { "type": "object", "value": [] } }))
        });
        session
    }

    fn perceiver(session: Arc<ScriptedSession>) -> StructuralPerceiverImpl<AdapterPort<ScriptedSession>> {
        StructuralPerceiverImpl::new(Arc::new(AdapterPort::new(session)))
    }

    #[tokio::test]
    async fn failed_query_yields_empty_tree_and_disables_domain() {
        let session = scripted();
        session.fail(
            "Accessibility.getFullAXTree",
            AdapterError::new(AdapterErrorKind::CdpIo).with_hint("socket closed"),
        );
        let tree = perceiver(session.clone())
            .accessibility_tree(&TreeOptions::default())
            .await;
        assert!(tree.is_empty());
        assert!(tree.simplified.is_empty());
        assert_eq!(session.count("Accessibility.disable"), 1);
    }

    #[tokio::test]
    async fn empty_node_list_yields_empty_tree() {
        let session = scripted();
        session.respond("Accessibility.getFullAXTree", json!({ "nodes": [] }));
        let tree = perceiver(session.clone())
            .accessibility_tree(&TreeOptions::default())
            .await;
        assert!(tree.is_empty());
        assert_eq!(session.count("Accessibility.disable"), 1);
    }

    #[tokio::test]
    async fn structural_roles_resolve_to_tag_names() {
        let session = scripted();
        session.respond(
            "Accessibility.getFullAXTree",
            json!({ "nodes": [
                { "nodeId": "1", "role": { "type": "role", "value": "RootWebArea" },
                  "name": { "type": "computedString", "value": "Shop" }, "childIds": ["2"] },
                { "nodeId": "2", "role": { "type": "role", "value": "generic" }, "parentId": "1",
                  "backendDOMNodeId": 40, "childIds": ["3", "4"] },
                { "nodeId": "3", "role": { "type": "role", "value": "link" }, "parentId": "2",
                  "name": { "type": "computedString", "value": "Cart" }, "childIds": [] },
                { "nodeId": "4", "role": { "type": "role", "value": "link" }, "parentId": "2",
                  "name": { "type": "computedString", "value": "Account" }, "childIds": [] }
            ] }),
        );
        session.respond("DOM.resolveNode", json!({ "object": { "objectId": "n40" } }));
        session.respond(
            "Runtime.callFunctionOn",
            json!({ "result": { "type": "string", "value": "nav" } }),
        );
        session.handle("Runtime.releaseObject", |_| Ok(json!({})));

        let options = TreeOptions {
            resolve_structural_roles: true,
            decorate_scrollables: false,
        };
        let tree = perceiver(session).accessibility_tree(&options).await;
        assert_eq!(
            tree.simplified,
            "[1] RootWebArea: Shop\n  [2] nav\n    [3] link: Cart\n    [4] link: Account"
        );
    }
}
