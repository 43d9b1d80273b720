use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{protocol, scripts, AxSnapshotConfig, PageSession};
use perception_core_types::BackendNodeId;
use serde_json::Value;
use tracing::debug;

use crate::errors::PerceiverError;
use crate::model::RawAxNode;

/// Browser-side primitives the structural perceiver needs.
#[async_trait]
pub trait AccessibilityPort: Send + Sync {
    async fn enable(&self) -> Result<(), PerceiverError>;
    async fn disable(&self) -> Result<(), PerceiverError>;
    async fn full_tree(&self) -> Result<Vec<RawAxNode>, PerceiverError>;
    async fn scrollable_backend_ids(&self) -> Result<HashSet<BackendNodeId>, PerceiverError>;
    /// Tag name of a live node; `None` when it no longer exists.
    async fn tag_name(&self, backend_node_id: BackendNodeId)
        -> Result<Option<String>, PerceiverError>;
    /// Absolute xpath of a live node; `None` when it no longer exists.
    async fn xpath_for_backend_node(
        &self,
        backend_node_id: BackendNodeId,
    ) -> Result<Option<String>, PerceiverError>;
    /// Backend id of the first node matching `xpath`.
    async fn backend_id_for_xpath(
        &self,
        xpath: &str,
    ) -> Result<Option<BackendNodeId>, PerceiverError>;
}

pub struct AdapterPort<S>
where
    S: PageSession + ?Sized,
{
    session: Arc<S>,
}

impl<S> AdapterPort<S>
where
    S: PageSession + ?Sized,
{
    pub fn new(session: Arc<S>) -> Self {
        Self { session }
    }

    async fn call_on_backend_node(
        &self,
        backend_node_id: BackendNodeId,
        declaration: &str,
    ) -> Result<Option<String>, PerceiverError> {
        let object = match protocol::resolve_backend_node(&*self.session, backend_node_id).await {
            Ok(object) => object,
            Err(err) if err.is_not_found() => {
                debug!(target: "perceiver-structural", backend_node_id, %err, "node gone");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let result = protocol::call_function_on(&*self.session, &object, declaration).await;
        protocol::release_object(&*self.session, &object).await;
        Ok(result?
            .as_str()
            .map(str::to_string)
            .filter(|text| !text.is_empty()))
    }
}

#[async_trait]
impl<S> AccessibilityPort for AdapterPort<S>
where
    S: PageSession + ?Sized + 'static,
{
    async fn enable(&self) -> Result<(), PerceiverError> {
        protocol::enable_domain(&*self.session, "Accessibility").await?;
        Ok(())
    }

    async fn disable(&self) -> Result<(), PerceiverError> {
        protocol::disable_domain(&*self.session, "Accessibility").await?;
        Ok(())
    }

    async fn full_tree(&self) -> Result<Vec<RawAxNode>, PerceiverError> {
        let snapshot =
            protocol::full_ax_tree(&*self.session, &AxSnapshotConfig::default()).await?;
        serde_json::from_value(Value::Array(snapshot.nodes))
            .map_err(|err| PerceiverError::MalformedPayload(err.to_string()))
    }

    async fn scrollable_backend_ids(&self) -> Result<HashSet<BackendNodeId>, PerceiverError> {
        let listed = self
            .session
            .evaluate(scripts::SCROLLABLE_XPATHS_EXPRESSION)
            .await?;
        let xpaths: Vec<String> = match listed {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .filter(|xpath| !xpath.is_empty())
                .collect(),
            other => {
                debug!(target: "perceiver-structural", result = %other, "scrollable xpaths not a list");
                Vec::new()
            }
        };

        let mut ids = HashSet::new();
        for xpath in xpaths {
            match self.backend_id_for_xpath(&xpath).await {
                Ok(Some(id)) => {
                    ids.insert(id);
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(target: "perceiver-structural", %xpath, ?err, "scrollable lookup failed");
                }
            }
        }
        Ok(ids)
    }

    async fn tag_name(
        &self,
        backend_node_id: BackendNodeId,
    ) -> Result<Option<String>, PerceiverError> {
        self.call_on_backend_node(backend_node_id, scripts::TAG_NAME_FUNCTION)
            .await
    }

    async fn xpath_for_backend_node(
        &self,
        backend_node_id: BackendNodeId,
    ) -> Result<Option<String>, PerceiverError> {
        self.call_on_backend_node(backend_node_id, scripts::NODE_PATH_FUNCTION)
            .await
    }

    async fn backend_id_for_xpath(
        &self,
        xpath: &str,
    ) -> Result<Option<BackendNodeId>, PerceiverError> {
        let expression = scripts::xpath_lookup_expression(xpath);
        let Some(object) = protocol::evaluate_handle(&*self.session, &expression).await? else {
            return Ok(None);
        };
        let described = protocol::describe_backend_id(&*self.session, &object).await;
        protocol::release_object(&*self.session, &object).await;
        Ok(described?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::{AdapterError, AdapterErrorKind, ScriptedSession};
    use serde_json::json;

    #[tokio::test]
    async fn xpath_for_missing_node_is_none() {
        let session = Arc::new(ScriptedSession::new());
        session.fail(
            "DOM.resolveNode",
            AdapterError::new(AdapterErrorKind::CdpIo).with_hint("No node with given id found"),
        );
        let port = AdapterPort::new(session.clone());
        assert_eq!(port.xpath_for_backend_node(42).await.unwrap(), None);
        assert_eq!(session.count("Runtime.callFunctionOn"), 0);
    }

    #[tokio::test]
    async fn xpath_for_live_node_runs_path_function() {
        let session = Arc::new(ScriptedSession::new());
        session.respond("DOM.resolveNode", json!({ "object": { "objectId": "o1" } }));
        session.respond(
            "Runtime.callFunctionOn",
            json!({ "result": { "type": "string", "value": "/html/body/button[2]" } }),
        );
        session.handle("Runtime.releaseObject", |_| Ok(json!({})));
        let port = AdapterPort::new(session.clone());
        assert_eq!(
            port.xpath_for_backend_node(42).await.unwrap().as_deref(),
            Some("/html/body/button[2]")
        );
        assert_eq!(session.count("Runtime.releaseObject"), 1);
    }

    #[tokio::test]
    async fn scrollables_resolve_through_describe_node() {
        let session = Arc::new(ScriptedSession::new());
        session.respond(
            "Runtime.evaluate",
            json!({ "result": { "type": "object", "value": ["/html/body/div", "/html/body/ul"] } }),
        );
        session.respond(
            "Runtime.evaluate",
            json!({ "result": { "type": "object", "objectId": "a" } }),
        );
        session.respond(
            "Runtime.evaluate",
            json!({ "result": { "type": "object", "subtype": "null", "value": null } }),
        );
        session.respond("DOM.describeNode", json!({ "node": { "backendNodeId": 11 } }));
        session.handle("Runtime.releaseObject", |_| Ok(json!({})));

        let port = AdapterPort::new(session);
        let ids = port.scrollable_backend_ids().await.unwrap();
        assert_eq!(ids, HashSet::from([11]));
    }

    #[tokio::test]
    async fn full_tree_parses_cdp_nodes() {
        let session = Arc::new(ScriptedSession::new());
        session.respond(
            "Accessibility.getFullAXTree",
            json!({ "nodes": [{
                "nodeId": "5",
                "role": { "type": "role", "value": "button" },
                "name": { "type": "computedString", "value": "Go" },
                "backendDOMNodeId": 77,
                "childIds": []
            }] }),
        );
        let port = AdapterPort::new(session);
        let nodes = port.full_tree().await.unwrap();
        assert_eq!(nodes[0].backend_dom_node_id, Some(77));
        assert_eq!(nodes[0].name_text().as_deref(), Some("Go"));
    }
}
