//! Typed helpers over the handful of DevTools commands the perception pipeline relies on.
//!
//! All helpers are generic over `S: PageSession + ?Sized` so they work with concrete sessions,
//! `Arc`s and trait objects alike.

use serde_json::{json, Number, Value};
use tracing::debug;

use crate::commands::{AxSnapshotConfig, AxSnapshotResult, RemoteObjectId};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::session::PageSession;

/// Turn a `Runtime.evaluate` / `Runtime.callFunctionOn` response into its by-value result,
/// surfacing thrown exceptions as errors.
pub fn unwrap_evaluation(response: Value) -> Result<Value, AdapterError> {
    if let Some(details) = response.get("exceptionDetails") {
        let text = details
            .get("exception")
            .and_then(|exception| exception.get("description"))
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("uncaught exception")
            .to_string();
        return Err(AdapterError::new(AdapterErrorKind::EvaluationFailed)
            .with_hint(text)
            .with_data(details.clone()));
    }
    Ok(response
        .get("result")
        .and_then(|result| result.get("value"))
        .cloned()
        .unwrap_or(Value::Null))
}

pub async fn enable_domain<S>(session: &S, domain: &str) -> Result<(), AdapterError>
where
    S: PageSession + ?Sized,
{
    session
        .send_command(&format!("{domain}.enable"), json!({}))
        .await
        .map(|_| ())
}

pub async fn disable_domain<S>(session: &S, domain: &str) -> Result<(), AdapterError>
where
    S: PageSession + ?Sized,
{
    session
        .send_command(&format!("{domain}.disable"), json!({}))
        .await
        .map(|_| ())
}

/// `Accessibility.getFullAXTree`. The caller owns enabling/disabling the domain.
pub async fn full_ax_tree<S>(
    session: &S,
    config: &AxSnapshotConfig,
) -> Result<AxSnapshotResult, AdapterError>
where
    S: PageSession + ?Sized,
{
    let mut params = serde_json::Map::new();
    if let Some(frame_id) = &config.frame_id {
        params.insert("frameId".into(), Value::String(frame_id.clone()));
    }
    if let Some(max_depth) = config.max_depth {
        params.insert("depth".into(), Value::Number(Number::from(max_depth)));
    }

    let raw = session
        .send_command("Accessibility.getFullAXTree", Value::Object(params))
        .await?;

    let nodes = raw
        .get("nodes")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::UnexpectedResponse)
                .with_hint("Accessibility.getFullAXTree missing 'nodes' array")
        })?
        .to_vec();

    let tree_id = raw
        .get("treeId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Ok(AxSnapshotResult {
        nodes,
        tree_id,
        raw,
    })
}

/// `DOM.resolveNode` for a backend node id. A node that no longer exists yields
/// `TargetNotFound`.
pub async fn resolve_backend_node<S>(
    session: &S,
    backend_node_id: i64,
) -> Result<RemoteObjectId, AdapterError>
where
    S: PageSession + ?Sized,
{
    let response = session
        .send_command(
            "DOM.resolveNode",
            json!({ "backendNodeId": backend_node_id }),
        )
        .await
        .map_err(|err| {
            let hint = format!("backend node {backend_node_id}: {err}");
            if reports_missing_node(&err) {
                AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint(hint)
            } else {
                err.with_hint(hint)
            }
        })?;

    response
        .get("object")
        .and_then(|object| object.get("objectId"))
        .and_then(Value::as_str)
        .map(|id| RemoteObjectId(id.to_string()))
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("backend node {backend_node_id} has no remote object"))
        })
}

const MISSING_NODE_MESSAGE: &str = "No node with given id";

fn reports_missing_node(err: &AdapterError) -> bool {
    err.is_not_found()
        || err
            .hint
            .as_deref()
            .is_some_and(|hint| hint.contains(MISSING_NODE_MESSAGE))
}

/// `Runtime.callFunctionOn` with `this` bound to the remote object, returning by value.
pub async fn call_function_on<S>(
    session: &S,
    object: &RemoteObjectId,
    declaration: &str,
) -> Result<Value, AdapterError>
where
    S: PageSession + ?Sized,
{
    let response = session
        .send_command(
            "Runtime.callFunctionOn",
            json!({
                "objectId": object.as_str(),
                "functionDeclaration": declaration,
                "returnByValue": true,
            }),
        )
        .await?;
    unwrap_evaluation(response)
}

/// Evaluate an expression and keep the result as a remote handle. `null`/`undefined` results
/// come back as `None`.
pub async fn evaluate_handle<S>(
    session: &S,
    expression: &str,
) -> Result<Option<RemoteObjectId>, AdapterError>
where
    S: PageSession + ?Sized,
{
    let response = session
        .send_command(
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "returnByValue": false,
                "awaitPromise": false,
            }),
        )
        .await?;
    if response.get("exceptionDetails").is_some() {
        unwrap_evaluation(response)?;
        return Ok(None);
    }
    Ok(response
        .get("result")
        .and_then(|result| result.get("objectId"))
        .and_then(Value::as_str)
        .map(|id| RemoteObjectId(id.to_string())))
}

/// `DOM.describeNode` on a remote object, returning its backend node id.
pub async fn describe_backend_id<S>(
    session: &S,
    object: &RemoteObjectId,
) -> Result<Option<i64>, AdapterError>
where
    S: PageSession + ?Sized,
{
    let response = session
        .send_command("DOM.describeNode", json!({ "objectId": object.as_str() }))
        .await?;
    Ok(response
        .get("node")
        .and_then(|node| node.get("backendNodeId"))
        .and_then(Value::as_i64))
}

/// Best effort; a failed release only leaks until the next navigation.
pub async fn release_object<S>(session: &S, object: &RemoteObjectId)
where
    S: PageSession + ?Sized,
{
    if let Err(err) = session
        .send_command(
            "Runtime.releaseObject",
            json!({ "objectId": object.as_str() }),
        )
        .await
    {
        debug!(target: "cdp-adapter", object = object.as_str(), %err, "release object failed");
    }
}
