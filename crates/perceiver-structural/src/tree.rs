//! Flat `getFullAXTree` node list -> pruned accessibility forest.
//!
//! The forest is an arena: nodes are linked by index, parents are found through `parentId`, and
//! the structural-pruning pass is a post-order rewrite where `None` means "drop this subtree
//! root".

use std::collections::{HashMap, HashSet};

use perception_core_types::BackendNodeId;

use crate::model::{AccessibilityNode, AccessibilityTree, AxValue, RawAxNode};

/// Roles that carry no semantics of their own.
pub const STRUCTURAL_ROLES: &[&str] = &["generic", "none", ""];

const STATIC_TEXT_ROLE: &str = "StaticText";
const IFRAME_ROLE: &str = "Iframe";

pub fn is_structural(role: &str) -> bool {
    STRUCTURAL_ROLES.contains(&role)
}

/// Rewrite the role of every scrollable container so it survives pruning and tells the planner
/// the region can scroll.
pub fn decorate_scrollables(nodes: &mut [RawAxNode], scrollable: &HashSet<BackendNodeId>) {
    if scrollable.is_empty() {
        return;
    }
    for node in nodes.iter_mut() {
        let Some(backend_id) = node.backend_dom_node_id else {
            continue;
        };
        if !scrollable.contains(&backend_id) {
            continue;
        }
        let current = node.role_text();
        let decorated = if is_structural(&current) {
            "scrollable".to_string()
        } else {
            format!("scrollable, {current}")
        };
        node.role = Some(AxValue::string(decorated));
    }
}

pub fn build_tree(raw: &[RawAxNode]) -> AccessibilityTree {
    let mut id_to_url = HashMap::new();
    let mut arena: Vec<AccessibilityNode> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for node in raw.iter().filter(|node| !node.is_synthetic()) {
        if let Some(url) = node.property_text("url") {
            let url = url.trim();
            if !url.is_empty() {
                id_to_url.insert(node.node_id.clone(), url.to_string());
            }
        }

        let name = node.name_text();
        let named = name
            .as_deref()
            .map(|name| !name.trim().is_empty())
            .unwrap_or(false);
        if !named && node.child_ids.is_empty() {
            continue;
        }
        if positions.contains_key(&node.node_id) {
            continue;
        }

        positions.insert(node.node_id.clone(), arena.len());
        arena.push(AccessibilityNode {
            node_id: node.node_id.clone(),
            role: node.role_text(),
            name,
            description: node.description.as_ref().and_then(AxValue::text),
            value: node.value.as_ref().and_then(AxValue::text),
            backend_dom_node_id: node.backend_dom_node_id,
            parent_id: node.parent_id.clone(),
            child_ids: node.child_ids.clone(),
            children: Vec::new(),
        });
    }

    let mut roots = Vec::new();
    for idx in 0..arena.len() {
        let parent = arena[idx]
            .parent_id
            .as_ref()
            .and_then(|parent_id| positions.get(parent_id).copied())
            .filter(|parent| *parent != idx);
        match parent {
            Some(parent) => arena[parent].children.push(idx),
            None => roots.push(idx),
        }
    }

    // Children follow the parent's declared `childIds` order; undeclared ones keep input order.
    for idx in 0..arena.len() {
        if arena[idx].children.len() < 2 {
            continue;
        }
        let declared: HashMap<String, usize> = arena[idx]
            .child_ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.clone(), pos))
            .collect();
        let mut children = std::mem::take(&mut arena[idx].children);
        children.sort_by_key(|child| {
            declared
                .get(arena[*child].node_id.as_str())
                .copied()
                .unwrap_or(usize::MAX)
        });
        arena[idx].children = children;
    }

    let cleaned_roots: Vec<usize> = roots
        .into_iter()
        .filter_map(|root| clean_node(&mut arena, root))
        .collect();

    let mut tree = compact(arena, &cleaned_roots);
    tree.id_to_url = id_to_url;
    tree.iframes = tree
        .nodes
        .iter()
        .filter(|node| node.role == IFRAME_ROLE)
        .map(|node| node.node_id.clone())
        .collect();
    tree.simplified = render_simplified(&tree);
    tree
}

/// Post-order cleanup of the subtree at `idx`. Returns the arena index that replaces it.
fn clean_node(arena: &mut Vec<AccessibilityNode>, idx: usize) -> Option<usize> {
    let children = std::mem::take(&mut arena[idx].children);
    let mut cleaned: Vec<usize> = children
        .into_iter()
        .filter_map(|child| clean_node(arena, child))
        .collect();

    cleaned = drop_redundant_static_text(arena, idx, cleaned);

    if is_structural(&arena[idx].role) {
        match cleaned.len() {
            0 => return None,
            1 => return cleaned.pop(),
            _ => {}
        }
    }

    arena[idx].children = cleaned;
    Some(idx)
}

/// A named node whose StaticText children only repeat its own name loses those children.
fn drop_redundant_static_text(
    arena: &[AccessibilityNode],
    parent: usize,
    children: Vec<usize>,
) -> Vec<usize> {
    let Some(target) = arena[parent]
        .name
        .as_deref()
        .map(normalize_whitespace)
        .filter(|name| !name.is_empty())
    else {
        return children;
    };

    let texts: Vec<String> = children
        .iter()
        .map(|child| &arena[*child])
        .filter(|child| child.role == STATIC_TEXT_ROLE)
        .filter_map(|child| child.name.as_deref().map(normalize_whitespace))
        .filter(|text| !text.is_empty())
        .collect();
    if texts.is_empty() {
        return children;
    }
    if texts.concat() != target && texts.join(" ") != target {
        return children;
    }

    children
        .into_iter()
        .filter(|child| {
            let node = &arena[*child];
            node.role != STATIC_TEXT_ROLE || !node.has_name()
        })
        .collect()
}

fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Copy the reachable nodes into a fresh pre-order arena and rewrite id links to match.
fn compact(mut arena: Vec<AccessibilityNode>, roots: &[usize]) -> AccessibilityTree {
    let mut tree = AccessibilityTree::default();
    let mut stack: Vec<(usize, Option<usize>)> =
        roots.iter().rev().map(|root| (*root, None)).collect();

    while let Some((old, parent)) = stack.pop() {
        let mut node = std::mem::take(&mut arena[old]);
        let old_children = std::mem::take(&mut node.children);
        let new_idx = tree.nodes.len();

        node.parent_id = parent.map(|p| tree.nodes[p].node_id.clone());
        node.child_ids = old_children
            .iter()
            .map(|child| arena[*child].node_id.clone())
            .collect();

        tree.index.insert(node.node_id.clone(), new_idx);
        tree.nodes.push(node);
        match parent {
            Some(p) => tree.nodes[p].children.push(new_idx),
            None => tree.roots.push(new_idx),
        }

        for child in old_children.into_iter().rev() {
            stack.push((child, Some(new_idx)));
        }
    }
    tree
}

/// `[id] role: name` per node, two spaces of indentation per depth.
pub fn render_simplified(tree: &AccessibilityTree) -> String {
    let mut lines = Vec::with_capacity(tree.nodes.len());
    let mut stack: Vec<(usize, usize)> = tree.roots.iter().rev().map(|idx| (*idx, 0)).collect();
    while let Some((idx, depth)) = stack.pop() {
        let node = &tree.nodes[idx];
        lines.push(format_line(node, depth));
        for child in node.children.iter().rev() {
            stack.push((*child, depth + 1));
        }
    }
    lines.join("\n")
}

fn format_line(node: &AccessibilityNode, depth: usize) -> String {
    let indent = "  ".repeat(depth);
    match node.name.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => format!("{indent}[{}] {}: {}", node.node_id, node.role, name),
        None => format!("{indent}[{}] {}", node.node_id, node.role),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> Vec<RawAxNode> {
        serde_json::from_value(value).unwrap()
    }

    fn node(id: &str, role: &str, name: Option<&str>, parent: Option<&str>, children: &[&str]) -> serde_json::Value {
        let mut value = json!({
            "nodeId": id,
            "role": { "type": "role", "value": role },
            "childIds": children,
        });
        if let Some(name) = name {
            value["name"] = json!({ "type": "computedString", "value": name });
        }
        if let Some(parent) = parent {
            value["parentId"] = json!(parent);
        }
        value
    }

    fn assert_pruned(tree: &AccessibilityTree) {
        for node in tree.iter() {
            if is_structural(&node.role) {
                assert!(
                    node.children.len() > 1,
                    "structural node {} kept with {} children",
                    node.node_id,
                    node.children.len()
                );
            }
        }
    }

    #[test]
    fn structural_chain_collapses_to_leaf() {
        let nodes = raw(json!([
            node("1", "RootWebArea", Some("Page"), None, &["2"]),
            node("2", "generic", None, Some("1"), &["3"]),
            node("3", "none", None, Some("2"), &["4"]),
            node("4", "button", Some("Submit"), Some("3"), &[]),
        ]));
        let tree = build_tree(&nodes);
        assert_pruned(&tree);
        assert_eq!(tree.simplified, "[1] RootWebArea: Page\n  [4] button: Submit");
        let button = tree.get("4").unwrap();
        assert_eq!(button.parent_id.as_deref(), Some("1"));
        assert_eq!(tree.get("1").unwrap().child_ids, vec!["4".to_string()]);
        assert!(tree.get("2").is_none());
    }

    #[test]
    fn structural_group_with_several_children_survives() {
        let nodes = raw(json!([
            node("1", "RootWebArea", Some("Page"), None, &["2"]),
            node("2", "generic", None, Some("1"), &["4", "3"]),
            node("3", "link", Some("About"), Some("2"), &[]),
            node("4", "link", Some("Home"), Some("2"), &[]),
        ]));
        let tree = build_tree(&nodes);
        assert_pruned(&tree);
        assert_eq!(
            tree.simplified,
            "[1] RootWebArea: Page\n  [2] generic\n    [4] link: Home\n    [3] link: About"
        );
    }

    #[test]
    fn empty_structural_subtree_disappears() {
        let nodes = raw(json!([
            node("1", "RootWebArea", Some("Page"), None, &["2", "5"]),
            node("2", "generic", None, Some("1"), &["3"]),
            node("3", "none", None, Some("2"), &["9"]),
            node("5", "heading", Some("Title"), Some("1"), &[]),
        ]));
        let tree = build_tree(&nodes);
        assert_pruned(&tree);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.simplified, "[1] RootWebArea: Page\n  [5] heading: Title");
    }

    #[test]
    fn nameless_leaves_and_synthetic_nodes_are_filtered() {
        let nodes = raw(json!([
            node("1", "RootWebArea", Some("Page"), None, &["2", "3", "-4"]),
            node("2", "image", None, Some("1"), &[]),
            node("3", "link", Some("Docs"), Some("1"), &[]),
            node("-4", "link", Some("Ghost"), Some("1"), &[]),
        ]));
        let tree = build_tree(&nodes);
        assert!(tree.get("2").is_none());
        assert!(tree.get("-4").is_none());
        assert_eq!(tree.simplified, "[1] RootWebArea: Page\n  [3] link: Docs");
    }

    #[test]
    fn redundant_static_text_is_dropped() {
        let nodes = raw(json!([
            node("1", "button", Some("Sign  in"), None, &["2", "3"]),
            node("2", "StaticText", Some("Sign"), Some("1"), &[]),
            node("3", "StaticText", Some("in"), Some("1"), &[]),
        ]));
        let tree = build_tree(&nodes);
        assert_eq!(tree.simplified, "[1] button: Sign  in");
        assert!(tree.get("1").unwrap().child_ids.is_empty());
    }

    #[test]
    fn children_follow_declared_order() {
        let nodes = raw(json!([
            node("1", "RootWebArea", Some("Page"), None, &["4", "2", "3"]),
            node("2", "link", Some("Second"), Some("1"), &[]),
            node("3", "link", Some("Third"), Some("1"), &[]),
            node("4", "link", Some("First"), Some("1"), &[]),
        ]));
        let tree = build_tree(&nodes);
        assert_eq!(
            tree.simplified,
            "[1] RootWebArea: Page\n  [4] link: First\n  [2] link: Second\n  [3] link: Third"
        );
    }

    #[test]
    fn orphans_and_cycles() {
        let nodes = raw(json!([
            node("1", "RootWebArea", Some("Page"), None, &[]),
            node("7", "dialog", Some("Cookies"), Some("99"), &[]),
            node("8", "group", Some("a"), Some("9"), &["9"]),
            node("9", "group", Some("b"), Some("8"), &["8"]),
        ]));
        let tree = build_tree(&nodes);
        let roots: Vec<&str> = tree.roots().map(|node| node.node_id.as_str()).collect();
        assert_eq!(roots, vec!["1", "7"]);
        assert!(tree.get("8").is_none());
    }

    #[test]
    fn decorates_scrollables_and_collects_frames() {
        let mut nodes = raw(json!([
            node("1", "RootWebArea", Some("Page"), None, &["2", "3", "4"]),
            node("2", "generic", None, Some("1"), &["5"]),
            node("3", "list", Some("Results"), Some("1"), &[]),
            node("4", "Iframe", Some("ads"), Some("1"), &[]),
            node("5", "link", Some("Next"), Some("2"), &[]),
        ]));
        nodes[1].backend_dom_node_id = Some(20);
        nodes[2].backend_dom_node_id = Some(30);
        nodes[3].properties = vec![crate::model::AxProperty {
            name: "url".into(),
            value: Some(AxValue::string(" https://ads.example/ ")),
        }];

        decorate_scrollables(&mut nodes, &HashSet::from([20, 30]));
        let tree = build_tree(&nodes);
        assert_eq!(tree.get("2").unwrap().role, "scrollable");
        assert_eq!(tree.get("3").unwrap().role, "scrollable, list");
        assert_eq!(tree.iframes, vec!["4".to_string()]);
        assert_eq!(
            tree.id_to_url.get("4").map(String::as_str),
            Some("https://ads.example/")
        );
    }

    #[test]
    fn empty_input_builds_empty_tree() {
        let tree = build_tree(&[]);
        assert!(tree.is_empty());
        assert!(tree.simplified.is_empty());
    }

    #[test]
    fn pruning_holds_for_generated_forests() {
        // Deterministic pseudo-random forests mixing structural and semantic roles.
        let roles = ["generic", "none", "button", "link", "generic", "StaticText"];
        let mut seed: u64 = 0x2545_f491;
        for _ in 0..50 {
            let mut nodes = Vec::new();
            let count = 30;
            for id in 1..=count {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let role = roles[(seed >> 33) as usize % roles.len()];
                let parent = if id == 1 { None } else { Some(((seed >> 40) as usize % (id - 1)) + 1) };
                let named = (seed >> 20) & 1 == 1;
                nodes.push((id, role, named, parent));
            }
            let values: Vec<serde_json::Value> = nodes
                .iter()
                .map(|(id, role, named, parent)| {
                    let children: Vec<String> = nodes
                        .iter()
                        .filter(|(_, _, _, p)| *p == Some(*id))
                        .map(|(child, _, _, _)| child.to_string())
                        .collect();
                    let children: Vec<&str> = children.iter().map(String::as_str).collect();
                    let parent = parent.map(|p| p.to_string());
                    node(
                        &id.to_string(),
                        role,
                        named.then_some("label"),
                        parent.as_deref(),
                        &children,
                    )
                })
                .collect();
            let tree = build_tree(&raw(serde_json::Value::Array(values)));
            assert_pruned(&tree);
        }
    }
}
