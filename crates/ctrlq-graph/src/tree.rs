//! Hierarchical task-tree projection.
//!
//! Deliberately a tree rather than a DAG: a downstream task reachable from
//! several roots appears once per causal chain so each chain reads whole.

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::model::{TaskGraph, TaskNode};

/// Expansion stops here; deeper chains get a marker node. Guards the
/// renderer against pathologically deep composite chains.
const MAX_TREE_DEPTH: usize = 64;

/// Per-node decorations selected by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeDetails {
    pub task_id: bool,
    pub last_status: bool,
    pub last_start: bool,
    pub last_stop: bool,
    pub next_start: bool,
    pub app_name: bool,
}

impl TreeDetails {
    pub fn all() -> Self {
        Self {
            task_id: true,
            last_status: true,
            last_start: true,
            last_stop: true,
            next_start: true,
            app_name: true,
        }
    }
}

/// One rendered tree node.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub label: String,
    pub task_id: Option<Uuid>,
    pub children: Vec<TreeNode>,
}

/// Build the whole-graph tree: a synthetic super-root collecting every task
/// with at least one schedule trigger, followed by the unscheduled roots.
pub fn build_task_tree(graph: &TaskGraph, details: &TreeDetails) -> Vec<TreeNode> {
    let mut top: Vec<TreeNode> = Vec::new();

    let mut scheduled: Vec<&TaskNode> = graph
        .tasks()
        .filter(|n| !n.schedule_triggers.is_empty())
        .collect();
    scheduled.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    if !scheduled.is_empty() {
        top.push(TreeNode {
            label: "Scheduled tasks".to_string(),
            task_id: None,
            children: scheduled
                .iter()
                .map(|n| expand_root(graph, n, details))
                .collect(),
        });
    }

    let mut roots: Vec<&TaskNode> = graph
        .tasks()
        .filter(|n| graph.edges_to(n.id).is_empty() && n.schedule_triggers.is_empty())
        .collect();
    roots.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    for root in roots {
        top.push(expand_root(graph, root, details));
    }

    top
}

fn expand_root(graph: &TaskGraph, node: &TaskNode, details: &TreeDetails) -> TreeNode {
    // The subtree walk enforces the same bound as the rendering below;
    // its depth cuts tell us up front that this chain will be truncated.
    if let Ok(reach) = graph.get_subtree(node.id, MAX_TREE_DEPTH) {
        if !reach.depth_cut_at.is_empty() {
            warn!(
                root = %node.name,
                max_depth = MAX_TREE_DEPTH,
                "task chain truncated at depth bound"
            );
        }
    }
    expand(graph, node, details, &mut Vec::new(), 0, MAX_TREE_DEPTH)
}

fn expand(
    graph: &TaskGraph,
    node: &TaskNode,
    details: &TreeDetails,
    path: &mut Vec<Uuid>,
    depth: usize,
    max_depth: usize,
) -> TreeNode {
    path.push(node.id);
    let mut children: Vec<TreeNode> = Vec::new();
    for edge in graph.edges_from(node.id) {
        if path.contains(&edge.downstream) {
            children.push(TreeNode {
                label: format!("<circular dependency back to {}>", label_of(graph, edge.downstream)),
                task_id: Some(edge.downstream),
                children: vec![],
            });
            continue;
        }
        if depth >= max_depth {
            children.push(TreeNode {
                label: "<max depth reached>".to_string(),
                task_id: None,
                children: vec![],
            });
            break;
        }
        if let Some(downstream) = graph.task(edge.downstream) {
            let mut child = expand(graph, downstream, details, path, depth + 1, max_depth);
            child.label = format!("{} [{}]", child.label, edge.state.as_str());
            children.push(child);
        }
    }
    path.pop();

    TreeNode {
        label: node_label(node, details),
        task_id: Some(node.id),
        children,
    }
}

fn label_of(graph: &TaskGraph, id: Uuid) -> String {
    graph
        .task(id)
        .map(|n| n.name.clone())
        .unwrap_or_else(|| id.to_string())
}

fn node_label(node: &TaskNode, details: &TreeDetails) -> String {
    let mut parts: Vec<String> = vec![node.name.clone()];
    if details.task_id {
        parts.push(node.id.to_string());
    }
    if details.app_name {
        if let Some(app) = &node.app_name {
            parts.push(app.clone());
        }
    }
    if details.last_status {
        if let Some(status) = &node.last_status {
            parts.push(status.clone());
        }
    }
    if details.last_start {
        if let Some(start) = node.last_start {
            parts.push(start.to_rfc3339());
        }
    }
    if details.last_stop {
        if let Some(stop) = node.last_stop {
            parts.push(stop.to_rfc3339());
        }
    }
    if details.next_start {
        if let Some(next) = node.next_start {
            parts.push(next.to_rfc3339());
        }
    }
    match parts.len() {
        1 => parts.remove(0),
        _ => format!("{} ({})", parts.remove(0), parts.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskNode;
    use ctrlq_core::{RuleState, TimeConstraint};

    fn node(name: &str) -> TaskNode {
        let mut node = TaskNode::tombstone(Uuid::new_v4());
        node.name = name.to_string();
        node.tombstone = false;
        node
    }

    #[test]
    fn test_scheduled_super_root() {
        let mut graph = TaskGraph::new();
        let mut scheduled = node("S");
        scheduled.schedule_triggers.push(crate::model::ScheduleTrigger {
            id: Uuid::new_v4(),
            name: "daily".to_string(),
            enabled: true,
            increment_option: None,
            increment_description: String::new(),
            daylight_saving: None,
            start: chrono::Utc::now(),
            expiration: chrono::Utc::now(),
            filter_description: String::new(),
            time_zone: "UTC".to_string(),
        });
        graph.add_task(scheduled);
        graph.add_task(node("M"));

        let tree = build_task_tree(&graph, &TreeDetails::default());
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].label, "Scheduled tasks");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[1].label, "M");
    }

    #[test]
    fn test_shared_downstream_appears_per_chain() {
        let mut graph = TaskGraph::new();
        let (a, b, shared) = (node("A"), node("B"), node("Shared"));
        let (ida, idb, ids) = (a.id, b.id, shared.id);
        for n in [a, b, shared] {
            graph.add_task(n);
        }
        for upstream in [ida, idb] {
            graph.add_composite_event(
                ids,
                Uuid::new_v4(),
                "dep",
                true,
                TimeConstraint::default(),
                &[(upstream, RuleState::TaskSuccessful)],
            );
        }

        let tree = build_task_tree(&graph, &TreeDetails::default());
        let shared_occurrences: usize = tree
            .iter()
            .map(|root| count_label(root, "Shared [TaskSuccessful]"))
            .sum();
        assert_eq!(shared_occurrences, 2);
    }

    #[test]
    fn test_cycle_renders_marker() {
        let mut graph = TaskGraph::new();
        let (mut a, b) = (node("A"), node("B"));
        // A mutual cycle leaves no natural roots; a schedule trigger on A
        // anchors the chain under the scheduled super-root.
        a.schedule_triggers.push(crate::model::ScheduleTrigger {
            id: Uuid::new_v4(),
            name: "daily".to_string(),
            enabled: true,
            increment_option: None,
            increment_description: String::new(),
            daylight_saving: None,
            start: chrono::Utc::now(),
            expiration: chrono::Utc::now(),
            filter_description: String::new(),
            time_zone: "UTC".to_string(),
        });
        let (ida, idb) = (a.id, b.id);
        graph.add_task(a);
        graph.add_task(b);
        graph.add_composite_event(
            idb,
            Uuid::new_v4(),
            "dep",
            true,
            TimeConstraint::default(),
            &[(ida, RuleState::TaskSuccessful)],
        );
        graph.add_composite_event(
            ida,
            Uuid::new_v4(),
            "dep",
            true,
            TimeConstraint::default(),
            &[(idb, RuleState::TaskSuccessful)],
        );

        let tree = build_task_tree(&graph, &TreeDetails::default());
        let marker_count: usize = tree
            .iter()
            .map(|root| count_label_prefix(root, "<circular dependency"))
            .sum();
        assert!(marker_count >= 1);
    }

    #[test]
    fn test_depth_bound_truncates_with_marker() {
        let mut graph = TaskGraph::new();
        let (a, b, c) = (node("A"), node("B"), node("C"));
        let (ida, idb, idc) = (a.id, b.id, c.id);
        for n in [a, b, c] {
            graph.add_task(n);
        }
        for (upstream, downstream) in [(ida, idb), (idb, idc)] {
            graph.add_composite_event(
                downstream,
                Uuid::new_v4(),
                "dep",
                true,
                TimeConstraint::default(),
                &[(upstream, RuleState::TaskSuccessful)],
            );
        }

        let root = graph.task(ida).unwrap();
        let tree = expand(&graph, root, &TreeDetails::default(), &mut Vec::new(), 0, 1);
        // A expands to B; B's chain is cut with a marker instead of C.
        assert_eq!(tree.children.len(), 1);
        let b_node = &tree.children[0];
        assert_eq!(b_node.children.len(), 1);
        assert_eq!(b_node.children[0].label, "<max depth reached>");
    }

    fn count_label(node: &TreeNode, label: &str) -> usize {
        let own = usize::from(node.label == label);
        own + node.children.iter().map(|c| count_label(c, label)).sum::<usize>()
    }

    fn count_label_prefix(node: &TreeNode, prefix: &str) -> usize {
        let own = usize::from(node.label.starts_with(prefix));
        own + node
            .children
            .iter()
            .map(|c| count_label_prefix(c, prefix))
            .sum::<usize>()
    }
}
