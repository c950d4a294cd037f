//! The task graph model.

use chrono::{DateTime, Utc};
use ctrlq_core::{
    CustomPropertyValue, DaylightSaving, IncrementOption, RuleState, TaskFilter, TaskKind,
    TimeConstraint,
};
use ctrlq_qrs::types::{
    self, QrsApp, QrsCompositeEvent, QrsExternalProgramTask, QrsReloadTask, QrsSchemaEvent,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use crate::error::{GraphError, GraphResult};

/// Schedule-trigger meta-node attached to a task.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleTrigger {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub increment_option: Option<IncrementOption>,
    pub increment_description: String,
    pub daylight_saving: Option<DaylightSaving>,
    pub start: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub filter_description: String,
    pub time_zone: String,
}

/// Composite-event meta-node attached to its downstream task.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeTrigger {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub time_constraint: TimeConstraint,
    pub rule_count: usize,
}

/// A task node. Tombstone nodes stand in for rule endpoints whose GUID the
/// Repository population did not contain.
#[derive(Debug, Clone, Serialize)]
pub struct TaskNode {
    pub id: Uuid,
    pub name: String,
    pub kind: TaskKind,
    pub enabled: bool,
    pub session_timeout_minutes: u32,
    pub max_retries: u32,
    pub app_id: Option<Uuid>,
    pub app_name: Option<String>,
    pub app_tags: Vec<String>,
    pub partial_reload: Option<bool>,
    pub manually_triggered: Option<bool>,
    pub path: Option<String>,
    pub parameters: Option<String>,
    pub tags: Vec<String>,
    pub custom_properties: Vec<CustomPropertyValue>,
    pub schedule_triggers: Vec<ScheduleTrigger>,
    pub composite_triggers: Vec<CompositeTrigger>,
    pub last_status: Option<String>,
    pub last_start: Option<DateTime<Utc>>,
    pub last_stop: Option<DateTime<Utc>>,
    pub next_start: Option<DateTime<Utc>>,
    pub tombstone: bool,
}

impl TaskNode {
    /// A placeholder node for an unresolved rule endpoint.
    pub fn tombstone(id: Uuid) -> Self {
        Self {
            id,
            name: format!("<unresolved {}>", id),
            kind: TaskKind::Reload,
            enabled: false,
            session_timeout_minutes: 0,
            max_retries: 0,
            app_id: None,
            app_name: None,
            app_tags: vec![],
            partial_reload: None,
            manually_triggered: None,
            path: None,
            parameters: None,
            tags: vec![],
            custom_properties: vec![],
            schedule_triggers: vec![],
            composite_triggers: vec![],
            last_status: None,
            last_start: None,
            last_stop: None,
            next_start: None,
            tombstone: true,
        }
    }
}

/// An edge derived from one composite rule: upstream task fires, downstream
/// task's event consumes the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompositeEdge {
    pub upstream: Uuid,
    pub downstream: Uuid,
    pub event_id: Uuid,
    pub state: RuleState,
}

/// Downstream reach of one root, plus the nodes where cycles forced the
/// walk to stop.
#[derive(Debug, Clone, Default)]
pub struct SubtreeResult {
    pub tasks: Vec<Uuid>,
    pub cycle_cut_at: Vec<Uuid>,
    pub depth_cut_at: Vec<Uuid>,
}

/// Directed multigraph of tasks. Not safe for concurrent mutation; build it
/// on one writer and query it freely afterwards.
#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: HashMap<Uuid, TaskNode>,
    edges: Vec<CompositeEdge>,
    name_index: HashMap<String, Vec<Uuid>>,
    tag_index: HashMap<String, Vec<Uuid>>,
    app_index: HashMap<Uuid, Vec<Uuid>>,
    /// Edge positions by upstream task.
    out_index: HashMap<Uuid, Vec<usize>>,
    /// Edge positions by downstream task.
    in_index: HashMap<Uuid, Vec<usize>>,
    /// Rule endpoints that had to be tombstoned.
    unresolved: Vec<Uuid>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the graph from full Repository populations. Events are
    /// joined to their owning tasks client-side; rules referencing tasks
    /// outside the population get tombstone endpoints.
    pub fn from_repository(
        reload_tasks: Vec<QrsReloadTask>,
        external_tasks: Vec<QrsExternalProgramTask>,
        apps: &[QrsApp],
        schema_events: Vec<QrsSchemaEvent>,
        composite_events: Vec<QrsCompositeEvent>,
    ) -> Self {
        let mut graph = Self::new();
        let app_tags: HashMap<Uuid, Vec<String>> = apps
            .iter()
            .map(|a| (a.id, a.tags.iter().map(|t| t.name.clone()).collect()))
            .collect();

        for task in reload_tasks {
            let (last_status, last_start, last_stop, next_start) =
                operational_fields(task.operational.as_ref());
            graph.add_task(TaskNode {
                id: task.id,
                name: task.name,
                kind: TaskKind::Reload,
                enabled: task.enabled,
                session_timeout_minutes: task.task_session_timeout,
                max_retries: task.max_retries,
                app_id: Some(task.app.id),
                app_name: Some(task.app.name),
                app_tags: app_tags.get(&task.app.id).cloned().unwrap_or_default(),
                partial_reload: Some(task.is_partial_reload),
                manually_triggered: Some(task.is_manually_triggered),
                path: None,
                parameters: None,
                tags: task.tags.into_iter().map(|t| t.name).collect(),
                custom_properties: task
                    .custom_properties
                    .into_iter()
                    .map(|cp| CustomPropertyValue {
                        name: cp.definition.name,
                        value: cp.value,
                    })
                    .collect(),
                schedule_triggers: vec![],
                composite_triggers: vec![],
                last_status,
                last_start,
                last_stop,
                next_start,
                tombstone: false,
            });
        }

        for task in external_tasks {
            let (last_status, last_start, last_stop, next_start) =
                operational_fields(task.operational.as_ref());
            graph.add_task(TaskNode {
                id: task.id,
                name: task.name,
                kind: TaskKind::ExternalProgram,
                enabled: task.enabled,
                session_timeout_minutes: task.task_session_timeout,
                max_retries: task.max_retries,
                app_id: None,
                app_name: None,
                app_tags: vec![],
                partial_reload: None,
                manually_triggered: None,
                path: Some(task.path),
                parameters: Some(task.parameters),
                tags: task.tags.into_iter().map(|t| t.name).collect(),
                custom_properties: task
                    .custom_properties
                    .into_iter()
                    .map(|cp| CustomPropertyValue {
                        name: cp.definition.name,
                        value: cp.value,
                    })
                    .collect(),
                schedule_triggers: vec![],
                composite_triggers: vec![],
                last_status,
                last_start,
                last_stop,
                next_start,
                tombstone: false,
            });
        }

        for event in schema_events {
            let Some(owner) = event.owner_task_id() else {
                warn!(event = %event.id, "schema event without owning task, skipped");
                continue;
            };
            let trigger = ScheduleTrigger {
                id: event.id,
                name: event.name,
                enabled: event.enabled,
                increment_option: types::increment_option_from_wire(event.increment_option),
                increment_description: event.increment_description,
                daylight_saving: types::daylight_saving_from_wire(event.daylight_saving_time),
                start: event.start_date,
                expiration: event.expiration_date,
                filter_description: event.schema_filter_description.join(" "),
                time_zone: event.time_zone,
            };
            match graph.nodes.get_mut(&owner) {
                Some(node) => node.schedule_triggers.push(trigger),
                None => warn!(event = %trigger.id, task = %owner, "schema event owner not in population"),
            }
        }

        for event in composite_events {
            let Some(downstream) = event.owner_task_id() else {
                warn!(event = %event.id, "composite event without owning task, skipped");
                continue;
            };
            let rules: Vec<(Uuid, RuleState)> = event
                .composite_rules
                .iter()
                .filter_map(|rule| {
                    let state = types::rule_state_from_wire(rule.rule_state)?;
                    Some((rule.upstream_task_id()?, state))
                })
                .collect();
            graph.add_composite_event(
                downstream,
                event.id,
                &event.name,
                event.enabled,
                TimeConstraint {
                    seconds: event.time_constraint.seconds,
                    minutes: event.time_constraint.minutes,
                    hours: event.time_constraint.hours,
                    days: event.time_constraint.days,
                },
                &rules,
            );
        }

        graph
    }

    /// Insert a task node, replacing any node (tombstone included) with the
    /// same GUID.
    pub fn add_task(&mut self, node: TaskNode) {
        self.name_index
            .entry(node.name.clone())
            .or_default()
            .push(node.id);
        for tag in &node.tags {
            self.tag_index.entry(tag.clone()).or_default().push(node.id);
        }
        if let Some(app_id) = node.app_id {
            self.app_index.entry(app_id).or_default().push(node.id);
        }
        self.nodes.insert(node.id, node);
    }

    /// Attach a composite event to its downstream task and derive one edge
    /// per rule. Unresolved endpoints become tombstones.
    pub fn add_composite_event(
        &mut self,
        downstream: Uuid,
        event_id: Uuid,
        event_name: &str,
        enabled: bool,
        time_constraint: TimeConstraint,
        rules: &[(Uuid, RuleState)],
    ) {
        if !self.nodes.contains_key(&downstream) {
            self.unresolved.push(downstream);
            self.nodes.insert(downstream, TaskNode::tombstone(downstream));
        }
        if let Some(node) = self.nodes.get_mut(&downstream) {
            node.composite_triggers.push(CompositeTrigger {
                id: event_id,
                name: event_name.to_string(),
                enabled,
                time_constraint,
                rule_count: rules.len(),
            });
        }

        for (upstream, state) in rules {
            if !self.nodes.contains_key(upstream) {
                self.unresolved.push(*upstream);
                self.nodes.insert(*upstream, TaskNode::tombstone(*upstream));
            }
            let position = self.edges.len();
            self.edges.push(CompositeEdge {
                upstream: *upstream,
                downstream,
                event_id,
                state: *state,
            });
            self.out_index.entry(*upstream).or_default().push(position);
            self.in_index.entry(downstream).or_default().push(position);
        }
    }

    pub fn contains_task(&self, id: Uuid) -> bool {
        self.nodes.get(&id).map(|n| !n.tombstone).unwrap_or(false)
    }

    pub fn task(&self, id: Uuid) -> Option<&TaskNode> {
        self.nodes.get(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }

    pub fn task_count(&self) -> usize {
        self.nodes.values().filter(|n| !n.tombstone).count()
    }

    /// Iterator over `(upstream, downstream, event, state)` tuples.
    pub fn edges(&self) -> impl Iterator<Item = &CompositeEdge> {
        self.edges.iter()
    }

    /// GUIDs that had to be tombstoned during construction. Reported, never
    /// silently dropped.
    pub fn unresolved_refs(&self) -> &[Uuid] {
        &self.unresolved
    }

    /// Tasks matching any filter term (union). An empty filter matches all.
    pub fn select_tasks(&self, filter: &TaskFilter) -> Vec<&TaskNode> {
        let mut selected: HashSet<Uuid> = HashSet::new();
        if filter.is_empty() {
            selected.extend(self.nodes.values().filter(|n| !n.tombstone).map(|n| n.id));
        } else {
            for id in &filter.task_ids {
                if self.contains_task(*id) {
                    selected.insert(*id);
                }
            }
            for tag in &filter.task_tags {
                if let Some(ids) = self.tag_index.get(tag) {
                    selected.extend(ids.iter().copied());
                }
            }
            for app_id in &filter.app_ids {
                if let Some(ids) = self.app_index.get(app_id) {
                    selected.extend(ids.iter().copied());
                }
            }
            for app_tag in &filter.app_tags {
                selected.extend(
                    self.nodes
                        .values()
                        .filter(|n| n.app_tags.iter().any(|t| t == app_tag))
                        .map(|n| n.id),
                );
            }
        }
        let mut tasks: Vec<&TaskNode> = selected
            .into_iter()
            .filter_map(|id| self.nodes.get(&id))
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Tasks by exact name; names are not unique.
    pub fn tasks_by_name(&self, name: &str) -> Vec<&TaskNode> {
        self.name_index
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// Walk the composite edges upstream from every task matching the
    /// filter until fixed point, then keep the tasks with no incoming
    /// composite edge. De-duplicated by GUID.
    pub fn get_root_nodes_from_filter(&self, filter: &TaskFilter) -> Vec<&TaskNode> {
        let mut frontier: Vec<Uuid> = self.select_tasks(filter).iter().map(|n| n.id).collect();
        let mut seen: HashSet<Uuid> = frontier.iter().copied().collect();

        while let Some(id) = frontier.pop() {
            for position in self.in_index.get(&id).into_iter().flatten() {
                let upstream = self.edges[*position].upstream;
                if seen.insert(upstream) {
                    frontier.push(upstream);
                }
            }
        }

        let mut roots: Vec<&TaskNode> = seen
            .into_iter()
            .filter(|id| self.in_index.get(id).map_or(true, |e| e.is_empty()))
            .filter_map(|id| self.nodes.get(&id))
            .collect();
        roots.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        roots
    }

    /// Downstream tasks reachable from `root`, depth-bounded. A repeated
    /// node on the current path stops the walk there and is recorded as a
    /// cycle cut.
    pub fn get_subtree(&self, root: Uuid, max_depth: usize) -> GraphResult<SubtreeResult> {
        if !self.nodes.contains_key(&root) {
            return Err(GraphError::UnknownTask(root));
        }
        let mut result = SubtreeResult::default();
        let mut on_path: HashSet<Uuid> = HashSet::new();
        let mut collected: HashSet<Uuid> = HashSet::new();
        self.walk_subtree(root, 0, max_depth, &mut on_path, &mut collected, &mut result);
        Ok(result)
    }

    fn walk_subtree(
        &self,
        node: Uuid,
        depth: usize,
        max_depth: usize,
        on_path: &mut HashSet<Uuid>,
        collected: &mut HashSet<Uuid>,
        result: &mut SubtreeResult,
    ) {
        if collected.insert(node) {
            result.tasks.push(node);
        }
        if depth >= max_depth {
            result.depth_cut_at.push(node);
            return;
        }
        on_path.insert(node);
        for position in self.out_index.get(&node).into_iter().flatten() {
            let downstream = self.edges[*position].downstream;
            if on_path.contains(&downstream) {
                result.cycle_cut_at.push(downstream);
                continue;
            }
            self.walk_subtree(downstream, depth + 1, max_depth, on_path, collected, result);
        }
        on_path.remove(&node);
    }

    /// Outgoing edges of one task.
    pub fn edges_from(&self, upstream: Uuid) -> Vec<&CompositeEdge> {
        self.out_index
            .get(&upstream)
            .map(|positions| positions.iter().map(|p| &self.edges[*p]).collect())
            .unwrap_or_default()
    }

    /// Incoming edges of one task.
    pub fn edges_to(&self, downstream: Uuid) -> Vec<&CompositeEdge> {
        self.in_index
            .get(&downstream)
            .map(|positions| positions.iter().map(|p| &self.edges[*p]).collect())
            .unwrap_or_default()
    }
}

fn operational_fields(
    operational: Option<&ctrlq_qrs::types::QrsTaskOperational>,
) -> (
    Option<String>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
) {
    let Some(operational) = operational else {
        return (None, None, None, None);
    };
    let (status, start, stop) = operational
        .last_execution_result
        .as_ref()
        .map(|r| {
            (
                Some(types::execution_status_name(r.status).to_string()),
                r.start_time,
                r.stop_time,
            )
        })
        .unwrap_or((None, None, None));
    (status, start, stop, operational.next_execution)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn node(name: &str) -> TaskNode {
        let mut node = TaskNode::tombstone(Uuid::new_v4());
        node.name = name.to_string();
        node.tombstone = false;
        node.enabled = true;
        node
    }

    /// A → B → C chain plus an isolated task D.
    pub(crate) fn chain_graph() -> (TaskGraph, Uuid, Uuid, Uuid, Uuid) {
        let mut graph = TaskGraph::new();
        let (a, b, c, d) = (node("A"), node("B"), node("C"), node("D"));
        let (ida, idb, idc, idd) = (a.id, b.id, c.id, d.id);
        for n in [a, b, c, d] {
            graph.add_task(n);
        }
        graph.add_composite_event(
            idb,
            Uuid::new_v4(),
            "after A",
            true,
            TimeConstraint::default(),
            &[(ida, RuleState::TaskSuccessful)],
        );
        graph.add_composite_event(
            idc,
            Uuid::new_v4(),
            "after B",
            true,
            TimeConstraint::default(),
            &[(idb, RuleState::TaskSuccessful)],
        );
        (graph, ida, idb, idc, idd)
    }

    #[test]
    fn test_edges_derived_from_rules() {
        let (graph, a, b, _, _) = chain_graph();
        assert_eq!(graph.edges().count(), 2);
        let edge = graph.edges_from(a)[0];
        assert_eq!(edge.downstream, b);
        assert_eq!(edge.state, RuleState::TaskSuccessful);
    }

    #[test]
    fn test_roots_from_empty_filter() {
        let (graph, a, _, _, d) = chain_graph();
        let roots: Vec<Uuid> = graph
            .get_root_nodes_from_filter(&TaskFilter::default())
            .iter()
            .map(|n| n.id)
            .collect();
        assert!(roots.contains(&a));
        assert!(roots.contains(&d));
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn test_roots_walk_upstream_from_filter_match() {
        let (graph, a, _, c, _) = chain_graph();
        // Filter selects only the leaf; the walk must climb to the root.
        let filter = TaskFilter {
            task_ids: vec![c],
            ..Default::default()
        };
        let roots: Vec<Uuid> = graph
            .get_root_nodes_from_filter(&filter)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(roots, vec![a]);
    }

    #[test]
    fn test_subtree_reaches_leaf() {
        let (graph, a, b, c, _) = chain_graph();
        let subtree = graph.get_subtree(a, 99).unwrap();
        assert_eq!(subtree.tasks, vec![a, b, c]);
        assert!(subtree.cycle_cut_at.is_empty());
    }

    #[test]
    fn test_subtree_depth_bound() {
        let (graph, a, _, _, _) = chain_graph();
        let subtree = graph.get_subtree(a, 1).unwrap();
        assert_eq!(subtree.tasks.len(), 2);
        assert!(!subtree.depth_cut_at.is_empty());
    }

    #[test]
    fn test_subtree_unknown_root() {
        let (graph, _, _, _, _) = chain_graph();
        assert!(matches!(
            graph.get_subtree(Uuid::new_v4(), 3),
            Err(GraphError::UnknownTask(_))
        ));
    }

    #[test]
    fn test_cycle_cut_marker() {
        let (mut graph, a, b, _, _) = chain_graph();
        // Close the loop: A depends on B.
        graph.add_composite_event(
            a,
            Uuid::new_v4(),
            "after B",
            true,
            TimeConstraint::default(),
            &[(b, RuleState::TaskSuccessful)],
        );
        let subtree = graph.get_subtree(a, 99).unwrap();
        assert!(subtree.cycle_cut_at.contains(&a));
    }

    #[test]
    fn test_unresolved_rule_endpoint_gets_tombstone() {
        let mut graph = TaskGraph::new();
        let downstream = node("D");
        let downstream_id = downstream.id;
        graph.add_task(downstream);
        let ghost = Uuid::new_v4();
        graph.add_composite_event(
            downstream_id,
            Uuid::new_v4(),
            "after ghost",
            true,
            TimeConstraint::default(),
            &[(ghost, RuleState::TaskFail)],
        );
        assert_eq!(graph.unresolved_refs(), &[ghost]);
        assert!(graph.task(ghost).unwrap().tombstone);
        assert!(!graph.contains_task(ghost));
        // The edge is still present, never silently dropped.
        assert_eq!(graph.edges().count(), 1);
    }

    #[test]
    fn test_select_tasks_union_semantics() {
        let (mut graph, a, _, _, _) = chain_graph();
        let mut tagged = node("E");
        tagged.tags = vec!["finance".to_string()];
        let tagged_id = tagged.id;
        graph.add_task(tagged);

        let filter = TaskFilter {
            task_ids: vec![a],
            task_tags: vec!["finance".to_string()],
            ..Default::default()
        };
        let ids: Vec<Uuid> = graph.select_tasks(&filter).iter().map(|n| n.id).collect();
        assert!(ids.contains(&a));
        assert!(ids.contains(&tagged_id));
        assert_eq!(ids.len(), 2);
    }
}
