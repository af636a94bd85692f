//! Task graph with an incrementally maintained ready set.
//!
//! Design:
//! - Forward edges: task -> edges leaving it (its dependents)
//! - Reverse edges: task -> predecessors it waits for, in insertion order
//! - Invariant: edges and reverse_edges must be kept in sync
//! - Invariant: a node is in `ready` iff it is not settled and every
//!   predecessor is completed, or failed behind an optional edge
//!
//! Only settling a node touches the ready set of other nodes, and only of
//! its direct dependents, so readiness never needs a full scan.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{
    AtomicTask, DataMap, DataRequirement, KernelError, TaskEdge, TaskId, TaskNode, TaskResult,
    TaskState,
};

#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: HashMap<TaskId, AtomicTask>,
    /// Insertion order; used to keep ready listings and merges deterministic.
    order: HashMap<TaskId, usize>,
    next_order: usize,

    edges: HashMap<TaskId, Vec<TaskEdge>>,
    reverse_edges: HashMap<TaskId, Vec<TaskId>>,

    ready: HashSet<TaskId>,
    completed: HashSet<TaskId>,
    failed: HashSet<TaskId>,
    results: HashMap<TaskId, TaskResult>,
}

/// Serializable view of the graph for reports and debugging.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<AtomicTask>,
    pub edges: Vec<TaskEdge>,
    pub states: HashMap<TaskId, TaskState>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a plan tree.
    pub fn from_plan(root: TaskNode) -> Self {
        let mut graph = Self::new();
        graph.add_composite_node(root);
        graph
    }

    pub fn add_node(&mut self, task: AtomicTask) {
        let id = task.id.clone();
        if !self.order.contains_key(&id) {
            self.order.insert(id.clone(), self.next_order);
            self.next_order += 1;
        }
        self.nodes.insert(id.clone(), task);
        self.refresh(&id);
    }

    /// Add `from -> to`. Edges may name nodes that are added later.
    pub fn add_edge(&mut self, from: TaskId, to: TaskId, data_flow: Option<DataRequirement>) {
        let preds = self.reverse_edges.entry(to.clone()).or_default();
        if !preds.contains(&from) {
            preds.push(from.clone());
        }
        self.edges.entry(from.clone()).or_default().push(TaskEdge {
            from,
            to: to.clone(),
            data_flow,
        });
        self.refresh(&to);
    }

    /// Expand a composite into atomic nodes plus edges.
    ///
    /// Parallel children get no edges among themselves. Sequential children
    /// are chained: every sink of child *i* points at every source of child *i+1*.
    pub fn add_composite_node(&mut self, node: TaskNode) {
        self.expand(node);
    }

    /// Returns (sources, sinks) of the expanded subgraph.
    fn expand(&mut self, node: TaskNode) -> (Vec<TaskId>, Vec<TaskId>) {
        match node {
            TaskNode::Atomic(task) => {
                let id = task.id.clone();
                self.add_node(task);
                (vec![id.clone()], vec![id])
            }
            TaskNode::Parallel(group) => {
                let mut sources = Vec::new();
                let mut sinks = Vec::new();
                for child in group.tasks {
                    let (child_sources, child_sinks) = self.expand(child);
                    sources.extend(child_sources);
                    sinks.extend(child_sinks);
                }
                (sources, sinks)
            }
            TaskNode::Sequential(group) => {
                let mut sources: Option<Vec<TaskId>> = None;
                let mut previous_sinks: Vec<TaskId> = Vec::new();
                for child in group.tasks {
                    let (child_sources, child_sinks) = self.expand(child);
                    for sink in &previous_sinks {
                        for source in &child_sources {
                            self.add_edge(sink.clone(), source.clone(), None);
                        }
                    }
                    if sources.is_none() {
                        sources = Some(child_sources);
                    }
                    previous_sinks = child_sinks;
                }
                (sources.unwrap_or_default(), previous_sinks)
            }
        }
    }

    /// Ready nodes, highest priority first, then insertion order.
    pub fn ready_tasks(&self) -> Vec<AtomicTask> {
        let mut ready: Vec<&AtomicTask> = self
            .ready
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect();
        ready.sort_by_key(|task| (std::cmp::Reverse(task.priority), self.order.get(&task.id).copied()));
        ready.into_iter().cloned().collect()
    }

    pub fn mark_completed(&mut self, id: &TaskId, result: TaskResult) -> Result<(), KernelError> {
        self.settle(id)?;
        debug!(task_id = %id, "task completed");
        self.completed.insert(id.clone());
        self.results.insert(id.clone(), result);
        self.refresh_dependents(id);
        Ok(())
    }

    pub fn mark_failed(&mut self, id: &TaskId, error: impl Into<String>) -> Result<(), KernelError> {
        self.settle(id)?;
        let error = error.into();
        warn!(task_id = %id, %error, "task failed");
        self.failed.insert(id.clone());
        self.results.insert(id.clone(), TaskResult::failure(error));
        self.refresh_dependents(id);
        Ok(())
    }

    fn settle(&mut self, id: &TaskId) -> Result<(), KernelError> {
        if !self.nodes.contains_key(id) {
            return Err(KernelError::UnknownTask(id.clone()));
        }
        if self.completed.contains(id) || self.failed.contains(id) {
            return Err(KernelError::TaskAlreadySettled(id.clone()));
        }
        self.ready.remove(id);
        Ok(())
    }

    /// Input data for `id`, gathered from its successful predecessors.
    ///
    /// A labeled edge contributes only its key (if the predecessor produced it).
    /// An unlabeled edge merges the predecessor's whole map; later predecessors,
    /// in edge insertion order, overwrite earlier ones.
    pub fn data_from_dependencies(&self, id: &TaskId) -> DataMap {
        let mut data = DataMap::new();
        for pred in self.predecessors(id) {
            let Some(result) = self.results.get(pred) else {
                continue;
            };
            if !result.success {
                continue;
            }
            match self.edge_label(pred, id) {
                Some(req) => {
                    if let Some(value) = result.data.get(&req.key) {
                        data.insert(req.key.clone(), value.clone());
                    }
                }
                None => {
                    for (key, value) in &result.data {
                        data.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        data
    }

    /// Every node is completed or failed.
    pub fn is_complete(&self) -> bool {
        self.nodes
            .keys()
            .all(|id| self.completed.contains(id) || self.failed.contains(id))
    }

    pub fn state(&self, id: &TaskId) -> Option<TaskState> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        Some(if self.completed.contains(id) {
            TaskState::Completed
        } else if self.failed.contains(id) {
            TaskState::Failed
        } else if self.ready.contains(id) {
            TaskState::Ready
        } else {
            TaskState::Pending
        })
    }

    pub fn get(&self, id: &TaskId) -> Option<&AtomicTask> {
        self.nodes.get(id)
    }

    pub fn result(&self, id: &TaskId) -> Option<&TaskResult> {
        self.results.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pending nodes that can never become ready because a predecessor
    /// failed behind a required edge, or the predecessor was never added.
    pub fn blocked_tasks(&self) -> Vec<(TaskId, TaskId)> {
        let mut blocked = Vec::new();
        for id in self.ids_in_order() {
            if self.state(id) != Some(TaskState::Pending) {
                continue;
            }
            for pred in self.predecessors(id) {
                let dead_end = !self.nodes.contains_key(pred)
                    || (self.failed.contains(pred) && !self.edge_is_optional(pred, id));
                if dead_end {
                    blocked.push((id.clone(), pred.clone()));
                    break;
                }
            }
        }
        blocked
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes: Vec<AtomicTask> = self
            .ids_in_order()
            .into_iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect();
        let edges = self.all_edges().into_iter().cloned().collect();
        let states = self
            .nodes
            .keys()
            .filter_map(|id| self.state(id).map(|s| (id.clone(), s)))
            .collect();
        GraphSnapshot {
            nodes,
            edges,
            states,
        }
    }

    /// Mermaid flowchart; settled nodes carry a marker.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        for id in self.ids_in_order() {
            let Some(task) = self.nodes.get(id) else {
                continue;
            };
            let marker = match self.state(id) {
                Some(TaskState::Completed) => " ✅",
                Some(TaskState::Failed) => " ❌",
                Some(TaskState::Ready) => " ⏳",
                _ => "",
            };
            let label = task.description.replace('"', "'");
            let _ = writeln!(out, "    {}[\"{}{}\"]", mermaid_id(id), label, marker);
        }
        for edge in self.all_edges() {
            match &edge.data_flow {
                Some(req) => {
                    let _ = writeln!(
                        out,
                        "    {} -->|{}| {}",
                        mermaid_id(&edge.from),
                        req.key,
                        mermaid_id(&edge.to)
                    );
                }
                None => {
                    let _ = writeln!(out, "    {} --> {}", mermaid_id(&edge.from), mermaid_id(&edge.to));
                }
            }
        }
        out
    }

    fn refresh(&mut self, id: &TaskId) {
        if !self.nodes.contains_key(id) || self.completed.contains(id) || self.failed.contains(id) {
            return;
        }
        if self.dependencies_satisfied(id) {
            self.ready.insert(id.clone());
        } else {
            self.ready.remove(id);
        }
    }

    fn refresh_dependents(&mut self, id: &TaskId) {
        let dependents: Vec<TaskId> = self
            .edges
            .get(id)
            .map(|edges| edges.iter().map(|e| e.to.clone()).collect())
            .unwrap_or_default();
        for dependent in dependents {
            self.refresh(&dependent);
        }
    }

    fn dependencies_satisfied(&self, id: &TaskId) -> bool {
        self.predecessors(id).iter().all(|pred| {
            self.completed.contains(*pred)
                || (self.failed.contains(*pred) && self.edge_is_optional(pred, id))
        })
    }

    fn predecessors(&self, id: &TaskId) -> Vec<&TaskId> {
        self.reverse_edges
            .get(id)
            .map(|preds| preds.iter().collect())
            .unwrap_or_default()
    }

    fn edges_between(&self, from: &TaskId, to: &TaskId) -> Vec<&TaskEdge> {
        self.edges
            .get(from)
            .map(|edges| edges.iter().filter(|edge| &edge.to == to).collect())
            .unwrap_or_default()
    }

    fn edge_is_optional(&self, from: &TaskId, to: &TaskId) -> bool {
        self.edges_between(from, to).into_iter().any(TaskEdge::is_optional)
    }

    fn edge_label(&self, from: &TaskId, to: &TaskId) -> Option<&DataRequirement> {
        self.edges_between(from, to)
            .into_iter()
            .find_map(|edge| edge.data_flow.as_ref())
    }

    fn ids_in_order(&self) -> Vec<&TaskId> {
        let mut ids: Vec<&TaskId> = self.order.keys().collect();
        ids.sort_by_key(|id| self.order.get(*id).copied());
        ids
    }

    fn all_edges(&self) -> Vec<&TaskEdge> {
        let mut edges = Vec::new();
        for id in self.ids_in_order() {
            if let Some(out) = self.edges.get(id) {
                edges.extend(out.iter());
            }
        }
        edges
    }
}

fn mermaid_id(id: &TaskId) -> String {
    id.as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentRole, DataType};
    use serde_json::json;

    fn task(id: &str) -> AtomicTask {
        AtomicTask::new(id, AgentRole::System, format!("do {id}"))
    }

    fn ids(tasks: &[AtomicTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    fn data(pairs: &[(&str, serde_json::Value)]) -> DataMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// a -> {b, c} -> d
    fn diamond() -> TaskGraph {
        let mut graph = TaskGraph::new();
        for id in ["a", "b", "c", "d"] {
            graph.add_node(task(id));
        }
        graph.add_edge("a".into(), "b".into(), None);
        graph.add_edge("a".into(), "c".into(), None);
        graph.add_edge("b".into(), "d".into(), None);
        graph.add_edge("c".into(), "d".into(), None);
        graph
    }

    #[test]
    fn new_node_without_edges_is_ready() {
        let mut graph = TaskGraph::new();
        graph.add_node(task("a"));
        assert_eq!(ids(&graph.ready_tasks()), vec!["a"]);
        assert_eq!(graph.state(&"a".into()), Some(TaskState::Ready));
    }

    #[test]
    fn edge_demotes_target_until_source_completes() {
        let mut graph = TaskGraph::new();
        graph.add_node(task("a"));
        graph.add_node(task("b"));
        graph.add_edge("a".into(), "b".into(), None);
        assert_eq!(ids(&graph.ready_tasks()), vec!["a"]);

        graph.mark_completed(&"a".into(), TaskResult::success(DataMap::new())).unwrap();
        assert_eq!(ids(&graph.ready_tasks()), vec!["b"]);
    }

    #[test]
    fn diamond_releases_join_only_after_both_branches() {
        let mut graph = diamond();
        assert_eq!(ids(&graph.ready_tasks()), vec!["a"]);

        graph.mark_completed(&"a".into(), TaskResult::success(DataMap::new())).unwrap();
        assert_eq!(ids(&graph.ready_tasks()), vec!["b", "c"]);

        graph.mark_completed(&"b".into(), TaskResult::success(DataMap::new())).unwrap();
        assert_eq!(ids(&graph.ready_tasks()), vec!["c"]);

        graph.mark_completed(&"c".into(), TaskResult::success(DataMap::new())).unwrap();
        assert_eq!(ids(&graph.ready_tasks()), vec!["d"]);
        assert!(!graph.is_complete());

        graph.mark_completed(&"d".into(), TaskResult::success(DataMap::new())).unwrap();
        assert!(graph.ready_tasks().is_empty());
        assert!(graph.is_complete());
    }

    #[test]
    fn ready_tasks_are_ordered_by_priority() {
        let mut graph = TaskGraph::new();
        graph.add_node(task("low").with_priority(1));
        graph.add_node(task("high").with_priority(9));
        graph.add_node(task("mid").with_priority(5));
        assert_eq!(ids(&graph.ready_tasks()), vec!["high", "mid", "low"]);
    }

    #[test]
    fn required_edge_failure_blocks_dependent() {
        let mut graph = TaskGraph::new();
        graph.add_node(task("a"));
        graph.add_node(task("b"));
        graph.add_edge("a".into(), "b".into(), None);

        graph.mark_failed(&"a".into(), "boom").unwrap();
        assert!(graph.ready_tasks().is_empty());
        assert_eq!(
            graph.blocked_tasks(),
            vec![(TaskId::from("b"), TaskId::from("a"))]
        );
    }

    #[test]
    fn optional_edge_failure_still_unblocks() {
        let mut graph = TaskGraph::new();
        graph.add_node(task("a"));
        graph.add_node(task("b"));
        graph.add_edge(
            "a".into(),
            "b".into(),
            Some(DataRequirement::new("summary", DataType::String).optional()),
        );

        graph.mark_failed(&"a".into(), "boom").unwrap();
        assert_eq!(ids(&graph.ready_tasks()), vec!["b"]);
        assert!(graph.blocked_tasks().is_empty());
        assert!(graph.data_from_dependencies(&"b".into()).is_empty());
    }

    #[test]
    fn settling_twice_is_rejected() {
        let mut graph = TaskGraph::new();
        graph.add_node(task("a"));
        graph.mark_completed(&"a".into(), TaskResult::success(DataMap::new())).unwrap();

        let again = graph.mark_failed(&"a".into(), "late");
        assert!(matches!(again, Err(KernelError::TaskAlreadySettled(_))));
        assert_eq!(graph.state(&"a".into()), Some(TaskState::Completed));
    }

    #[test]
    fn marking_unknown_task_is_an_error() {
        let mut graph = TaskGraph::new();
        let err = graph
            .mark_completed(&"ghost".into(), TaskResult::success(DataMap::new()))
            .unwrap_err();
        assert_eq!(err, KernelError::UnknownTask("ghost".into()));
    }

    #[test]
    fn empty_graph_is_complete() {
        assert!(TaskGraph::new().is_complete());
    }

    #[test]
    fn labeled_edge_routes_only_its_key() {
        let mut graph = TaskGraph::new();
        graph.add_node(task("a"));
        graph.add_node(task("b"));
        graph.add_edge(
            "a".into(),
            "b".into(),
            Some(DataRequirement::new("city", DataType::String)),
        );
        graph
            .mark_completed(
                &"a".into(),
                TaskResult::success(data(&[("city", json!("Tokyo")), ("noise", json!(1))])),
            )
            .unwrap();

        let input = graph.data_from_dependencies(&"b".into());
        assert_eq!(input, data(&[("city", json!("Tokyo"))]));
    }

    #[test]
    fn unlabeled_edges_merge_with_later_predecessor_winning() {
        let mut graph = TaskGraph::new();
        for id in ["first", "second", "join"] {
            graph.add_node(task(id));
        }
        graph.add_edge("first".into(), "join".into(), None);
        graph.add_edge("second".into(), "join".into(), None);

        graph
            .mark_completed(
                &"second".into(),
                TaskResult::success(data(&[("k", json!("from second"))])),
            )
            .unwrap();
        graph
            .mark_completed(
                &"first".into(),
                TaskResult::success(data(&[("k", json!("from first")), ("only", json!(true))])),
            )
            .unwrap();

        let input = graph.data_from_dependencies(&"join".into());
        assert_eq!(input.get("k"), Some(&json!("from second")));
        assert_eq!(input.get("only"), Some(&json!(true)));
    }

    #[test]
    fn sequential_of_parallel_chains_sinks_to_sources() {
        // seq[ par[a, b], c ] => a -> c, b -> c
        let plan = TaskNode::sequential(
            "root",
            vec![
                TaskNode::parallel("fan", vec![task("a").into(), task("b").into()]),
                task("c").into(),
            ],
        );
        let mut graph = TaskGraph::from_plan(plan);

        assert_eq!(graph.len(), 3);
        assert_eq!(ids(&graph.ready_tasks()), vec!["a", "b"]);

        graph.mark_completed(&"a".into(), TaskResult::success(DataMap::new())).unwrap();
        assert_eq!(ids(&graph.ready_tasks()), vec!["b"]);
        graph.mark_completed(&"b".into(), TaskResult::success(DataMap::new())).unwrap();
        assert_eq!(ids(&graph.ready_tasks()), vec!["c"]);
    }

    #[test]
    fn edge_to_later_node_is_honoured() {
        let mut graph = TaskGraph::new();
        graph.add_edge("a".into(), "b".into(), None);
        graph.add_node(task("b"));
        assert!(graph.ready_tasks().is_empty());

        graph.add_node(task("a"));
        assert_eq!(ids(&graph.ready_tasks()), vec!["a"]);
    }

    #[test]
    fn mermaid_marks_settled_nodes() {
        let mut graph = diamond();
        graph.mark_completed(&"a".into(), TaskResult::success(DataMap::new())).unwrap();
        let chart = graph.to_mermaid();

        assert!(chart.starts_with("graph TD\n"));
        assert!(chart.contains("a[\"do a ✅\"]"));
        assert!(chart.contains("b[\"do b ⏳\"]"));
        assert!(chart.contains("b --> d"));
    }

    #[test]
    fn snapshot_lists_nodes_in_insertion_order() {
        let snapshot = diamond().snapshot();
        let order: Vec<&str> = snapshot.nodes.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(snapshot.edges.len(), 4);
        assert_eq!(snapshot.states[&TaskId::from("a")], TaskState::Ready);
    }
}
