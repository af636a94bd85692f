//! Task model: what the planner hands to the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::ids::{AgentId, TaskId};

/// Free-form key/value data produced by tasks and routed along edges.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Specialization that executes an atomic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    #[serde(alias = "research")]
    Research,
    #[serde(alias = "social")]
    Social,
    #[serde(alias = "media")]
    Media,
    #[serde(alias = "system")]
    System,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Research => "RESEARCH",
            AgentRole::Social => "SOCIAL",
            AgentRole::Media => "MEDIA",
            AgentRole::System => "SYSTEM",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work executed by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicTask {
    pub id: TaskId,
    #[serde(default)]
    pub priority: i32,
    pub description: String,
    pub assigned_role: AgentRole,
    #[serde(default = "default_estimated_duration", with = "super::duration_ms")]
    pub estimated_duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Opaque hint from the planner (e.g. a pre-resolved tool call).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precomputed_intent: Option<serde_json::Value>,
}

fn default_estimated_duration() -> Duration {
    Duration::from_secs(5)
}

impl AtomicTask {
    pub fn new(id: impl Into<TaskId>, role: AgentRole, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            description: description.into(),
            assigned_role: role,
            estimated_duration: default_estimated_duration(),
            scheduled_start: None,
            precomputed_intent: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = duration;
        self
    }

    pub fn with_scheduled_start(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_start = Some(at);
        self
    }

    pub fn with_intent(mut self, intent: serde_json::Value) -> Self {
        self.precomputed_intent = Some(intent);
        self
    }

    /// Agent that executes this task: `"{ROLE}_{task_id}"`.
    pub fn agent_id(&self) -> AgentId {
        AgentId::new(format!("{}_{}", self.assigned_role.as_str(), self.id))
    }
}

/// Children of a composite node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: TaskId,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub description: String,
    pub tasks: Vec<TaskNode>,
}

/// Node of a plan: atomic work or a composite that expands into edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskNode {
    Atomic(AtomicTask),
    Parallel(TaskGroup),
    Sequential(TaskGroup),
}

impl TaskNode {
    pub fn id(&self) -> &TaskId {
        match self {
            TaskNode::Atomic(task) => &task.id,
            TaskNode::Parallel(group) | TaskNode::Sequential(group) => &group.id,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            TaskNode::Atomic(task) => task.priority,
            TaskNode::Parallel(group) | TaskNode::Sequential(group) => group.priority,
        }
    }

    pub fn parallel(id: impl Into<TaskId>, tasks: Vec<TaskNode>) -> Self {
        TaskNode::Parallel(TaskGroup {
            id: id.into(),
            priority: 0,
            description: String::new(),
            tasks,
        })
    }

    pub fn sequential(id: impl Into<TaskId>, tasks: Vec<TaskNode>) -> Self {
        TaskNode::Sequential(TaskGroup {
            id: id.into(),
            priority: 0,
            description: String::new(),
            tasks,
        })
    }
}

impl From<AtomicTask> for TaskNode {
    fn from(task: AtomicTask) -> Self {
        TaskNode::Atomic(task)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    List,
    Object,
}

/// Labels an edge: the single key the successor wants from the predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequirement {
    pub key: String,
    pub data_type: DataType,
    #[serde(default)]
    pub optional: bool,
}

impl DataRequirement {
    pub fn new(key: impl Into<String>, data_type: DataType) -> Self {
        Self {
            key: key.into(),
            data_type,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Directed dependency `from -> to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEdge {
    pub from: TaskId,
    pub to: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_flow: Option<DataRequirement>,
}

impl TaskEdge {
    pub fn is_optional(&self) -> bool {
        self.data_flow.as_ref().is_some_and(|req| req.optional)
    }
}

/// Final result of an atomic task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default)]
    pub data: DataMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn success(data: DataMap) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            data: DataMap::new(),
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_id_combines_role_and_task() {
        let task = AtomicTask::new("open_settings", AgentRole::System, "Open settings");
        assert_eq!(task.agent_id().as_str(), "SYSTEM_open_settings");
    }

    #[test]
    fn plan_json_uses_kind_tags() {
        let plan = json!({
            "kind": "sequential",
            "id": "root",
            "tasks": [
                { "kind": "atomic", "id": "a", "description": "Open settings", "assignedRole": "SYSTEM" },
                { "kind": "atomic", "id": "b", "description": "Search weather", "assignedRole": "research",
                  "priority": 3, "estimatedDuration": 2000 }
            ]
        });

        let node: TaskNode = serde_json::from_value(plan).unwrap();
        let TaskNode::Sequential(group) = node else {
            panic!("expected a sequential group");
        };
        assert_eq!(group.tasks.len(), 2);
        let TaskNode::Atomic(second) = &group.tasks[1] else {
            panic!("expected an atomic child");
        };
        assert_eq!(second.assigned_role, AgentRole::Research);
        assert_eq!(second.estimated_duration, Duration::from_secs(2));
        assert_eq!(second.priority, 3);
    }

    #[test]
    fn failure_keeps_error_text() {
        let result = TaskResult::failure("boom");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
