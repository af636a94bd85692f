//! State - エージェント・タスク・ガバナーの状態
//!
//! # TaskState の遷移
//! - pending: 依存待ち
//! - ready: 実行可能（ready set に入っている）
//! - completed: 成功で確定
//! - failed: 失敗で確定
//!
//! completed / failed は終端状態で、いったん確定すると戻りません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AgentId, TaskId};
use super::resource::Resource;
use super::task::DataMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Ready,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Mission-wide safety state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernorState {
    Running,
    Paused,
    EmergencyStopped,
}

impl fmt::Display for GovernorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GovernorState::Running => "running",
            GovernorState::Paused => "paused",
            GovernorState::EmergencyStopped => "emergency_stopped",
        };
        f.write_str(s)
    }
}

/// One executed action, as remembered for loop detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAction {
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl AgentAction {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSnapshot {
    pub taken_at: DateTime<Utc>,
    pub context: String,
}

/// Per-agent checkpoint written on preemption and voluntary yield.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: AgentId,
    pub current_task: Option<TaskId>,
    pub progress: f32,
    #[serde(default)]
    pub data_collected: DataMap,
    #[serde(default)]
    pub resources_held: Vec<Resource>,
    #[serde(default)]
    pub last_snapshot: Option<ScreenSnapshot>,
    #[serde(default)]
    pub action_history: Vec<AgentAction>,
}

impl AgentState {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            current_task: None,
            progress: 0.0,
            data_collected: DataMap::new(),
            resources_held: Vec::new(),
            last_snapshot: None,
            action_history: Vec::new(),
        }
    }
}
