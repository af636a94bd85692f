//! Messages carried by the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, TaskId};
use super::resource::Resource;
use super::state::AgentState;
use super::task::TaskResult;

/// Envelope shared by every message kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: AgentId,
    pub to: AgentId,
    pub timestamp: DateTime<Utc>,
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    DataAvailable {
        key: String,
        data: serde_json::Value,
    },
    TaskComplete {
        task_id: TaskId,
        result: TaskResult,
    },
    ResourcePreempted {
        resource: Resource,
        reason: String,
    },
    ErrorOccurred {
        error: String,
        can_recover: bool,
    },
    StateCheckpoint {
        state: Box<AgentState>,
    },
    UserInterventionNeeded {
        reason: String,
    },
}

impl Message {
    pub fn new(from: AgentId, to: AgentId, body: MessageBody) -> Self {
        Self {
            from,
            to,
            timestamp: Utc::now(),
            body,
        }
    }

    /// Convenience for `DataAvailable` narration.
    pub fn data(from: AgentId, to: AgentId, key: &str, data: impl Into<serde_json::Value>) -> Self {
        Self::new(
            from,
            to,
            MessageBody::DataAvailable {
                key: key.to_string(),
                data: data.into(),
            },
        )
    }

    pub fn kind(&self) -> &'static str {
        match &self.body {
            MessageBody::DataAvailable { .. } => "DataAvailable",
            MessageBody::TaskComplete { .. } => "TaskComplete",
            MessageBody::ResourcePreempted { .. } => "ResourcePreempted",
            MessageBody::ErrorOccurred { .. } => "ErrorOccurred",
            MessageBody::StateCheckpoint { .. } => "StateCheckpoint",
            MessageBody::UserInterventionNeeded { .. } => "UserInterventionNeeded",
        }
    }
}
