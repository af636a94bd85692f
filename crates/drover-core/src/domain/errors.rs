//! Errors - エラー型と分類
//!
//! `KernelError` はカーネル全体で共通のエラー型です。
//! `kind()` で運用上の分類を返し、スケジューラはそれを見て
//! タスクを失敗扱いにするか ready のまま戻すかを決めます。

use super::ids::{AgentId, TaskId};
use super::resource::Resource;

/// ErrorKind は実行エラーの分類
///
/// - Transient: タスクのせいではない（ready に戻して後で再実行）
/// - Permanent: タスクの失敗として確定させる
/// - Mission: ミッション全体を止める / 一時停止する
/// - Usage: 呼び出し側の誤り（未知の ID、設定値の不正）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Mission,
    Usage,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("timed out acquiring {resource} for {requester}")]
    ResourceAcquisitionTimeout {
        resource: Resource,
        requester: AgentId,
    },

    #[error("task {task} was cancelled: {resource} was preempted")]
    PreemptionCancelled { task: TaskId, resource: Resource },

    #[error("tool '{tool}' failed: {output}")]
    ToolExecutionFailed { tool: String, output: String },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("task {task} failed after {attempts} attempts")]
    MaxRetriesExceeded { task: TaskId, attempts: u32 },

    #[error("repeating action loop detected for {agent}")]
    LoopDetected { agent: AgentId },

    #[error("circuit breaker open after {0} consecutive failures")]
    CircuitOpen(u32),

    #[error("hard step limit of {0} reached")]
    HardStepLimitReached(u32),

    #[error("emergency stop")]
    EmergencyStop,

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("task {0} already has a final result")]
    TaskAlreadySettled(TaskId),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl KernelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::ResourceAcquisitionTimeout { .. }
            | KernelError::PreemptionCancelled { .. } => ErrorKind::Transient,
            KernelError::ToolExecutionFailed { .. }
            | KernelError::UnknownTool(_)
            | KernelError::MaxRetriesExceeded { .. } => ErrorKind::Permanent,
            KernelError::LoopDetected { .. }
            | KernelError::CircuitOpen(_)
            | KernelError::HardStepLimitReached(_)
            | KernelError::EmergencyStop => ErrorKind::Mission,
            KernelError::UnknownTask(_)
            | KernelError::TaskAlreadySettled(_)
            | KernelError::Config(_) => ErrorKind::Usage,
        }
    }

    /// The task can run again later; reported on the bus as `can_recover`.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// The error settles the task as failed in the graph.
    pub fn fails_task(&self) -> bool {
        self.kind() == ErrorKind::Permanent
    }

    pub fn is_mission_fatal(&self) -> bool {
        self.kind() == ErrorKind::Mission
    }
}
