//! Status - 実行中ミッションの見える化
//!
//! グラフ図（Mermaid）・保持中のリース・直近のバスメッセージを 1 枚のレポートにまとめます。
//! 内部構造をポーリングせずに「いま何が詰まっているか」を説明するためのものです。

use std::fmt;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::coord::{MessageBus, ResourceManager, TaskGraph};
use crate::domain::{GovernorState, Message, ResourceLease};
use crate::safety::SafetyGovernor;

/// How many bus messages a report shows.
pub const RECENT_MESSAGES: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct CoordinationReport {
    pub governor: GovernorState,
    pub diagram: String,
    pub leases: Vec<ResourceLease>,
    pub recent_messages: Vec<Message>,
}

impl CoordinationReport {
    pub async fn collect(
        graph: &Mutex<TaskGraph>,
        resources: &ResourceManager,
        bus: &MessageBus,
        governor: &SafetyGovernor,
    ) -> Self {
        let diagram = graph.lock().await.to_mermaid();
        Self {
            governor: governor.state(),
            diagram,
            leases: resources.current_leases().await,
            recent_messages: bus.recent(RECENT_MESSAGES).await,
        }
    }
}

impl fmt::Display for CoordinationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Coordination Report ===")?;
        writeln!(f, "Governor: {}", self.governor)?;
        writeln!(f)?;

        writeln!(f, "Task Graph:")?;
        writeln!(f, "{}", self.diagram.trim_end())?;
        writeln!(f)?;

        writeln!(f, "Resources:")?;
        if self.leases.is_empty() {
            writeln!(f, "  (none held)")?;
        }
        for lease in &self.leases {
            writeln!(
                f,
                "  - {}: held by {} (priority {})",
                lease.resource, lease.owner, lease.priority
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Recent Messages:")?;
        for message in &self.recent_messages {
            writeln!(
                f,
                "  [{}] {} -> {}: {}",
                message.timestamp.format("%H:%M:%S%.3f"),
                message.from,
                message.to,
                message.kind()
            )?;
        }
        Ok(())
    }
}
