//! StateStore port - エージェントの行動履歴とチェックポイント
//!
//! - 行動履歴はループ検出（SafetyGovernor）の入力
//! - チェックポイントはプリエンプション時・自発的な譲渡時に書かれる

use async_trait::async_trait;

use crate::domain::{AgentAction, AgentId, AgentState, Resource};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Appends to the agent's rolling action window.
    async fn log_action(&self, agent: &AgentId, description: String);

    /// Oldest first.
    async fn action_history(&self, agent: &AgentId) -> Vec<AgentAction>;

    async fn save_state(&self, state: AgentState);

    async fn restore_state(&self, agent: &AgentId) -> Option<AgentState>;

    /// Snapshot the agent as it stands now and persist it.
    async fn checkpoint(&self, agent: &AgentId, resources_held: Vec<Resource>) -> AgentState {
        let mut state = self
            .restore_state(agent)
            .await
            .unwrap_or_else(|| AgentState::new(agent.clone()));
        state.resources_held = resources_held;
        state.action_history = self.action_history(agent).await;
        self.save_state(state.clone()).await;
        state
    }
}
