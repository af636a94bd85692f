//! InMemoryStateStore - 開発用の状態ストア
//!
//! # 実装詳細
//! - エージェントごとに直近 `window` 件の行動を VecDeque で保持（古いものから捨てる）
//! - チェックポイントは最新の 1 件だけを保持

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AgentAction, AgentId, AgentState};
use crate::ports::StateStore;

pub struct InMemoryStateStore {
    window: usize,
    actions: Mutex<HashMap<AgentId, VecDeque<AgentAction>>>,
    checkpoints: Mutex<HashMap<AgentId, AgentState>>,
}

impl InMemoryStateStore {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            actions: Mutex::new(HashMap::new()),
            checkpoints: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn log_action(&self, agent: &AgentId, description: String) {
        let mut actions = self.actions.lock().await;
        let log = actions.entry(agent.clone()).or_default();
        if log.len() == self.window {
            log.pop_front();
        }
        log.push_back(AgentAction::new(description));
    }

    async fn action_history(&self, agent: &AgentId) -> Vec<AgentAction> {
        self.actions
            .lock()
            .await
            .get(agent)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn save_state(&self, state: AgentState) {
        self.checkpoints
            .lock()
            .await
            .insert(state.agent_id.clone(), state);
    }

    async fn restore_state(&self, agent: &AgentId) -> Option<AgentState> {
        self.checkpoints.lock().await.get(agent).cloned()
    }
}
