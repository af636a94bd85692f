//! Brain port - 次の一手を提案する戦略層
//!
//! LLM でもルールベースでも構いません。カーネルは提案を実行・検証するだけです。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AtomicTask, DataMap};

/// Tool name a brain returns when it has nothing usable to propose.
pub const UNKNOWN_TOOL: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrainThought {
    pub reasoning: String,
    pub tool_name: String,
    pub tool_params: String,
}

impl BrainThought {
    pub fn new(
        reasoning: impl Into<String>,
        tool_name: impl Into<String>,
        tool_params: impl Into<String>,
    ) -> Self {
        Self {
            reasoning: reasoning.into(),
            tool_name: tool_name.into(),
            tool_params: tool_params.into(),
        }
    }

    pub fn unknown(reasoning: impl Into<String>) -> Self {
        Self::new(reasoning, UNKNOWN_TOOL, "")
    }
}

/// Everything the brain sees when asked for the next step.
#[derive(Debug, Clone, Copy)]
pub struct BrainInput<'a> {
    pub task: &'a AtomicTask,
    pub screen_context: &'a str,
    pub history: &'a [String],
    pub screenshot: Option<&'a str>,
    pub input_data: &'a DataMap,
}

#[async_trait]
pub trait Brain: Send + Sync {
    async fn propose_next_step(&self, input: BrainInput<'_>) -> BrainThought;
}
