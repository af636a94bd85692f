//! RetryEngine - sense → act → verify → pivot の試行ループ
//!
//! # 1 回の試行
//! 1. **sense**: 画面テキスト（とスクリーンショット）を取得。前回の検証で得た画面があればそれを再利用
//! 2. **act**: Brain に次の一手を聞き、Tool を実行。行動は履歴に必ず記録
//! 3. **verify**: 画面を一定間隔でポーリングし、TaskPolicy の期待を満たすか確認
//! 4. **pivot**: 失敗したら方針表から次の回復戦略を選び、副作用（スクロール等）を実行
//!
//! 試行回数の上限に達したら `MaxRetriesExceeded`。
//! リソースの取得・解放は呼び出し側（GraphScheduler）の責務です。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::config::KernelConfig;
use crate::coord::MessageBus;
use crate::domain::{
    AgentId, AgentState, AtomicTask, DataMap, GovernorState, KernelError, Message,
    RecoveryStrategy, ResourceLease, ScreenSnapshot, TaskResult,
};
use crate::ports::tool::names;
use crate::ports::{Brain, BrainInput, Clock, StateStore, TaskPolicy};
use crate::safety::SafetyGovernor;
use crate::typed::ToolRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub verify_timeout: Duration,
    pub verify_interval: Duration,
    pub scroll_settle: Duration,
    pub wait_delay: Duration,
    pub back_settle: Duration,
}

impl From<&KernelConfig> for RetrySettings {
    fn from(config: &KernelConfig) -> Self {
        Self {
            max_attempts: config.max_attempts_per_task,
            verify_timeout: config.verify_timeout,
            verify_interval: config.verify_interval,
            scroll_settle: config.scroll_settle,
            wait_delay: config.wait_delay,
            back_settle: config.back_settle,
        }
    }
}

/// What the agent currently knows about the screen.
#[derive(Debug, Clone, Default)]
struct Sensed {
    context: String,
    screenshot: Option<String>,
}

pub struct RetryEngine {
    tools: Arc<ToolRegistry>,
    brain: Arc<dyn Brain>,
    bus: Arc<MessageBus>,
    store: Arc<dyn StateStore>,
    governor: Arc<SafetyGovernor>,
    clock: Arc<dyn Clock>,
    settings: RetrySettings,
}

impl RetryEngine {
    pub fn new(
        tools: Arc<ToolRegistry>,
        brain: Arc<dyn Brain>,
        bus: Arc<MessageBus>,
        store: Arc<dyn StateStore>,
        governor: Arc<SafetyGovernor>,
        clock: Arc<dyn Clock>,
        settings: RetrySettings,
    ) -> Self {
        Self {
            tools,
            brain,
            bus,
            store,
            governor,
            clock,
            settings,
        }
    }

    /// Drive `task` to a verified success or give up after the attempt limit.
    ///
    /// `leases` are only recorded in checkpoints; the caller owns them.
    pub async fn run(
        &self,
        task: &AtomicTask,
        agent: &AgentId,
        leases: &[ResourceLease],
        policy: &dyn TaskPolicy,
        input: &DataMap,
    ) -> Result<TaskResult, KernelError> {
        let max_attempts = self.settings.max_attempts;
        let mut strategy = RecoveryStrategy::None;
        let mut cached: Option<Sensed> = None;

        for attempt in 0..max_attempts {
            if self.governor.state() == GovernorState::EmergencyStopped {
                return Err(KernelError::EmergencyStop);
            }

            let sensed = match cached.take() {
                Some(sensed) => sensed,
                None => self.sense().await,
            };
            self.save_progress(task, agent, leases, attempt, input, &sensed).await;

            let acted = self.act(task, agent, strategy, &sensed, input).await;
            let (verified, fresh) = self.verify(task, agent, policy).await;
            if let Some(context) = fresh {
                cached = Some(Sensed {
                    context,
                    screenshot: None,
                });
            }

            match acted {
                Ok(output) if verified => {
                    info!(task_id = %task.id, attempt = attempt + 1, "task verified");
                    self.narrate(agent, "success", "Action Successful and Verified.").await;
                    let mut data = DataMap::new();
                    data.insert("output".to_string(), json!(output));
                    return Ok(TaskResult::success(data));
                }
                Ok(_) => debug!(task_id = %task.id, attempt = attempt + 1, "action not verified"),
                Err(err) => debug!(task_id = %task.id, attempt = attempt + 1, error = %err, "action failed"),
            }

            if attempt + 1 < max_attempts {
                strategy = policy.pivot(attempt as usize);
                self.narrate(
                    agent,
                    "log",
                    format!("Attempt {} failed. Pivoting to {strategy}", attempt + 1),
                )
                .await;
                if self.recover(agent, strategy).await {
                    cached = None;
                }
            }
        }

        let err = KernelError::MaxRetriesExceeded {
            task: task.id.clone(),
            attempts: max_attempts,
        };
        warn!(task_id = %task.id, error = %err, "giving up");
        Err(err)
    }

    async fn sense(&self) -> Sensed {
        let mut sensed = Sensed::default();
        if let Some(reader) = self.tools.get(names::READ_SCREEN) {
            let result = reader.execute("{}").await;
            if result.success {
                sensed.context = result.output;
            }
        }
        if let Some(camera) = self.tools.get(names::TAKE_SCREENSHOT) {
            let result = camera.execute("{}").await;
            sensed.screenshot = result.success.then_some(result.output);
        }
        sensed
    }

    /// Returns the tool output on success.
    async fn act(
        &self,
        task: &AtomicTask,
        agent: &AgentId,
        strategy: RecoveryStrategy,
        sensed: &Sensed,
        input: &DataMap,
    ) -> Result<String, KernelError> {
        let history: Vec<String> = self
            .store
            .action_history(agent)
            .await
            .into_iter()
            .map(|action| action.description)
            .collect();

        let thought = self
            .brain
            .propose_next_step(BrainInput {
                task,
                screen_context: &sensed.context,
                history: &history,
                screenshot: sensed.screenshot.as_deref(),
                input_data: input,
            })
            .await;
        self.narrate(agent, "thought", thought.reasoning.clone()).await;

        self.store
            .log_action(
                agent,
                format!("Executed {} with params: {}", thought.tool_name, thought.tool_params),
            )
            .await;

        let Some(tool) = self.tools.get(&thought.tool_name) else {
            let err = KernelError::UnknownTool(thought.tool_name);
            self.narrate(agent, "observation", err.to_string()).await;
            return Err(err);
        };

        self.narrate(
            agent,
            "action",
            format!(
                "Executing {} with {} (strategy: {strategy})",
                thought.tool_name, thought.tool_params
            ),
        )
        .await;
        let result = tool.execute(&thought.tool_params).await;
        self.narrate(agent, "observation", result.output.clone()).await;

        if result.success {
            Ok(result.output)
        } else {
            Err(KernelError::ToolExecutionFailed {
                tool: thought.tool_name,
                output: result.output,
            })
        }
    }

    /// Poll the screen until the policy is satisfied or the timeout passes.
    /// Returns the verdict and the last screen read, if any.
    async fn verify(
        &self,
        task: &AtomicTask,
        agent: &AgentId,
        policy: &dyn TaskPolicy,
    ) -> (bool, Option<String>) {
        let Some(reader) = self.tools.get(names::READ_SCREEN) else {
            self.narrate(agent, "thought", "Verification Error: no screen reader registered.")
                .await;
            return (false, None);
        };

        let deadline = Instant::now() + self.settings.verify_timeout;
        let mut last = None;
        loop {
            let result = reader.execute("{}").await;
            if result.success {
                let holds = policy.expectation_holds(task, &result.output);
                last = Some(result.output);
                if holds {
                    return (true, last);
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(self.settings.verify_interval).await;
        }

        self.narrate(
            agent,
            "thought",
            format!("Verification Failed: expectation not met for '{}'.", task.description),
        )
        .await;
        (false, last)
    }

    /// Apply the strategy's side effect. True if the screen may have changed.
    async fn recover(&self, agent: &AgentId, strategy: RecoveryStrategy) -> bool {
        match strategy {
            RecoveryStrategy::ScrollDown => {
                self.narrate(agent, "action", "Recovery: Scrolling down to find element...").await;
                if let Some(scroll) = self.tools.get(names::SCROLL) {
                    scroll.execute("down").await;
                    sleep(self.settings.scroll_settle).await;
                }
                true
            }
            RecoveryStrategy::Wait => {
                self.narrate(agent, "action", "Recovery: Waiting for UI to load...").await;
                sleep(self.settings.wait_delay).await;
                true
            }
            RecoveryStrategy::Back => {
                self.narrate(agent, "action", "Recovery: Going back to previous screen...").await;
                if let Some(back) = self.tools.get(names::GO_BACK) {
                    back.execute("{}").await;
                    sleep(self.settings.back_settle).await;
                }
                true
            }
            RecoveryStrategy::None | RecoveryStrategy::Retry => false,
        }
    }

    async fn save_progress(
        &self,
        task: &AtomicTask,
        agent: &AgentId,
        leases: &[ResourceLease],
        attempt: u32,
        input: &DataMap,
        sensed: &Sensed,
    ) {
        let mut state = AgentState::new(agent.clone());
        state.current_task = Some(task.id.clone());
        state.progress = attempt as f32 / self.settings.max_attempts.max(1) as f32;
        state.data_collected = input.clone();
        state.resources_held = leases.iter().map(|lease| lease.resource.clone()).collect();
        state.last_snapshot = Some(ScreenSnapshot {
            taken_at: self.clock.now(),
            context: sensed.context.clone(),
        });
        self.store.save_state(state).await;
    }

    async fn narrate(&self, agent: &AgentId, key: &str, text: impl Into<String>) {
        let text: String = text.into();
        self.bus
            .send(Message::data(agent.clone(), AgentId::orchestrator(), key, text))
            .await;
    }
}
