//! MissionBuilder - カーネルの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 1 ミッション = 1 組のコンテキスト（グローバルなシングルトンを持たない）

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{Instrument, info_span};

use super::config::KernelConfig;
use super::retry::{RetryEngine, RetrySettings};
use super::scheduler::{Collaborators, GraphScheduler, MissionReport, SchedulerSettings};
use super::status::CoordinationReport;
use crate::coord::{MessageBus, ResourceManager, TaskGraph};
use crate::domain::{AgentRole, KernelError, MissionId, TaskNode};
use crate::impls::{InMemoryStateStore, RoleResourcePolicy, TaskPolicies};
use crate::ports::{
    Brain, Clock, IdGenerator, ResourcePolicy, StateStore, SystemClock, TaskPolicy, Tool,
    UlidGenerator,
};
use crate::typed::{RegistryError, ToolHandler, ToolParams, ToolRegistry};

/// MissionBuilder はミッション 1 回分の実行環境を構築
///
/// # 使用例
/// ```ignore
/// let mission = MissionBuilder::new()
///     .tool(Arc::new(ReadScreen))?
///     .expect_tools(&["read_screen", "scroll"])
///     .brain(Arc::new(KeywordBrain))
///     .build()?;
/// let report = mission.run(plan).await;
/// ```
///
/// # Fail-fast 設計
/// - expect_tools() で期待される tool 名を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct MissionBuilder {
    registry: ToolRegistry,
    expected_tools: Option<Vec<String>>,
    brain: Option<Arc<dyn Brain>>,
    config: KernelConfig,
    store: Option<Arc<dyn StateStore>>,
    clock: Arc<dyn Clock>,
    resource_policy: Arc<dyn ResourcePolicy>,
    task_policies: TaskPolicies,
}

/// BuildError はミッション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing tools: {0:?}. These tools were expected but not registered.")]
    MissingTools(Vec<String>),

    #[error("No brain configured")]
    MissingBrain,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] KernelError),
}

impl MissionBuilder {
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::new(),
            expected_tools: None,
            brain: None,
            config: KernelConfig::default(),
            store: None,
            clock: Arc::new(SystemClock),
            resource_policy: Arc::new(RoleResourcePolicy),
            task_policies: TaskPolicies::default(),
        }
    }

    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Tool を登録
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, RegistryError> {
        self.registry.register(tool)?;
        Ok(self)
    }

    /// 型付き Handler を Tool として登録
    ///
    /// # Example
    /// ```ignore
    /// builder.register::<LaunchApp, _>(LaunchAppHandler)?;
    /// ```
    pub fn register<P: ToolParams, H: ToolHandler<P> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register_typed::<P, H>(handler)?;
        Ok(self)
    }

    /// 期待される tool 名のリストを設定
    pub fn expect_tools(mut self, names: &[&str]) -> Self {
        self.expected_tools = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn brain(mut self, brain: Arc<dyn Brain>) -> Self {
        self.brain = Some(brain);
        self
    }

    /// 省略時は `action_history_window` 件を保持する InMemoryStateStore
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn resource_policy(mut self, policy: Arc<dyn ResourcePolicy>) -> Self {
        self.resource_policy = policy;
        self
    }

    pub fn task_policy(mut self, role: AgentRole, policy: Arc<dyn TaskPolicy>) -> Self {
        self.task_policies.insert(role, policy);
        self
    }

    /// MissionBuilder を検証して Mission を生成
    ///
    /// # 検証
    /// - 設定値が妥当か（`KernelConfig::validate`）
    /// - expect_tools() の tool が全て登録されているか
    /// - Brain が設定されているか
    pub fn build(self) -> Result<Mission, BuildError> {
        self.config.validate()?;

        if let Some(expected_tools) = &self.expected_tools {
            let registered = self.registry.registered_names();
            let missing_tools: Vec<String> = expected_tools
                .iter()
                .filter(|name| !registered.contains(*name))
                .cloned()
                .collect();
            if !missing_tools.is_empty() {
                return Err(BuildError::MissingTools(missing_tools));
            }
        }
        let brain = self.brain.ok_or(BuildError::MissingBrain)?;

        let config = self.config;
        let store: Arc<dyn StateStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryStateStore::new(config.action_history_window)),
        };
        let bus = Arc::new(MessageBus::new(config.queue_capacity, config.history_capacity));
        let governor = Arc::new(crate::safety::SafetyGovernor::new(
            store.clone(),
            config.max_consecutive_failures,
        ));
        let resources = Arc::new(ResourceManager::new(
            bus.clone(),
            store.clone(),
            self.clock.clone(),
            config.default_lease_timeout,
        ));
        let engine = Arc::new(RetryEngine::new(
            Arc::new(self.registry),
            brain,
            bus.clone(),
            store.clone(),
            governor.clone(),
            self.clock.clone(),
            RetrySettings::from(&config),
        ));
        let id = UlidGenerator::new(self.clock.clone()).generate_mission_id();

        Ok(Mission {
            id,
            config,
            shared: Collaborators {
                graph: Arc::new(Mutex::new(TaskGraph::new())),
                resources,
                bus,
                governor,
                store,
                engine,
                resource_policy: self.resource_policy,
                task_policies: Arc::new(self.task_policies),
                clock: self.clock,
            },
        })
    }
}

impl Default for MissionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Mission は 1 回分の実行コンテキスト
///
/// バス・リソース・ガバナーはミッション中ずっと共有されるので、
/// 実行中でも別タスクから観測・操作（一時停止の解除など）できます。
pub struct Mission {
    id: MissionId,
    config: KernelConfig,
    shared: Collaborators,
}

impl Mission {
    pub fn id(&self) -> MissionId {
        self.id
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.shared.bus.clone()
    }

    pub fn resources(&self) -> Arc<ResourceManager> {
        self.shared.resources.clone()
    }

    pub fn governor(&self) -> Arc<crate::safety::SafetyGovernor> {
        self.shared.governor.clone()
    }

    pub fn state_store(&self) -> Arc<dyn StateStore> {
        self.shared.store.clone()
    }

    /// Expand `plan` into a fresh graph and run it to the end.
    pub async fn run(&self, plan: TaskNode) -> MissionReport {
        *self.shared.graph.lock().await = TaskGraph::from_plan(plan);
        let scheduler =
            GraphScheduler::new(self.shared.clone(), SchedulerSettings::from(&self.config));
        scheduler
            .run()
            .instrument(info_span!("mission", mission_id = %self.id))
            .await
    }

    pub async fn report(&self) -> CoordinationReport {
        CoordinationReport::collect(
            &self.shared.graph,
            &self.shared.resources,
            &self.shared.bus,
            &self.shared.governor,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::KeywordBrain;
    use crate::typed::handler::fixtures::{InputTextHandler, LaunchAppHandler};
    use crate::typed::params::fixtures::{InputText, LaunchApp};

    #[test]
    fn test_build_success() {
        let mission = MissionBuilder::new()
            .register::<LaunchApp, _>(LaunchAppHandler)
            .unwrap()
            .expect_tools(&["launch_app"])
            .brain(Arc::new(KeywordBrain))
            .build();
        assert!(mission.is_ok());
        assert!(mission.unwrap().id().to_string().starts_with("mission-"));
    }

    #[test]
    fn test_build_missing_tools() {
        let mission = MissionBuilder::new()
            .register::<LaunchApp, _>(LaunchAppHandler)
            .unwrap()
            .expect_tools(&["launch_app", "input_text"])
            .brain(Arc::new(KeywordBrain))
            .build();
        assert!(matches!(
            mission,
            Err(BuildError::MissingTools(missing)) if missing == vec!["input_text".to_string()]
        ));
    }

    #[test]
    fn test_build_requires_brain() {
        let mission = MissionBuilder::new()
            .register::<InputText, _>(InputTextHandler)
            .unwrap()
            .build();
        assert!(matches!(mission, Err(BuildError::MissingBrain)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mission = MissionBuilder::new()
            .brain(Arc::new(KeywordBrain))
            .config(KernelConfig {
                max_attempts_per_task: 0,
                ..KernelConfig::default()
            })
            .build();
        assert!(matches!(mission, Err(BuildError::Config(KernelError::Config(_)))));
    }

    #[test]
    fn test_duplicate_tool_is_rejected() {
        let builder = MissionBuilder::new()
            .register::<LaunchApp, _>(LaunchAppHandler)
            .unwrap()
            .register::<LaunchApp, _>(LaunchAppHandler);
        assert!(matches!(builder, Err(RegistryError::AlreadyRegistered(name)) if name == "launch_app"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_plan_completes_immediately() {
        let mission = MissionBuilder::new()
            .brain(Arc::new(KeywordBrain))
            .build()
            .unwrap();

        let report = mission.run(TaskNode::parallel("nothing", Vec::new())).await;

        assert_eq!(report.outcome, super::super::scheduler::MissionOutcome::Completed);
        assert_eq!(report.steps, 0);
        let text = mission.report().await.to_string();
        assert!(text.contains("Orchestrator -> All: DataAvailable"));
    }
}
