//! GraphScheduler - タスクグラフを最後まで走らせるメインループ
//!
//! # 1 周の流れ
//! 1. 実行中タスクがなくグラフが完了していれば終了（停止条件より先に判定）
//! 2. ガバナーが停止を指示していれば終了（最終ステータスを 1 回だけ送信）
//! 3. 実行ステップ数が上限に達していれば終了
//! 4. 一時停止中はガバナーの状態変化か実行中タスクの完了まで眠る（ポーリングしない）
//! 5. ready なタスクのうち未実行・開始時刻到来済みのものを起動
//! 6. 完了通知かハートビートのどちらか早い方まで待つ
//!
//! # 1 タスクの実行
//! リソースを全部取る → RetryEngine → バスへ報告 → グラフへ反映 →
//! リソース解放（必ず）→ ガバナーへ報告。
//! 実行中に `ResourcePreempted` が届いたら RetryEngine を打ち切ります。
//! 打ち切られた実行はステップ数に数えません。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, info, info_span, warn};

use super::config::KernelConfig;
use super::retry::RetryEngine;
use crate::coord::{GraphSnapshot, MessageBus, ResourceManager, TaskGraph};
use crate::domain::{
    AgentId, AtomicTask, KernelError, Message, MessageBody, Resource, ResourceLease, TaskId,
    TaskResult,
};
use crate::impls::TaskPolicies;
use crate::ports::{Clock, ResourcePolicy, StateStore};
use crate::safety::SafetyGovernor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub max_total_steps: u32,
    pub heartbeat: Duration,
    /// Pause before a deferred task may be launched again.
    pub idle_backoff: Duration,
}

impl From<&KernelConfig> for SchedulerSettings {
    fn from(config: &KernelConfig) -> Self {
        Self {
            max_total_steps: config.max_total_steps,
            heartbeat: config.heartbeat,
            idle_backoff: config.idle_backoff,
        }
    }
}

/// How a mission ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum MissionOutcome {
    /// Every task is completed or failed.
    Completed,
    /// The governor or the step ceiling ended the mission early.
    Stopped(String),
    /// Nothing runs, nothing is ready and nothing is blocked by a failure.
    Stalled,
}

impl fmt::Display for MissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionOutcome::Completed => f.write_str("Mission Complete"),
            MissionOutcome::Stopped(reason) => write!(f, "Mission Stopped: {reason}"),
            MissionOutcome::Stalled => f.write_str("Mission Stalled"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionReport {
    pub outcome: MissionOutcome,
    /// Executions that settled their task, plus panicked ones.
    /// Deferred and interrupted launches are not counted.
    pub steps: u32,
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    pub graph: GraphSnapshot,
}

/// Everything an execution needs; cloned into each spawned task.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub graph: Arc<Mutex<TaskGraph>>,
    pub resources: Arc<ResourceManager>,
    pub bus: Arc<MessageBus>,
    pub governor: Arc<SafetyGovernor>,
    pub store: Arc<dyn StateStore>,
    pub engine: Arc<RetryEngine>,
    pub resource_policy: Arc<dyn ResourcePolicy>,
    pub task_policies: Arc<TaskPolicies>,
    pub clock: Arc<dyn Clock>,
}

enum Outcome {
    /// The retry engine ran and the task is completed or failed.
    Finished(TaskId),
    /// Resources were not all available; the task stays ready.
    Deferred(TaskId),
    /// Cancelled by preemption or a mission stop; the task stays ready.
    Interrupted(TaskId),
}

pub struct GraphScheduler {
    shared: Collaborators,
    settings: SchedulerSettings,
}

/// Bookkeeping owned by one `run`.
struct RunState {
    inflight: JoinSet<Outcome>,
    running: HashSet<TaskId>,
    spawned: HashMap<tokio::task::Id, TaskId>,
    backoff: HashMap<TaskId, Instant>,
    steps: u32,
}

impl GraphScheduler {
    pub(crate) fn new(shared: Collaborators, settings: SchedulerSettings) -> Self {
        Self { shared, settings }
    }

    /// Drive the graph until it completes or the mission is stopped.
    ///
    /// In-flight executions are always drained before returning, so every
    /// lease taken by this run has been released.
    pub async fn run(&self) -> MissionReport {
        let orchestrator = self.spawn_orchestrator_drain().await;
        let mut governor_rx = self.shared.governor.subscribe();
        let mut run = RunState {
            inflight: JoinSet::new(),
            running: HashSet::new(),
            spawned: HashMap::new(),
            backoff: HashMap::new(),
            steps: 0,
        };
        let mut pause_announced = false;

        info!(steps_limit = self.settings.max_total_steps, "mission started");

        let outcome = loop {
            if run.inflight.is_empty() && self.shared.graph.lock().await.is_complete() {
                break MissionOutcome::Completed;
            }
            if let Some(err) = self.shared.governor.stop_reason() {
                break MissionOutcome::Stopped(err.to_string());
            }
            if run.steps >= self.settings.max_total_steps {
                let err = KernelError::HardStepLimitReached(self.settings.max_total_steps);
                break MissionOutcome::Stopped(err.to_string());
            }

            if self.shared.governor.is_paused() {
                if !pause_announced {
                    pause_announced = true;
                    self.announce_pause().await;
                }
                tokio::select! {
                    _ = governor_rx.changed() => {}
                    Some(joined) = run.inflight.join_next() => self.settle(&mut run, joined).await,
                }
                continue;
            }
            pause_announced = false;

            let launched = self.launch_ready(&mut run).await;
            if run.inflight.is_empty() && launched == 0 && !self.has_waiting_work(&run).await {
                if self.fail_blocked().await == 0 {
                    break MissionOutcome::Stalled;
                }
                continue;
            }

            tokio::select! {
                Some(joined) = run.inflight.join_next() => self.settle(&mut run, joined).await,
                _ = governor_rx.changed() => {}
                _ = sleep(self.settings.heartbeat) => {}
            }
        };

        while let Some(joined) = run.inflight.join_next().await {
            self.settle(&mut run, joined).await;
        }

        info!(%outcome, steps = run.steps, "mission finished");
        self.shared
            .bus
            .send(Message::data(
                AgentId::orchestrator(),
                AgentId::all(),
                "status",
                outcome.to_string(),
            ))
            .await;

        self.shared.bus.unregister(&AgentId::orchestrator()).await;
        orchestrator.abort();

        let graph = self.shared.graph.lock().await;
        let snapshot = graph.snapshot();
        let (completed, failed) = split_settled(&snapshot);
        MissionReport {
            outcome,
            steps: run.steps,
            completed,
            failed,
            graph: snapshot,
        }
    }

    /// Launch every ready task that is not running, not backing off and due.
    async fn launch_ready(&self, run: &mut RunState) -> usize {
        let ready = self.shared.graph.lock().await.ready_tasks();
        let now = self.shared.clock.now();
        let tick = Instant::now();
        let mut launched = 0;

        for task in ready {
            if run.running.contains(&task.id) {
                continue;
            }
            if task.scheduled_start.is_some_and(|at| at > now) {
                continue;
            }
            if run.backoff.get(&task.id).is_some_and(|until| *until > tick) {
                continue;
            }
            run.backoff.remove(&task.id);
            run.running.insert(task.id.clone());

            let task_id = task.id.clone();
            let span = info_span!("task", task_id = %task.id, agent_id = %task.agent_id());
            let handle = run
                .inflight
                .spawn(execute(self.shared.clone(), task).instrument(span));
            run.spawned.insert(handle.id(), task_id);
            launched += 1;
        }
        launched
    }

    /// Ready tasks that are only waiting for their start time or a backoff.
    async fn has_waiting_work(&self, run: &RunState) -> bool {
        let graph = self.shared.graph.lock().await;
        !graph.ready_tasks().is_empty() || !run.backoff.is_empty()
    }

    async fn settle(
        &self,
        run: &mut RunState,
        joined: Result<Outcome, tokio::task::JoinError>,
    ) {
        match joined {
            Ok(Outcome::Finished(task_id)) => {
                run.running.remove(&task_id);
                run.spawned.retain(|_, spawned| *spawned != task_id);
                run.steps += 1;
                debug!(%task_id, steps = run.steps, "execution finished");
            }
            Ok(Outcome::Deferred(task_id) | Outcome::Interrupted(task_id)) => {
                run.running.remove(&task_id);
                run.spawned.retain(|_, spawned| *spawned != task_id);
                run.backoff
                    .insert(task_id, Instant::now() + self.settings.idle_backoff);
            }
            Err(err) => {
                let Some(task_id) = run.spawned.remove(&err.id()) else {
                    warn!(error = %err, "unknown execution ended abnormally");
                    return;
                };
                run.running.remove(&task_id);
                run.steps += 1;
                warn!(%task_id, error = %err, "execution panicked");
                self.recover_from_panic(&task_id, &err.to_string()).await;
            }
        }
    }

    /// A panicked execution skipped its own cleanup: release what it may
    /// hold and settle the task.
    async fn recover_from_panic(&self, task_id: &TaskId, error: &str) {
        let task = self.shared.graph.lock().await.get(task_id).cloned();
        let Some(task) = task else {
            return;
        };
        let agent = task.agent_id();
        for resource in self.shared.resource_policy.required_resources(&task) {
            self.shared.resources.release(&resource, &agent).await;
        }
        self.shared.bus.unregister(&agent).await;
        self.report_failure(&agent, error.to_string(), false).await;
        if let Err(err) = self.shared.graph.lock().await.mark_failed(task_id, error) {
            warn!(%task_id, error = %err, "could not settle panicked task");
        }
    }

    /// Fail pending tasks that wait on a failed required predecessor.
    /// Returns how many were failed.
    async fn fail_blocked(&self) -> usize {
        let blocked = self.shared.graph.lock().await.blocked_tasks();
        for (task_id, cause) in &blocked {
            let error = format!("dependency {cause} failed");
            let agent = self
                .shared
                .graph
                .lock()
                .await
                .get(task_id)
                .map_or_else(AgentId::orchestrator, AtomicTask::agent_id);
            self.report_failure(&agent, error.clone(), false).await;
            if let Err(err) = self.shared.graph.lock().await.mark_failed(task_id, error) {
                warn!(%task_id, error = %err, "could not fail blocked task");
            }
        }
        if !blocked.is_empty() {
            info!(count = blocked.len(), "failed tasks blocked by failed dependencies");
        }
        blocked.len()
    }

    async fn announce_pause(&self) {
        warn!("mission paused, waiting for intervention");
        self.shared
            .bus
            .send(Message::new(
                AgentId::governor(),
                AgentId::all(),
                MessageBody::UserInterventionNeeded {
                    reason: "Repeating action loop detected. Resume to continue.".to_string(),
                },
            ))
            .await;
    }

    async fn report_failure(&self, agent: &AgentId, error: String, can_recover: bool) {
        self.shared
            .bus
            .send(Message::new(
                agent.clone(),
                AgentId::orchestrator(),
                MessageBody::ErrorOccurred { error, can_recover },
            ))
            .await;
    }

    /// Keep the orchestrator mailbox drained so narrating agents never block on it.
    async fn spawn_orchestrator_drain(&self) -> tokio::task::JoinHandle<()> {
        let mut mailbox = self.shared.bus.register(AgentId::orchestrator()).await;
        tokio::spawn(async move {
            while let Some(message) = mailbox.recv().await {
                debug!(from = %message.from, kind = message.kind(), "orchestrator received");
            }
        })
    }
}

/// One task: acquire everything, run, report, release.
async fn execute(shared: Collaborators, task: AtomicTask) -> Outcome {
    let agent = task.agent_id();
    let mut mailbox = shared.bus.register(agent.clone()).await;

    let Some(leases) = acquire_all(&shared, &task, &agent).await else {
        shared.bus.unregister(&agent).await;
        return Outcome::Deferred(task.id);
    };
    // A lease taken early may have been preempted while a later one was awaited.
    if let Some(lost) = first_lost(&shared, &leases, &agent).await {
        info!(resource = %lost, "lease lost before start, deferring task");
        release_all(&shared, &leases, &agent).await;
        shared.bus.unregister(&agent).await;
        return Outcome::Deferred(task.id);
    }

    let input = shared.graph.lock().await.data_from_dependencies(&task.id);
    let policy = shared.task_policies.for_role(task.assigned_role);
    debug!(resources = leases.len(), "running task");

    let result = tokio::select! {
        biased;
        Some(resource) = mailbox.next_preemption() => Err(KernelError::PreemptionCancelled {
            task: task.id.clone(),
            resource,
        }),
        result = shared.engine.run(&task, &agent, &leases, policy.as_ref(), &input) => result,
    };

    let body = match &result {
        Ok(task_result) => MessageBody::TaskComplete {
            task_id: task.id.clone(),
            result: task_result.clone(),
        },
        Err(err) => MessageBody::ErrorOccurred {
            error: err.to_string(),
            can_recover: err.is_recoverable(),
        },
    };
    shared
        .bus
        .send(Message::new(agent.clone(), AgentId::orchestrator(), body))
        .await;

    let settled = match &result {
        Ok(task_result) => Some(task_result.clone()),
        Err(err) if err.fails_task() => Some(TaskResult::failure(err)),
        Err(_) => None,
    };
    {
        let mut graph = shared.graph.lock().await;
        let marked = match (&result, &settled) {
            (Ok(_), Some(task_result)) => graph.mark_completed(&task.id, task_result.clone()),
            (Err(err), Some(_)) => graph.mark_failed(&task.id, err.to_string()),
            _ => Ok(()),
        };
        if let Err(err) = marked {
            warn!(error = %err, "could not record task result");
        }
    }

    match &result {
        Ok(_) => info!("task completed"),
        Err(err) if err.fails_task() => warn!(error = %err, "task failed"),
        Err(err) if err.is_recoverable() => {
            shared.store.checkpoint(&agent, Vec::new()).await;
            info!(error = %err, "task interrupted, will run again");
        }
        Err(err) if err.is_mission_fatal() => warn!(error = %err, "task aborted by mission stop"),
        Err(err) => warn!(error = %err, "task ended without a result"),
    }

    release_all(&shared, &leases, &agent).await;
    shared.bus.unregister(&agent).await;

    // Interruptions are not the task's fault; only settled results move the breaker.
    shared
        .governor
        .should_continue(settled.as_ref(), Some(&agent))
        .await;

    if settled.is_some() {
        Outcome::Finished(task.id)
    } else {
        Outcome::Interrupted(task.id)
    }
}

async fn first_lost(
    shared: &Collaborators,
    leases: &[ResourceLease],
    agent: &AgentId,
) -> Option<Resource> {
    for lease in leases {
        if shared.resources.holder(&lease.resource).await.as_ref() != Some(agent) {
            return Some(lease.resource.clone());
        }
    }
    None
}

/// All-or-nothing acquisition. On a timeout the partial set is released,
/// the agent is checkpointed and the failure is published as recoverable.
async fn acquire_all(
    shared: &Collaborators,
    task: &AtomicTask,
    agent: &AgentId,
) -> Option<Vec<ResourceLease>> {
    let timeout = task.estimated_duration.saturating_mul(2);
    let mut leases = Vec::new();

    for resource in shared.resource_policy.required_resources(task) {
        match shared
            .resources
            .acquire(resource.clone(), agent, task.priority, timeout)
            .await
        {
            Some(lease) => leases.push(lease),
            None => {
                release_all(shared, &leases, agent).await;
                let err = KernelError::ResourceAcquisitionTimeout {
                    resource,
                    requester: agent.clone(),
                };
                info!(error = %err, "deferring task");
                shared.store.checkpoint(agent, Vec::new()).await;
                shared
                    .bus
                    .send(Message::new(
                        agent.clone(),
                        AgentId::orchestrator(),
                        MessageBody::ErrorOccurred {
                            error: err.to_string(),
                            can_recover: err.is_recoverable(),
                        },
                    ))
                    .await;
                return None;
            }
        }
    }
    Some(leases)
}

async fn release_all(shared: &Collaborators, leases: &[ResourceLease], agent: &AgentId) {
    for lease in leases {
        shared.resources.release(&lease.resource, agent).await;
    }
}

fn split_settled(snapshot: &GraphSnapshot) -> (Vec<TaskId>, Vec<TaskId>) {
    use crate::domain::TaskState;

    let mut completed = Vec::new();
    let mut failed = Vec::new();
    for node in &snapshot.nodes {
        match snapshot.states.get(&node.id) {
            Some(TaskState::Completed) => completed.push(node.id.clone()),
            Some(TaskState::Failed) => failed.push(node.id.clone()),
            _ => {}
        }
    }
    (completed, failed)
}
