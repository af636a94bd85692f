//! Mission-wide safety state: circuit breaker, loop detection, pause and stop.
//!
//! State transitions:
//! - Running -> Paused: a repeating action loop is detected, or pause is requested
//! - Paused -> Running: manual resume (also clears the failure streak)
//! - any -> EmergencyStopped: manual stop; only `reset` leaves it
//!
//! The state lives in a `watch` channel so the scheduler can sleep until it
//! changes instead of polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::watch;
use tracing::{info, warn};

use super::loop_detector::detect_loop;
use crate::domain::{AgentId, GovernorState, KernelError, TaskResult};
use crate::ports::StateStore;

pub struct SafetyGovernor {
    store: Arc<dyn StateStore>,
    max_consecutive_failures: u32,
    consecutive_failures: AtomicU32,
    state: watch::Sender<GovernorState>,
}

impl SafetyGovernor {
    pub fn new(store: Arc<dyn StateStore>, max_consecutive_failures: u32) -> Self {
        let (state, _) = watch::channel(GovernorState::Running);
        Self {
            store,
            max_consecutive_failures,
            consecutive_failures: AtomicU32::new(0),
            state,
        }
    }

    /// Feed the latest task result (if any) and decide whether the mission may go on.
    ///
    /// Paused missions answer `true`: the caller is expected to wait on
    /// `subscribe()` rather than stop.
    pub async fn should_continue(
        &self,
        last_result: Option<&TaskResult>,
        agent: Option<&AgentId>,
    ) -> bool {
        match self.state() {
            GovernorState::EmergencyStopped => return false,
            GovernorState::Paused => return true,
            GovernorState::Running => {}
        }

        if let Some(result) = last_result {
            if result.success {
                self.consecutive_failures.store(0, Ordering::SeqCst);
            } else {
                self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
            }
        }

        let failures = self.consecutive_failures();
        if failures >= self.max_consecutive_failures {
            warn!(failures, limit = self.max_consecutive_failures, "circuit breaker open");
            return false;
        }

        if let Some(agent) = agent {
            let history = self.store.action_history(agent).await;
            if detect_loop(&history) {
                let err = KernelError::LoopDetected {
                    agent: agent.clone(),
                };
                warn!(agent_id = %agent, error = %err, "pausing mission");
                self.pause_for_intervention();
            }
        }
        true
    }

    pub fn state(&self) -> GovernorState {
        *self.state.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == GovernorState::Paused
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Why the governor refuses to continue, if it does.
    pub fn stop_reason(&self) -> Option<KernelError> {
        if self.state() == GovernorState::EmergencyStopped {
            return Some(KernelError::EmergencyStop);
        }
        (self.consecutive_failures() >= self.max_consecutive_failures)
            .then_some(KernelError::CircuitOpen(self.max_consecutive_failures))
    }

    pub fn subscribe(&self) -> watch::Receiver<GovernorState> {
        self.state.subscribe()
    }

    pub fn pause_for_intervention(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == GovernorState::Running {
                *state = GovernorState::Paused;
                true
            } else {
                false
            }
        });
        if changed {
            warn!("mission paused for user intervention");
        }
    }

    pub fn resume_from_intervention(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == GovernorState::Paused {
                *state = GovernorState::Running;
                true
            } else {
                false
            }
        });
        if changed {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            info!("mission resumed");
        }
    }

    pub fn trigger_emergency_stop(&self) {
        let previous = self.state.send_replace(GovernorState::EmergencyStopped);
        if previous != GovernorState::EmergencyStopped {
            warn!(%previous, "emergency stop");
        }
    }

    pub fn reset(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.state.send_replace(GovernorState::Running);
        info!("governor reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DataMap;
    use crate::impls::InMemoryStateStore;

    fn governor(limit: u32) -> (SafetyGovernor, Arc<InMemoryStateStore>) {
        let store = Arc::new(InMemoryStateStore::new(100));
        (SafetyGovernor::new(store.clone(), limit), store)
    }

    fn failed() -> TaskResult {
        TaskResult::failure("nope")
    }

    #[tokio::test]
    async fn circuit_opens_at_the_failure_limit() {
        let (governor, _) = governor(20);
        for _ in 0..19 {
            assert!(governor.should_continue(Some(&failed()), None).await);
        }
        assert!(!governor.should_continue(Some(&failed()), None).await);
        assert_eq!(governor.stop_reason(), Some(KernelError::CircuitOpen(20)));
        assert!(!governor.should_continue(None, None).await);
    }

    #[tokio::test]
    async fn success_resets_the_streak() {
        let (governor, _) = governor(3);
        governor.should_continue(Some(&failed()), None).await;
        governor.should_continue(Some(&failed()), None).await;
        governor
            .should_continue(Some(&TaskResult::success(DataMap::new())), None)
            .await;
        assert_eq!(governor.consecutive_failures(), 0);
        assert!(governor.should_continue(Some(&failed()), None).await);
    }

    #[tokio::test]
    async fn emergency_stop_is_sticky_until_reset() {
        let (governor, _) = governor(20);
        governor.trigger_emergency_stop();
        assert!(!governor.should_continue(None, None).await);

        governor.resume_from_intervention();
        assert_eq!(governor.state(), GovernorState::EmergencyStopped);

        governor.reset();
        assert_eq!(governor.state(), GovernorState::Running);
        assert!(governor.should_continue(None, None).await);
    }

    #[tokio::test]
    async fn repeating_actions_pause_the_mission() {
        let (governor, store) = governor(20);
        let agent = AgentId::new("SYSTEM_a");
        let mut watcher = governor.subscribe();
        for _ in 0..5 {
            store.log_action(&agent, "Executed scroll with params: down".into()).await;
        }

        assert!(governor.should_continue(None, Some(&agent)).await);
        assert!(governor.is_paused());
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), GovernorState::Paused);
    }

    #[tokio::test]
    async fn paused_mission_ignores_results_until_resumed() {
        let (governor, _) = governor(2);
        governor.should_continue(Some(&failed()), None).await;
        governor.pause_for_intervention();

        assert!(governor.should_continue(Some(&failed()), None).await);
        assert!(governor.should_continue(Some(&failed()), None).await);
        assert_eq!(governor.consecutive_failures(), 1);

        governor.resume_from_intervention();
        assert_eq!(governor.state(), GovernorState::Running);
        assert_eq!(governor.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn varied_actions_do_not_pause() {
        let (governor, store) = governor(20);
        let agent = AgentId::new("SYSTEM_a");
        for step in ["open", "scroll", "click", "type", "back"] {
            store.log_action(&agent, step.into()).await;
        }
        assert!(governor.should_continue(None, Some(&agent)).await);
        assert_eq!(governor.state(), GovernorState::Running);
    }
}
