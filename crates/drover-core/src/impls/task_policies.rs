//! Built-in task policies and the role -> policy table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{AgentRole, AtomicTask, RecoveryStrategy};
use crate::ports::TaskPolicy;

/// Device-navigation tasks: scroll, wait, then back out before plain retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTaskPolicy;

const SYSTEM_TABLE: [RecoveryStrategy; 3] = [
    RecoveryStrategy::ScrollDown,
    RecoveryStrategy::Wait,
    RecoveryStrategy::Back,
];

impl TaskPolicy for SystemTaskPolicy {
    fn recovery_table(&self) -> &[RecoveryStrategy] {
        &SYSTEM_TABLE
    }

    fn expectation_holds(&self, task: &AtomicTask, screen: &str) -> bool {
        let description = task.description.to_lowercase();
        let screen = screen.to_lowercase();

        if description.contains("settings") {
            return ["settings", "network", "battery"]
                .iter()
                .any(|keyword| screen.contains(keyword));
        }
        if description.contains("type") {
            let expected = description.replace("type", "");
            return screen.contains(expected.trim());
        }
        true
    }
}

/// Browser tasks: the browser chrome must be visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResearchTaskPolicy;

const RESEARCH_TABLE: [RecoveryStrategy; 1] = [RecoveryStrategy::Retry];

impl TaskPolicy for ResearchTaskPolicy {
    fn recovery_table(&self) -> &[RecoveryStrategy] {
        &RESEARCH_TABLE
    }

    fn expectation_holds(&self, _task: &AtomicTask, screen: &str) -> bool {
        let screen = screen.to_lowercase();
        ["chrome", "search", "google", "address"]
            .iter()
            .any(|keyword| screen.contains(keyword))
    }
}

/// Role -> policy lookup with a fallback for unmapped roles.
#[derive(Clone)]
pub struct TaskPolicies {
    by_role: HashMap<AgentRole, Arc<dyn TaskPolicy>>,
    fallback: Arc<dyn TaskPolicy>,
}

impl TaskPolicies {
    pub fn new(fallback: Arc<dyn TaskPolicy>) -> Self {
        Self {
            by_role: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, role: AgentRole, policy: Arc<dyn TaskPolicy>) -> Self {
        self.by_role.insert(role, policy);
        self
    }

    pub fn insert(&mut self, role: AgentRole, policy: Arc<dyn TaskPolicy>) {
        self.by_role.insert(role, policy);
    }

    pub fn for_role(&self, role: AgentRole) -> Arc<dyn TaskPolicy> {
        self.by_role
            .get(&role)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for TaskPolicies {
    /// Research gets the browser policy; every other role falls back to System.
    fn default() -> Self {
        Self::new(Arc::new(SystemTaskPolicy))
            .with(AgentRole::Research, Arc::new(ResearchTaskPolicy))
            .with(AgentRole::System, Arc::new(SystemTaskPolicy))
    }
}
