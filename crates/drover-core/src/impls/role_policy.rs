//! RoleResourcePolicy - 役割ごとの既定リソース

use crate::domain::{AgentRole, AtomicTask, Resource};
use crate::ports::ResourcePolicy;

pub const CHROME: &str = "com.android.chrome";
pub const WHATSAPP: &str = "com.whatsapp";
pub const YOUTUBE: &str = "com.google.android.youtube";
pub const DOWNLOADS: &str = "/sdcard/Download";

/// Every role needs the screen; media playback asks for it non-exclusively
/// (it still contends, since all screens are one resource).
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleResourcePolicy;

impl ResourcePolicy for RoleResourcePolicy {
    fn required_resources(&self, task: &AtomicTask) -> Vec<Resource> {
        match task.assigned_role {
            AgentRole::Research => vec![
                Resource::app(CHROME),
                Resource::screen(),
                Resource::Network {
                    priority: task.priority,
                },
            ],
            AgentRole::Social => vec![Resource::app(WHATSAPP), Resource::screen()],
            AgentRole::Media => vec![
                Resource::app(YOUTUBE),
                Resource::Screen { exclusive: false },
            ],
            AgentRole::System => vec![Resource::storage(DOWNLOADS), Resource::screen()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AgentRole::Research, 3)]
    #[case(AgentRole::Social, 2)]
    #[case(AgentRole::Media, 2)]
    #[case(AgentRole::System, 2)]
    fn every_role_needs_the_screen(#[case] role: AgentRole, #[case] count: usize) {
        let task = AtomicTask::new("t", role, "whatever").with_priority(4);
        let resources = RoleResourcePolicy.required_resources(&task);
        assert_eq!(resources.len(), count);
        assert!(resources.contains(&Resource::screen()));
    }

    #[test]
    fn research_network_follows_task_priority() {
        let task = AtomicTask::new("t", AgentRole::Research, "search").with_priority(7);
        let resources = RoleResourcePolicy.required_resources(&task);
        assert!(resources.contains(&Resource::Network { priority: 7 }));
    }
}
