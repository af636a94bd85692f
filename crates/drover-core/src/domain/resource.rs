//! Device resources and leases.
//!
//! `Resource::Screen` の同一性は `exclusive` フラグを無視します。
//! 画面は物理的に 1 つしかないので、すべての Screen は同じリソースです。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use super::ids::AgentId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    App { package_id: String },
    Screen { exclusive: bool },
    Network { priority: i32 },
    Storage { path: String },
}

impl Resource {
    pub fn app(package_id: impl Into<String>) -> Self {
        Resource::App {
            package_id: package_id.into(),
        }
    }

    pub fn screen() -> Self {
        Resource::Screen { exclusive: true }
    }

    pub fn storage(path: impl Into<String>) -> Self {
        Resource::Storage { path: path.into() }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Resource::App { package_id: a }, Resource::App { package_id: b }) => a == b,
            (Resource::Screen { .. }, Resource::Screen { .. }) => true,
            (Resource::Network { priority: a }, Resource::Network { priority: b }) => a == b,
            (Resource::Storage { path: a }, Resource::Storage { path: b }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Resource::App { package_id } => package_id.hash(state),
            Resource::Screen { .. } => {}
            Resource::Network { priority } => priority.hash(state),
            Resource::Storage { path } => path.hash(state),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::App { package_id } => write!(f, "App({package_id})"),
            Resource::Screen { .. } => f.write_str("Screen"),
            Resource::Network { priority } => write!(f, "Network(p{priority})"),
            Resource::Storage { path } => write!(f, "Storage({path})"),
        }
    }
}

/// Time-bounded exclusive ownership of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLease {
    pub resource: Resource,
    pub owner: AgentId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub priority: i32,
}

/// A pending claim parked in a resource's wait queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub resource: Resource,
    pub requester: AgentId,
    pub priority: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_screen_is_the_same_resource() {
        let exclusive = Resource::Screen { exclusive: true };
        let shared = Resource::Screen { exclusive: false };
        assert_eq!(exclusive, shared);

        let set: HashSet<Resource> = [exclusive, shared].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn other_kinds_compare_by_payload() {
        assert_eq!(Resource::app("com.whatsapp"), Resource::app("com.whatsapp"));
        assert_ne!(Resource::app("com.whatsapp"), Resource::app("com.android.chrome"));
        assert_ne!(
            Resource::Network { priority: 1 },
            Resource::Network { priority: 2 }
        );
        assert_ne!(Resource::storage("/sdcard"), Resource::app("/sdcard"));
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(Resource::app("com.android.chrome").to_string(), "App(com.android.chrome)");
        assert_eq!(Resource::Screen { exclusive: false }.to_string(), "Screen");
    }
}
