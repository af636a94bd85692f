//! Domain identifiers (strongly-typed IDs).
//!
//! # 2 種類の ID
//! - **ミッション ID**: ULID ベース。`Id<T>` + Phantom type マーカーで型を分ける
//! - **タスク ID / エージェント ID**: プランナーが決める文字列。newtype で包む
//!
//! `TaskId` と `AgentId` はどちらも中身が `String` ですが、
//! 型が違うので取り違えるとコンパイルエラーになります。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は ULID 系 ID のマーカー trait
///
/// Display で使うプレフィックス（"mission-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ULID ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Mission のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mission {}

impl IdMarker for Mission {
    fn prefix() -> &'static str {
        "mission-"
    }
}

/// Identifier of one scheduler run over a task graph.
pub type MissionId = Id<Mission>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a node in the task graph (assigned by the planner).
    TaskId
);

string_id!(
    /// Identifier of an agent: a bus endpoint and lease owner.
    AgentId
);

impl AgentId {
    /// Endpoint owned by the scheduler itself.
    pub fn orchestrator() -> Self {
        Self::new("Orchestrator")
    }

    /// Broadcast-style recipient used for mission-level status.
    pub fn all() -> Self {
        Self::new("All")
    }

    pub fn resource_manager() -> Self {
        Self::new("ResourceManager")
    }

    pub fn governor() -> Self {
        Self::new("SafetyGovernor")
    }
}
