//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait はカーネルの外側（デバイス操作、戦略層、状態保存、時刻）への
//! インターフェースで、実装の詳細を隠蔽します。
//!
//! 開発用の実装は `impls` にあります。

pub mod brain;
pub mod clock;
pub mod id_generator;
pub mod resource_policy;
pub mod state_store;
pub mod task_policy;
pub mod tool;

pub use self::brain::{Brain, BrainInput, BrainThought, UNKNOWN_TOOL};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::resource_policy::ResourcePolicy;
pub use self::state_store::StateStore;
pub use self::task_policy::TaskPolicy;
pub use self::tool::{Tool, ToolResult};
