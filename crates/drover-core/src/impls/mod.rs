//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryStateStore**: 行動履歴とチェックポイントをメモリに保持
//! - **RoleResourcePolicy**: 役割ごとの既定リソース
//! - **SystemTaskPolicy / ResearchTaskPolicy**: 検証とピボットの既定方針
//! - **KeywordBrain**: LLM なしで動くキーワードベースの Brain
//!
//! 実デバイスの Tool や LLM Brain は別クレートで実装します。

pub mod inmem_state;
pub mod keyword_brain;
pub mod role_policy;
pub mod task_policies;

pub use self::inmem_state::InMemoryStateStore;
pub use self::keyword_brain::KeywordBrain;
pub use self::role_policy::RoleResourcePolicy;
pub use self::task_policies::{ResearchTaskPolicy, SystemTaskPolicy, TaskPolicies};
