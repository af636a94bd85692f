//! App - アプリケーション層
//!
//! このモジュールは、coord / safety / ports を組み合わせてミッションを実行します。
//!
//! # 主要コンポーネント
//! - **MissionBuilder**: ミッションの構築とワイヤリング
//! - **KernelConfig**: 設定値（JSON から読める）
//! - **RetryEngine**: 1 タスク分の sense → act → verify → pivot ループ
//! - **GraphScheduler**: タスクグラフ全体の実行ループ
//! - **CoordinationReport**: グラフ・リース・直近メッセージのレポート

pub mod builder;
pub mod config;
pub mod retry;
pub mod scheduler;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Mission, MissionBuilder};
pub use self::config::KernelConfig;
pub use self::retry::{RetryEngine, RetrySettings};
pub use self::scheduler::{GraphScheduler, MissionOutcome, MissionReport, SchedulerSettings};
pub use self::status::CoordinationReport;
