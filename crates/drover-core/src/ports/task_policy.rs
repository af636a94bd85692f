//! TaskPolicy port - リトライループの検証とピボット方針
//!
//! TaskPolicy は純粋関数として設計されます（副作用なし）。
//! - `expectation_holds`: 画面内容がタスクの期待を満たしているか
//! - `pivot`: 失敗した試行の次に使う回復戦略
//!
//! 画面のポーリングや戦略の副作用（スクロール等）は RetryEngine が実行します。

use crate::domain::{AtomicTask, RecoveryStrategy};

pub trait TaskPolicy: Send + Sync {
    /// Strategies indexed by failed attempt number.
    fn recovery_table(&self) -> &[RecoveryStrategy];

    fn expectation_holds(&self, task: &AtomicTask, screen: &str) -> bool;

    fn pivot(&self, attempt: usize) -> RecoveryStrategy {
        RecoveryStrategy::pick(self.recovery_table(), attempt)
    }
}
