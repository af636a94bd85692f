//! Recovery strategies applied between attempts of the retry loop.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// First attempt; nothing to recover from.
    None,
    /// Try again without a side effect.
    Retry,
    ScrollDown,
    Wait,
    Back,
}

impl RecoveryStrategy {
    /// Strategy for the attempt index in a policy table; past the end is always `Retry`.
    pub fn pick(table: &[RecoveryStrategy], attempt: usize) -> RecoveryStrategy {
        table.get(attempt).copied().unwrap_or(RecoveryStrategy::Retry)
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryStrategy::None => "NONE",
            RecoveryStrategy::Retry => "RETRY",
            RecoveryStrategy::ScrollDown => "SCROLL_DOWN",
            RecoveryStrategy::Wait => "WAIT",
            RecoveryStrategy::Back => "BACK",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TABLE: [RecoveryStrategy; 3] = [
        RecoveryStrategy::ScrollDown,
        RecoveryStrategy::Wait,
        RecoveryStrategy::Back,
    ];

    #[rstest]
    #[case(0, RecoveryStrategy::ScrollDown)]
    #[case(1, RecoveryStrategy::Wait)]
    #[case(2, RecoveryStrategy::Back)]
    #[case(3, RecoveryStrategy::Retry)]
    #[case(40, RecoveryStrategy::Retry)]
    fn pick_walks_table_then_clamps(#[case] attempt: usize, #[case] expected: RecoveryStrategy) {
        assert_eq!(RecoveryStrategy::pick(&TABLE, attempt), expected);
    }

    #[test]
    fn empty_table_always_retries() {
        assert_eq!(RecoveryStrategy::pick(&[], 0), RecoveryStrategy::Retry);
    }
}
