//! Repeating-action detection over an agent's recent history.
//!
//! A period of 1 needs five identical trailing actions. Periods 2 to 4 need
//! the trailing pattern to repeat three full times (e.g. A,B,A,B,A,B).

use crate::domain::AgentAction;

const MAX_PERIOD: usize = 4;
const SINGLE_ACTION_REPEATS: usize = 5;
const PATTERN_REPEATS: usize = 3;

pub fn detect_loop(history: &[AgentAction]) -> bool {
    let descriptions: Vec<&str> = history.iter().map(|a| a.description.as_str()).collect();
    is_looping(&descriptions)
}

pub fn is_looping<T: PartialEq>(history: &[T]) -> bool {
    (1..=MAX_PERIOD).any(|period| {
        let repeats = if period == 1 {
            SINGLE_ACTION_REPEATS
        } else {
            PATTERN_REPEATS
        };
        repeats_with_period(history, period, repeats)
    })
}

fn repeats_with_period<T: PartialEq>(history: &[T], period: usize, repeats: usize) -> bool {
    let window = period * repeats;
    if history.len() < window {
        return false;
    }
    let tail = &history[history.len() - window..];
    (period..window).all(|i| tail[i] == tail[i - period])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn seq(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[rstest]
    #[case("AAAAA", true)]
    #[case("AAAA", false)]
    #[case("BAAAAA", true)]
    #[case("ABABAB", true)]
    #[case("ABAB", false)]
    #[case("ABCABCABC", true)]
    #[case("ABCABC", false)]
    #[case("ABCDABCDABCD", true)]
    #[case("ABCDEABCDEABCDE", false)]
    #[case("ABABABC", false)]
    #[case("", false)]
    fn detects_repeating_tails(#[case] history: &str, #[case] looping: bool) {
        assert_eq!(is_looping(&seq(history)), looping);
    }

    #[test]
    fn compares_action_descriptions() {
        let history: Vec<AgentAction> = (0..5).map(|_| AgentAction::new("Executed scroll")).collect();
        assert!(detect_loop(&history));
    }
}
