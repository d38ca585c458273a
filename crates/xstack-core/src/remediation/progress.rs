//! Measurable-progress guard

use serde::{Deserialize, Serialize};
use xstack_kernel::{refusal_tokens, GroupOutcome};

/// `returncode != 0 ? |distinct refusal tokens| : 0`
#[must_use]
pub fn failure_score(returncode: i32, output: &str) -> usize {
    if returncode == 0 {
        0
    } else {
        refusal_tokens(output).len()
    }
}

/// [`failure_score`] of a group outcome
#[must_use]
pub fn outcome_score(outcome: &GroupOutcome) -> usize {
    if outcome.passed() {
        0
    } else {
        outcome.refusal_tokens.len()
    }
}

/// How one repair attempt moved the failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Progress {
    /// Exit 0
    Passed,
    /// Fewer refusal tokens
    Improved,
    /// More refusal tokens
    Regressed,
    /// Same score
    Stalled,
}

impl Progress {
    /// Compare scores after an attempt
    #[must_use]
    pub fn assess(after_returncode: i32, before_score: usize, after_score: usize) -> Self {
        if after_returncode == 0 {
            Self::Passed
        } else if after_score < before_score {
            Self::Improved
        } else if after_score > before_score {
            Self::Regressed
        } else {
            Self::Stalled
        }
    }

    /// Worth another attempt or finished successfully
    #[must_use]
    pub fn is_measurable(self) -> bool {
        matches!(self, Self::Passed | Self::Improved)
    }
}

/// True when `after` passed or strictly reduced the failure score
#[must_use]
pub fn has_measurable_progress(
    before_returncode: i32,
    before_output: &str,
    after_returncode: i32,
    after_output: &str,
) -> bool {
    let before = failure_score(before_returncode, before_output);
    let after = failure_score(after_returncode, after_output);
    Progress::assess(after_returncode, before, after).is_measurable()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEFORE: &str = "INV-A INV-B error error";

    #[test]
    fn free_text_does_not_score() {
        assert_eq!(failure_score(1, BEFORE), 2);
        assert_eq!(failure_score(0, BEFORE), 0);
    }

    #[test]
    fn worse_or_equal_output_is_rejected() {
        assert!(!has_measurable_progress(1, BEFORE, 1, "INV-A INV-B INV-C error"));
        assert!(!has_measurable_progress(1, BEFORE, 1, "INV-B INV-A error error error"));
    }

    #[test]
    fn better_output_or_pass_is_accepted() {
        assert!(has_measurable_progress(1, BEFORE, 1, "INV-B error"));
        assert!(has_measurable_progress(1, BEFORE, 0, BEFORE));
    }

    #[test]
    fn assess_buckets() {
        assert_eq!(Progress::assess(0, 2, 2), Progress::Passed);
        assert_eq!(Progress::assess(1, 2, 1), Progress::Improved);
        assert_eq!(Progress::assess(1, 2, 3), Progress::Regressed);
        assert_eq!(Progress::assess(1, 2, 2), Progress::Stalled);
    }
}
