//! Gate result and failure classes

use crate::refusal::{EXIT_MECHANICAL, EXIT_PASS, EXIT_REFUSAL, EXIT_SEMANTIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Why a gate failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureClass {
    /// Repairable by tooling
    Mechanical,
    /// Needs a human decision
    Semantic,
    /// Strict cold run over the ceiling
    Performance,
    /// A CANONICAL artifact carries run metadata
    CanonicalDrift,
}

impl FailureClass {
    /// Wire form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mechanical => "MECHANICAL",
            Self::Semantic => "SEMANTIC",
            Self::Performance => "PERFORMANCE",
            Self::CanonicalDrift => "CANONICAL_DRIFT",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::CanonicalDrift => 0,
            Self::Semantic => 1,
            Self::Mechanical => 2,
            Self::Performance => 3,
        }
    }

    /// Most severe class in `classes`
    ///
    /// Order: CANONICAL_DRIFT, SEMANTIC, MECHANICAL, PERFORMANCE.
    pub fn primary<'a, I>(classes: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        classes.into_iter().copied().min_by_key(|c| c.rank())
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one gate invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// Process exit code
    pub returncode: i32,
    /// Every class observed, sorted
    pub failure_classes: Vec<FailureClass>,
    /// Most severe class
    pub primary_failure_class: Option<FailureClass>,
    /// Human-readable summary
    pub output: String,
    /// Groups served from the cache
    pub cache_hits: usize,
    /// Groups not served from the cache
    pub cache_misses: usize,
    /// Wall time
    pub total_seconds: f64,
}

impl GateResult {
    /// Result for `classes`; the return code follows the primary class unless
    /// `refused` forces exit 2
    #[must_use]
    pub fn new(classes: &BTreeSet<FailureClass>, refused: bool) -> Self {
        let failure_classes: Vec<FailureClass> = classes.iter().copied().collect();
        let primary_failure_class = FailureClass::primary(&failure_classes);
        let returncode = if refused {
            EXIT_REFUSAL
        } else {
            match primary_failure_class {
                None => EXIT_PASS,
                Some(FailureClass::CanonicalDrift) => EXIT_REFUSAL,
                Some(FailureClass::Semantic) => EXIT_SEMANTIC,
                Some(FailureClass::Mechanical | FailureClass::Performance) => EXIT_MECHANICAL,
            }
        };
        Self {
            returncode,
            failure_classes,
            primary_failure_class,
            output: String::new(),
            cache_hits: 0,
            cache_misses: 0,
            total_seconds: 0.0,
        }
    }

    /// Exit 0
    #[must_use]
    pub fn passed(&self) -> bool {
        self.returncode == EXIT_PASS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(classes: &[FailureClass]) -> BTreeSet<FailureClass> {
        classes.iter().copied().collect()
    }

    #[test]
    fn primary_order() {
        use FailureClass::*;
        assert_eq!(FailureClass::primary(&[Performance, Mechanical]), Some(Mechanical));
        assert_eq!(FailureClass::primary(&[Mechanical, Semantic]), Some(Semantic));
        assert_eq!(FailureClass::primary(&[Semantic, CanonicalDrift]), Some(CanonicalDrift));
        assert_eq!(FailureClass::primary(&[]), None);
    }

    #[test]
    fn return_codes() {
        use FailureClass::*;
        assert_eq!(GateResult::new(&set(&[]), false).returncode, 0);
        assert_eq!(GateResult::new(&set(&[Performance]), false).returncode, 1);
        assert_eq!(GateResult::new(&set(&[Mechanical, Semantic]), false).returncode, 3);
        assert_eq!(GateResult::new(&set(&[CanonicalDrift]), false).returncode, 2);
        assert_eq!(GateResult::new(&set(&[Mechanical]), true).returncode, 2);
        assert_eq!(
            serde_json::to_value(CanonicalDrift).unwrap(),
            "CANONICAL_DRIFT"
        );
    }
}
