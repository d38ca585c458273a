//! Gate profiles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much of the gate a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Profile {
    /// Incremental; cached results are reused
    Fast,
    /// Full cold run; results are still recorded in the cache
    Strict,
    /// Strict plus analyzers and the performance/compat/security suites
    Deep,
}

impl Profile {
    /// All profiles in ascending order
    pub const ALL: [Self; 3] = [Self::Fast, Self::Strict, Self::Deep];

    /// Wire token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "FAST",
            Self::Strict => "STRICT",
            Self::Deep => "DEEP",
        }
    }

    /// STRICT or DEEP
    #[must_use]
    pub const fn is_cold(self) -> bool {
        matches!(self, Self::Strict | Self::Deep)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FAST" => Ok(Self::Fast),
            "STRICT" => Ok(Self::Strict),
            "DEEP" => Ok(Self::Deep),
            other => Err(format!("unknown profile {other}")),
        }
    }
}
