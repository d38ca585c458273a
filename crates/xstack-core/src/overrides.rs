//! Override ledger
//!
//! `docs/architecture/LOCKLIST_OVERRIDES.json` lists time-bound waivers for
//! individual invariants. Release branches accept none.

use crate::error::GateError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use xstack_audit::FindingsReport;
use xstack_kernel::GroupOutcome;

/// Ledger location, repo-relative
pub const OVERRIDES_FILE: &str = "docs/architecture/LOCKLIST_OVERRIDES.json";

/// Prefix of invariant ids
pub const INVARIANT_PREFIX: &str = "INV-";

/// One waiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    /// Override id
    pub id: String,
    /// Waived invariant
    pub invariant: String,
    /// Why
    #[serde(default)]
    pub reason: String,
    /// Last day the waiver applies (inclusive)
    pub expires: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct LedgerDoc {
    #[serde(default)]
    overrides: Vec<OverrideEntry>,
}

/// Loaded overrides plus the branch they are evaluated on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideLedger {
    entries: Vec<OverrideEntry>,
    release: bool,
}

impl OverrideLedger {
    /// Ledger over `entries`
    #[must_use]
    pub fn new(mut entries: Vec<OverrideEntry>, release: bool) -> Self {
        entries.sort_by(|a, b| (&a.invariant, &a.id).cmp(&(&b.invariant, &b.id)));
        Self { entries, release }
    }

    /// Load the ledger under `repo_root`; a missing file is an empty ledger
    ///
    /// # Errors
    /// [`GateError::InvalidInput`] for malformed documents, IO failures
    pub fn load(repo_root: &Path, release: bool) -> Result<Self, GateError> {
        let path = repo_root.join(OVERRIDES_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => Self::from_slice(&bytes, release),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(Vec::new(), release)),
            Err(e) => Err(GateError::io_error(path, e)),
        }
    }

    /// Parse a ledger document
    ///
    /// # Errors
    /// [`GateError::InvalidInput`] for malformed documents
    pub fn from_slice(bytes: &[u8], release: bool) -> Result<Self, GateError> {
        let doc: LedgerDoc = serde_json::from_slice(bytes)
            .map_err(|e| GateError::invalid_input(format!("{OVERRIDES_FILE}: {e}")))?;
        Ok(Self::new(doc.overrides, release))
    }

    /// Entries, sorted by invariant
    #[must_use]
    pub fn entries(&self) -> &[OverrideEntry] {
        &self.entries
    }

    /// Evaluated on a release branch
    #[must_use]
    pub fn is_release(&self) -> bool {
        self.release
    }

    /// Whether `invariant` is waived on `today`
    #[must_use]
    pub fn is_active(&self, invariant: &str, today: NaiveDate) -> bool {
        !self.release
            && self
                .entries
                .iter()
                .any(|e| e.invariant == invariant && e.expires >= today)
    }

    /// Overrides still in force on `today`
    pub fn active(&self, today: NaiveDate) -> impl Iterator<Item = &OverrideEntry> {
        let release = self.release;
        self.entries
            .iter()
            .filter(move |e| !release && e.expires >= today)
    }

    /// `REFUSE_OVERRIDE_FORBIDDEN` line when a release branch carries overrides
    #[must_use]
    pub fn forbidden_violation(&self) -> Option<String> {
        if !self.release || self.entries.is_empty() {
            return None;
        }
        let ids: Vec<&str> = self.entries.iter().map(|e| e.id.as_str()).collect();
        Some(format!(
            "REFUSE_OVERRIDE_FORBIDDEN: release branch carries overrides {}",
            ids.join(", ")
        ))
    }

    /// A failing outcome whose every refusal token is a waived invariant
    #[must_use]
    pub fn waives(&self, outcome: &GroupOutcome, today: NaiveDate) -> bool {
        !outcome.passed()
            && !outcome.is_mechanical_refusal()
            && !outcome.refusal_tokens.is_empty()
            && outcome
                .refusal_tokens
                .iter()
                .all(|t| t.starts_with(INVARIANT_PREFIX) && self.is_active(t, today))
    }

    /// Mark findings tied only to waived invariants as DEFERRED
    pub fn defer_findings(&self, report: &mut FindingsReport, today: NaiveDate) -> usize {
        report.defer_where(|finding| {
            !finding.related_invariants.is_empty()
                && finding
                    .related_invariants
                    .iter()
                    .all(|inv| self.is_active(inv, today))
        })
    }
}
