//! Refusal tokens in child output
//!
//! Children report violations as `refuse.<family>.<detail>`, `REFUSE_<CODE>`
//! or invariant ids `INV-...`. Only these tokens drive control flow; free
//! text is kept for humans.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:refuse\.[A-Za-z0-9_]+(?:[.:][A-Za-z0-9_.:/-]*[A-Za-z0-9_])?|REFUSE_[A-Z0-9_]+|INV-[A-Z0-9][A-Z0-9_-]*)")
        .expect("static regex is valid")
});

/// Prefix of `refuse.<family>.<detail>` tokens
pub const REFUSE_PREFIX: &str = "refuse.";

/// Distinct refusal tokens in `output`, sorted
#[must_use]
pub fn refusal_tokens(output: &str) -> BTreeSet<String> {
    TOKEN
        .find_iter(output)
        .map(|m| m.as_str().trim_end_matches(['-', '.', ':']).to_owned())
        .collect()
}

/// Distinct refusal tokens across several lines
#[must_use]
pub fn refusal_tokens_in<'a, I>(lines: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    lines.into_iter().flat_map(refusal_tokens).collect()
}

/// `(family, detail)` of a `refuse.` token
///
/// The part after `refuse.` is split on its first `.` (or `:`) only, so
/// details may themselves contain dots.
#[must_use]
pub fn split_refusal(token: &str) -> Option<(&str, &str)> {
    let rest = token.strip_prefix(REFUSE_PREFIX)?;
    match rest.find(['.', ':']) {
        Some(idx) => Some((&rest[..idx], &rest[idx + 1..])),
        None => Some((rest, "")),
    }
}

/// Build a `refuse.<family>.<detail>` token
#[must_use]
pub fn refusal(family: &str, detail: &str) -> String {
    if detail.is_empty() {
        format!("{REFUSE_PREFIX}{family}")
    } else {
        format!("{REFUSE_PREFIX}{family}.{detail}")
    }
}
