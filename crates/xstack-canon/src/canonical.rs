//! Canonical JSON codec
//!
//! Every persisted artifact goes through this module. The byte form produced
//! by [`serialize_canonical`] is stable across machines and runs:
//!
//! - mapping keys sorted by code point,
//! - run-metadata keys dropped (see [`RUN_META_KEYS`]),
//! - lists of records sorted by their primary id, lists of strings sorted,
//! - `,` / `:` separators without whitespace,
//! - every non-ASCII character escaped as `\uXXXX`,
//! - a single trailing newline.
//!
//! Key ordering is done here rather than relying on `serde_json::Map`, so the
//! output does not depend on whether some other crate in the build enabled
//! `preserve_order`.

use crate::digest::ContentDigest;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Keys that carry run metadata and never belong in a CANONICAL artifact
pub const RUN_META_KEYS: [&str; 13] = [
    "created_utc",
    "generated_utc",
    "host_name",
    "last_reviewed",
    "machine_name",
    "run_id",
    "scan_id",
    "timestamp",
    "timestamps",
    "duration_ms",
    "measured_at",
    "started_utc",
    "finished_utc",
];

/// Primary keys used to order lists of records, in priority order
pub const LIST_PRIMARY_KEYS: [&str; 8] = [
    "envelope_id",
    "metric_id",
    "regression_id",
    "profile_id",
    "baseline_id",
    "artifact_id",
    "pack_id",
    "schema_id",
];

/// Set of keys removed during canonicalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenKeys {
    keys: BTreeSet<String>,
}

impl ForbiddenKeys {
    /// The run-metadata set
    #[must_use]
    pub fn run_meta() -> Self {
        Self::from_keys(RUN_META_KEYS)
    }

    /// Empty set: nothing is dropped
    #[must_use]
    pub fn none() -> Self {
        Self {
            keys: BTreeSet::new(),
        }
    }

    /// Build from arbitrary keys
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Check membership
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Whether the set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate keys in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl Default for ForbiddenKeys {
    fn default() -> Self {
        Self::run_meta()
    }
}

/// Canonicalize with the run-metadata forbidden set
#[must_use]
pub fn canonicalize(payload: &Value) -> Value {
    canonicalize_with(payload, &ForbiddenKeys::run_meta())
}

/// Canonicalize with an explicit forbidden set
#[must_use]
pub fn canonicalize_with(payload: &Value, forbidden: &ForbiddenKeys) -> Value {
    match payload {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if forbidden.contains(key) {
                    continue;
                }
                out.insert(key.clone(), canonicalize_with(value, forbidden));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| canonicalize_with(item, forbidden))
                .collect();
            Value::Array(sort_list(items))
        }
        other => other.clone(),
    }
}

fn sort_list(mut items: Vec<Value>) -> Vec<Value> {
    if items.iter().all(Value::is_object) {
        let primary = LIST_PRIMARY_KEYS.iter().copied().find(|key| {
            items
                .iter()
                .all(|item| item.get(*key).is_some_and(|v| !v.is_null()))
        });
        if let Some(key) = primary {
            items.sort_by_cached_key(|item| sort_token(&item[key]));
        }
    } else if items.iter().all(Value::is_string) {
        items.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    }
    items
}

fn sort_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            write_value(other, &mut out);
            out
        }
    }
}

/// Canonical bytes with the run-metadata forbidden set
#[must_use]
pub fn serialize_canonical(payload: &Value) -> Vec<u8> {
    serialize_canonical_with(payload, &ForbiddenKeys::run_meta())
}

/// Canonical bytes with an explicit forbidden set
///
/// DERIVED_VIEW artifacts use [`ForbiddenKeys::none`] so their run metadata
/// survives while still getting the stable byte layout.
#[must_use]
pub fn serialize_canonical_with(payload: &Value, forbidden: &ForbiddenKeys) -> Vec<u8> {
    let canonical = canonicalize_with(payload, forbidden);
    let mut out = String::new();
    write_value(&canonical, &mut out);
    out.push('\n');
    out.into_bytes()
}

/// SHA-256 of the canonical bytes
#[must_use]
pub fn canonical_sha256(payload: &Value) -> ContentDigest {
    ContentDigest::compute(&serialize_canonical(payload))
}

/// Dotted paths of every forbidden key present in `payload`, sorted
///
/// Array positions are rendered as `[i]`.
#[must_use]
pub fn find_forbidden_keys(payload: &Value, forbidden: &ForbiddenKeys) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), payload)];
    while let Some((path, value)) = stack.pop() {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    if forbidden.contains(key) {
                        found.push(child_path.clone());
                    }
                    stack.push((child_path, child));
                }
            }
            Value::Array(items) => {
                for (idx, child) in items.iter().enumerate() {
                    stack.push((format!("{path}[{idx}]"), child));
                }
            }
            _ => {}
        }
    }
    found.sort();
    found
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c if c.is_ascii() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn text(value: &Value) -> String {
        String::from_utf8(serialize_canonical(value)).unwrap()
    }

    #[test]
    fn keys_are_sorted_and_compact() {
        let value = json!({"b": 1, "a": {"d": true, "c": null}});
        assert_eq!(text(&value), "{\"a\":{\"c\":null,\"d\":true},\"b\":1}\n");
    }

    #[test]
    fn run_meta_keys_are_dropped_recursively() {
        let value = json!({
            "record": {"generated_utc": "2024-01-01T00:00:00Z", "ok": 1},
            "items": [{"run_id": "r1", "pack_id": "p"}]
        });
        assert_eq!(
            text(&value),
            "{\"items\":[{\"pack_id\":\"p\"}],\"record\":{\"ok\":1}}\n"
        );
    }

    #[test]
    fn non_ascii_is_escaped() {
        let value = json!({"name": "caf\u{e9} \u{1f600}"});
        assert_eq!(
            text(&value),
            "{\"name\":\"caf\\u00e9 \\ud83d\\ude00\"}\n"
        );
    }

    #[test]
    fn control_characters_are_escaped() {
        let value = json!(["a\u{01}b\tc"]);
        assert_eq!(text(&value), "[\"a\\u0001b\\tc\"]\n");
    }

    #[test]
    fn string_lists_are_sorted() {
        let value = json!(["zeta", "alpha", "mid"]);
        assert_eq!(text(&value), "[\"alpha\",\"mid\",\"zeta\"]\n");
    }

    #[test]
    fn record_lists_sort_by_first_shared_primary_key() {
        let value = json!([
            {"schema_id": "a", "pack_id": "z"},
            {"schema_id": "b", "pack_id": "m"}
        ]);
        // pack_id precedes schema_id in priority and is present everywhere.
        let out = canonicalize(&value);
        assert_eq!(out[0]["pack_id"], "m");
        assert_eq!(out[1]["pack_id"], "z");
    }

    #[test]
    fn record_lists_without_primary_key_keep_order() {
        let value = json!([{"name": "b"}, {"name": "a"}]);
        assert_eq!(canonicalize(&value), value);
    }

    #[test]
    fn mixed_lists_keep_order() {
        let value = json!(["b", 1, "a"]);
        assert_eq!(canonicalize(&value), value);
    }

    #[test]
    fn forbidden_keys_and_key_order_do_not_change_hash() {
        let a = json!({"x": 1, "y": [1, 2], "timestamp": 99});
        let b = json!({"y": [1, 2], "x": 1});
        assert_eq!(canonical_sha256(&a), canonical_sha256(&b));
    }

    #[test]
    fn explicit_empty_forbidden_set_keeps_run_meta() {
        let value = json!({"duration_ms": 5});
        let bytes = serialize_canonical_with(&value, &ForbiddenKeys::none());
        assert_eq!(bytes, b"{\"duration_ms\":5}\n".to_vec());
    }

    #[test]
    fn find_forbidden_reports_paths() {
        let value = json!({
            "record": {"generated_utc": "x", "rows": [{"run_id": 1}]},
            "host_name": "h"
        });
        let found = find_forbidden_keys(&value, &ForbiddenKeys::run_meta());
        assert_eq!(
            found,
            vec![
                "host_name".to_string(),
                "record.generated_utc".to_string(),
                "record.rows[0].run_id".to_string()
            ]
        );
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z\u{e9}\u{4e2d}]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            let keys = prop_oneof![
                Just("pack_id".to_string()),
                Just("schema_id".to_string()),
                Just("run_id".to_string()),
                Just("timestamp".to_string()),
                "[a-z]{1,4}",
            ];
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
                prop::collection::btree_map(keys, inner, 0..5)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonicalize_is_idempotent(value in arb_json()) {
            let once = canonicalize(&value);
            let twice = canonicalize(&once);
            prop_assert_eq!(canonical_sha256(&once), canonical_sha256(&twice));
            prop_assert_eq!(serialize_canonical(&once), serialize_canonical(&twice));
        }

        #[test]
        fn canonical_output_has_no_forbidden_keys(value in arb_json()) {
            let out = canonicalize(&value);
            prop_assert!(find_forbidden_keys(&out, &ForbiddenKeys::run_meta()).is_empty());
        }

        #[test]
        fn canonical_bytes_are_ascii(value in arb_json()) {
            prop_assert!(serialize_canonical(&value).is_ascii());
        }
    }
}
