use crate::analyzer::{Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use serde_json::Value;
use std::collections::BTreeSet;

const ID: &str = "capability_drift";

/// Command-registry capabilities with no row in the capability matrix
#[derive(Debug, Clone)]
pub struct CapabilityDriftAnalyzer {
    registry_path: String,
    matrix_path: String,
}

impl CapabilityDriftAnalyzer {
    /// Analyzer over the given registry and matrix files
    #[must_use]
    pub fn new(registry_path: String, matrix_path: String) -> Self {
        Self {
            registry_path,
            matrix_path,
        }
    }
}

fn string_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_str))
}

/// `(command_id, capability)` pairs declared by the registry
fn required_capabilities(registry: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let Some(commands) = registry.get("commands").and_then(Value::as_array) else {
        return pairs;
    };
    for command in commands {
        let command_id = string_field(command, &["command_id", "id"]).unwrap_or("<unnamed>");
        let caps = ["capabilities", "required_capabilities"]
            .iter()
            .find_map(|k| command.get(*k).and_then(Value::as_array));
        for cap in caps.into_iter().flatten().filter_map(Value::as_str) {
            pairs.push((command_id.to_owned(), cap.to_owned()));
        }
    }
    pairs.sort();
    pairs.dedup();
    pairs
}

/// Capability ids covered by the matrix
///
/// Accepts a list of ids, a list of `{capability_id}` rows, or a map keyed by id.
fn covered_capabilities(matrix: &Value) -> BTreeSet<String> {
    match matrix.get("capabilities") {
        Some(Value::Array(rows)) => rows
            .iter()
            .filter_map(|row| {
                row.as_str()
                    .or_else(|| string_field(row, &["capability_id", "id"]))
                    .map(str::to_owned)
            })
            .collect(),
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => BTreeSet::new(),
    }
}

impl Analyzer for CapabilityDriftAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn watch_prefixes(&self) -> Vec<String> {
        vec![self.registry_path.clone(), self.matrix_path.clone()]
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let Some(registry) = ctx.read_json(&self.registry_path) else {
            return Vec::new();
        };
        let registry_text = ctx.read_text(&self.registry_path).unwrap_or_default();
        let covered = ctx
            .read_json(&self.matrix_path)
            .map(|m| covered_capabilities(&m))
            .unwrap_or_default();

        required_capabilities(&registry)
            .into_iter()
            .filter(|(_, cap)| !covered.contains(cap))
            .map(|(command_id, cap)| {
                let needle = format!("\"{cap}\"");
                let line = registry_text
                    .lines()
                    .position(|l| l.contains(&needle))
                    .map_or(0, |i| u32::try_from(i + 1).unwrap_or(u32::MAX));
                Finding::new(ID, "capability_uncovered", Severity::Warn, 0.70, &self.registry_path)
                    .at_line(line)
                    .suggest(Classification::TodoBlocked, RecommendedAction::AddRule)
                    .with_evidence(format!("command {command_id} requires capability {cap}"))
                    .with_related_path(&self.matrix_path)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn matrix_shapes() {
        let list = json!({"capabilities": ["a", {"capability_id": "b"}, {"id": "c"}]});
        let map = json!({"capabilities": {"a": {}, "d": {}}});
        assert_eq!(covered_capabilities(&list).len(), 3);
        assert!(covered_capabilities(&map).contains("d"));
        assert!(covered_capabilities(&json!({})).is_empty());
    }

    #[test]
    fn registry_pairs_are_sorted() {
        let reg = json!({"commands": [
            {"command_id": "save", "capabilities": ["fs.write", "fs.read"]},
            {"id": "load", "required_capabilities": ["fs.read"]}
        ]});
        assert_eq!(
            required_capabilities(&reg),
            vec![
                ("load".into(), "fs.read".into()),
                ("save".into(), "fs.read".into()),
                ("save".into(), "fs.write".into()),
            ]
        );
    }
}
