//! Reference extractors
//!
//! Each extractor turns the text of one file into raw references. Resolution
//! against the file set happens later in the builder, so extractors are pure
//! and run in parallel.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// A reference found in a file, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRef {
    /// `#include "x"` (`quoted`) or `#include <x>`
    Include {
        /// Header path as written
        target: String,
        /// Quote form
        quoted: bool,
        /// 1-based line
        line: u32,
    },
    /// Python `import a.b` / `from a.b import c`
    PyImport {
        /// Dotted module, leading dots kept for relative imports
        module: String,
        /// Names after `import` in the `from` form
        names: Vec<String>,
        /// 1-based line
        line: u32,
    },
    /// JS/TS relative `import ... from './x'` or `require('./x')`
    JsImport {
        /// Specifier as written
        specifier: String,
        /// 1-based line
        line: u32,
    },
    /// `pack.json` manifest
    Pack {
        /// Declared pack id
        pack_id: String,
        /// Required pack or schema ids
        requires: Vec<String>,
        /// Provided ids
        provides: Vec<String>,
    },
    /// Schema declaration
    SchemaDecl {
        /// Declared id
        id: String,
        /// 1-based line, 0 for JSON fields
        line: u32,
    },
    /// Schema reference from a data file
    SchemaRef {
        /// Referenced id
        id: String,
        /// 1-based line, 0 when unknown
        line: u32,
    },
}

/// Extractor interface
pub trait Extractor: Send + Sync {
    /// Stable name for logs
    fn name(&self) -> &'static str;

    /// Whether this extractor handles the repo-relative path
    fn handles(&self, rel: &str) -> bool;

    /// Pull raw references out of `content`
    fn extract(&self, rel: &str, content: &str) -> Vec<RawRef>;

    /// Higher runs first when several extractors match
    fn priority(&self) -> i32 {
        0
    }
}

/// Ordered set of extractors
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field(
                "extractors",
                &self.extractors.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        default_extractors()
    }
}

impl ExtractorRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Register an extractor, keeping priority order (stable for ties)
    pub fn register<E: Extractor + 'static>(&mut self, extractor: E) {
        self.extractors.push(Box::new(extractor));
        self.extractors.sort_by_key(|e| std::cmp::Reverse(e.priority()));
    }

    /// Run every matching extractor over one file
    #[must_use]
    pub fn extract(&self, rel: &str, content: &str) -> Vec<RawRef> {
        self.extractors
            .iter()
            .filter(|e| e.handles(rel))
            .flat_map(|e| e.extract(rel, content))
            .collect()
    }

    /// Registered extractor names in run order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}

/// Registry with the built-in extractors
#[must_use]
pub fn default_extractors() -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    registry.register(PackManifestExtractor);
    registry.register(SchemaExtractor);
    registry.register(IncludeExtractor);
    registry.register(PythonImportExtractor);
    registry.register(JsImportExtractor);
    registry
}

fn extension(rel: &str) -> &str {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    name.rsplit_once('.').map_or("", |(_, ext)| ext)
}

fn file_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

fn line_no(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}

/// Path has a `schema` directory component
#[must_use]
pub fn in_schema_dir(rel: &str) -> bool {
    rel.split('/').rev().skip(1).any(|part| part == "schema")
}

static INCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*#\s*include\s*([<"])([^>"]+)[>"]"#).expect("static regex is valid"));

/// C/C++ `#include`
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeExtractor;

impl Extractor for IncludeExtractor {
    fn name(&self) -> &'static str {
        "include"
    }

    fn handles(&self, rel: &str) -> bool {
        matches!(
            extension(rel),
            "c" | "h" | "cc" | "cpp" | "cxx" | "hh" | "hpp" | "hxx" | "inl"
        )
    }

    fn extract(&self, _rel: &str, content: &str) -> Vec<RawRef> {
        content
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let caps = INCLUDE_RE.captures(line)?;
                Some(RawRef::Include {
                    target: caps[2].trim().to_string(),
                    quoted: &caps[1] == "\"",
                    line: line_no(idx),
                })
            })
            .collect()
    }
}

static PY_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*import\s+([A-Za-z_][\w\.]*(?:\s*,\s*[A-Za-z_][\w\.]*)*)").expect("static regex is valid")
});
static PY_FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*from\s+(\.*[\w\.]*)\s+import\s+\(?\s*([\w\s,\*]+)").expect("static regex is valid")
});

/// Python imports
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonImportExtractor;

impl Extractor for PythonImportExtractor {
    fn name(&self) -> &'static str {
        "python-import"
    }

    fn handles(&self, rel: &str) -> bool {
        extension(rel) == "py"
    }

    fn extract(&self, _rel: &str, content: &str) -> Vec<RawRef> {
        let mut refs = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if let Some(caps) = PY_FROM_RE.captures(line) {
                let names = caps[2]
                    .split(',')
                    .map(|n| n.split_whitespace().next().unwrap_or("").to_string())
                    .filter(|n| !n.is_empty() && n != "*")
                    .collect();
                refs.push(RawRef::PyImport {
                    module: caps[1].to_string(),
                    names,
                    line: line_no(idx),
                });
            } else if let Some(caps) = PY_IMPORT_RE.captures(line) {
                for module in caps[1].split(',') {
                    refs.push(RawRef::PyImport {
                        module: module.trim().to_string(),
                        names: Vec::new(),
                        line: line_no(idx),
                    });
                }
            }
        }
        refs
    }
}

static JS_FROM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:import|export)\b[^'"]*?from\s*['"]([^'"]+)['"]"#).expect("static regex is valid"));
static JS_BARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*import\s*['"]([^'"]+)['"]"#).expect("static regex is valid"));
static JS_REQUIRE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).expect("static regex is valid"));

/// JS/TS relative imports
#[derive(Debug, Clone, Copy, Default)]
pub struct JsImportExtractor;

impl Extractor for JsImportExtractor {
    fn name(&self) -> &'static str {
        "js-import"
    }

    fn handles(&self, rel: &str) -> bool {
        matches!(extension(rel), "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx")
    }

    fn extract(&self, _rel: &str, content: &str) -> Vec<RawRef> {
        let mut refs = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let specs = JS_FROM_RE
                .captures_iter(line)
                .chain(JS_BARE_RE.captures_iter(line))
                .chain(JS_REQUIRE_RE.captures_iter(line))
                .map(|caps| caps[1].to_string());
            for specifier in specs {
                if specifier.starts_with("./") || specifier.starts_with("../") {
                    refs.push(RawRef::JsImport {
                        specifier,
                        line: line_no(idx),
                    });
                }
            }
        }
        refs
    }
}

/// `pack.json` manifests
#[derive(Debug, Clone, Copy, Default)]
pub struct PackManifestExtractor;

impl Extractor for PackManifestExtractor {
    fn name(&self) -> &'static str {
        "pack-manifest"
    }

    fn handles(&self, rel: &str) -> bool {
        file_name(rel) == "pack.json"
    }

    fn extract(&self, _rel: &str, content: &str) -> Vec<RawRef> {
        let Ok(value) = serde_json::from_str::<Value>(content) else {
            return Vec::new();
        };
        let Some(pack_id) = value.get("pack_id").and_then(Value::as_str) else {
            return Vec::new();
        };
        let strings = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        vec![RawRef::Pack {
            pack_id: pack_id.to_string(),
            requires: strings("requires"),
            provides: strings("provides"),
        }]
    }

    fn priority(&self) -> i32 {
        10
    }
}

static SCHEMA_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"?schema_id"?\s*:\s*"?([A-Za-z0-9_.\-/]+)"?"#).expect("static regex is valid")
});

/// Schema declarations (under a `schema/` dir) and references (elsewhere)
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaExtractor;

impl Extractor for SchemaExtractor {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn handles(&self, rel: &str) -> bool {
        file_name(rel) != "pack.json"
            && (extension(rel) == "json"
                || (in_schema_dir(rel) && matches!(extension(rel), "schema" | "yaml" | "yml" | "toml")))
    }

    fn extract(&self, rel: &str, content: &str) -> Vec<RawRef> {
        let declaring = in_schema_dir(rel);
        let mut ids: Vec<(String, u32)> = Vec::new();

        if extension(rel) == "json" {
            if let Ok(value) = serde_json::from_str::<Value>(content) {
                collect_schema_ids(&value, &mut ids);
            }
        } else {
            for (idx, line) in content.lines().enumerate() {
                if let Some(caps) = SCHEMA_LINE_RE.captures(line) {
                    ids.push((caps[1].to_string(), line_no(idx)));
                }
            }
        }

        // Best effort line numbers for JSON hits
        if extension(rel) == "json" {
            for (id, line) in &mut ids {
                if let Some(idx) = content
                    .lines()
                    .position(|l| l.contains("schema_id") && l.contains(id.as_str()))
                {
                    *line = line_no(idx);
                }
            }
        }

        ids.sort();
        ids.dedup();
        ids.into_iter()
            .map(|(id, line)| {
                if declaring {
                    RawRef::SchemaDecl { id, line }
                } else {
                    RawRef::SchemaRef { id, line }
                }
            })
            .collect()
    }
}

fn collect_schema_ids(value: &Value, out: &mut Vec<(String, u32)>) {
    let mut stack = vec![value];
    while let Some(current) = stack.pop() {
        match current {
            Value::Object(map) => {
                if let Some(id) = map.get("schema_id").and_then(Value::as_str) {
                    if !id.is_empty() {
                        out.push((id.to_string(), 0));
                    }
                }
                stack.extend(map.values());
            }
            Value::Array(items) => stack.extend(items.iter()),
            _ => {}
        }
    }
}
