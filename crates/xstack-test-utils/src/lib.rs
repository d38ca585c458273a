//! Testing utilities for the xstack workspace
//!
//! [`TempRepo`] builds throwaway repositories with sources, gate tools and a
//! group registry, so integration tests exercise the real filesystem layout.

#![allow(missing_docs)]

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Repo-relative path of the group registry
pub const GROUPS_FILE: &str = "data/registries/gate_groups.json";

/// Repo-relative path of the override ledger
pub const OVERRIDES_FILE: &str = "docs/architecture/LOCKLIST_OVERRIDES.json";

/// Temporary repository fixture
#[derive(Debug)]
pub struct TempRepo {
    dir: TempDir,
    groups: Vec<Value>,
}

impl TempRepo {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp repo"),
            groups: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write a file (parents created)
    pub fn file(self, rel: &str, content: &str) -> Self {
        self.write(rel, content);
        self
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, content).expect("write fixture file");
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.join(rel)).expect("read fixture file")
    }

    pub fn read_json(&self, rel: &str) -> Value {
        serde_json::from_str(&self.read(rel)).expect("fixture json")
    }

    /// Write an executable `#!/bin/sh` script into `tools/bin/<name>`
    pub fn tool(self, name: &str, body: &str) -> Self {
        let rel = format!("tools/bin/{name}");
        self.write(&rel, &format!("#!/bin/sh\n{body}\n"));
        make_executable(&self.join(&rel));
        self
    }

    /// Tool that prints `output`, exits with `code`, and appends a line to
    /// `counter` on every invocation
    pub fn counting_tool(self, name: &str, counter: &Path, code: i32, output: &str) -> Self {
        let mut body = format!("echo run >> '{}'\n", counter.display());
        for line in output.lines() {
            body.push_str(&format!("echo '{line}'\n"));
        }
        body.push_str(&format!("exit {code}"));
        self.tool(name, &body)
    }

    /// Register a check group; the registry file is rewritten each time
    pub fn group(mut self, group_id: &str, command: &[&str], dep_roots: &[&str]) -> Self {
        self.groups.push(json!({
            "group_id": group_id,
            "suite": group_id.split('.').next().unwrap_or(group_id),
            "dep_roots": dep_roots,
            "paths": dep_roots,
            "runner_command": command,
            "profiles": ["FAST", "STRICT", "DEEP"],
            "deps": []
        }));
        self.flush_groups();
        self
    }

    /// Register a fully specified group document
    pub fn group_value(mut self, group: Value) -> Self {
        self.groups.push(group);
        self.flush_groups();
        self
    }

    pub fn overrides(self, entries: Value) -> Self {
        let doc = json!({"overrides": entries});
        self.write(OVERRIDES_FILE, &serde_json::to_string_pretty(&doc).expect("json"));
        self
    }

    fn flush_groups(&self) {
        let doc = json!({"groups": self.groups});
        self.write(GROUPS_FILE, &serde_json::to_string_pretty(&doc).expect("json"));
    }

    /// Number of lines in a counter file (0 if absent)
    pub fn count_lines(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

impl Default for TempRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
pub fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) {}

/// A small multi-language source tree used by graph and analyzer tests
pub fn sample_tree() -> TempRepo {
    TempRepo::new()
        .file("engine/include/core/api.h", "#pragma once\nint api(void);\n")
        .file(
            "engine/src/main.c",
            "#include \"core/api.h\"\n#include <stdio.h>\nint main(void) { return api(); }\n",
        )
        .file("engine/src/api.c", "#include \"../include/core/api.h\"\nint api(void) { return 0; }\n")
        .file("engine/src/orphan.c", "int orphan(void) { return 1; }\n")
        .file("scripts/tool/__init__.py", "")
        .file("scripts/tool/util.py", "def helper():\n    return 1\n")
        .file("scripts/run.py", "import os\nfrom tool.util import helper\n")
        .file("web/index.ts", "import { x } from './lib/x';\n")
        .file("web/lib/x.ts", "export const x = 1;\n")
        .file(
            "schema/session.schema.json",
            "{\"schema_id\": \"dom.session\", \"type\": \"object\"}\n",
        )
        .file(
            "packs/base/pack.json",
            "{\"pack_id\": \"base\", \"requires\": [], \"provides\": [\"dom.session\"]}\n",
        )
        .file(
            "packs/extra/pack.json",
            "{\"pack_id\": \"extra\", \"requires\": [\"base\", \"ghost\"], \"provides\": []}\n",
        )
        .file("data/session.json", "{\"schema_id\": \"dom.session\", \"value\": 1}\n")
        .file("docs/README.md", "# Readme\n")
        .file("legacy/old.c", "int old;\n")
        .file("out/build/junk.c", "int junk;\n")
}
