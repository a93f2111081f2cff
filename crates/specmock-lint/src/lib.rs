//! Stub file linting for specmock.
//!
//! Catches what would make the stub server skip or reject a stub file, before
//! it is loaded: unknown keys (with a suggestion for the key that was likely
//! meant), missing fields, bad status codes, invalid `bodyRegex`, negative
//! delays, malformed type tokens and duplicate stub ids across files. With a
//! contract, stubs are also checked against it the way the server does.
//!
//! # Example
//!
//! ```no_run
//! use specmock_lint::{lint_paths, LintOptions};
//! use std::path::PathBuf;
//!
//! let result = lint_paths(&[PathBuf::from("./stubs")], &LintOptions::default());
//! if result.has_errors() {
//!     eprintln!("Found {} errors", result.errors);
//! }
//! ```

mod types;
mod validator;

use specmock_stub::stub::discover_stub_files;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use types::{LintIssue, LintOptions, LintResult, Severity};

pub use validator::{
    fix_stub, validate_request, validate_response, validate_stub, validate_text_map, REQUEST_KEYS,
    RESPONSE_KEYS, STUB_KEYS,
};

/// Read and parse one stub file.
pub fn load_stub_file(path: &Path) -> Result<serde_json::Value, LintIssue> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LintIssue::error("E001", format!("Failed to read file: {e}"), path.to_path_buf())
    })?;
    serde_json::from_str(&content).map_err(|e| {
        LintIssue::error("E002", format!("Invalid JSON: {e}"), path.to_path_buf())
            .with_suggestion("Check for JSON syntax errors")
    })
}

/// Lint a single stub file.
pub fn lint_file(path: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;
    match load_stub_file(path) {
        Ok(value) => validate_stub(path, &value, &mut result, options),
        Err(issue) => result.add_issue(issue),
    }
    result
}

/// Lint stub files and directories (searched recursively for `*.json`),
/// including the cross-file duplicate id check.
pub fn lint_paths(paths: &[PathBuf], options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    let mut ids: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for file in discover_stub_files(paths) {
        result.files_checked += 1;
        let value = match load_stub_file(&file) {
            Ok(value) => value,
            Err(issue) => {
                result.add_issue(issue);
                continue;
            }
        };
        if let Some(id) = value.get("http-stub-id").and_then(|v| v.as_str()) {
            ids.entry(id.to_string()).or_default().push(file.clone());
        }
        validate_stub(&file, &value, &mut result, options);
    }

    check_duplicate_ids(&ids, &mut result);
    result
}

fn check_duplicate_ids(ids: &BTreeMap<String, Vec<PathBuf>>, result: &mut LintResult) {
    for (id, files) in ids {
        if files.len() < 2 {
            continue;
        }
        let names: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
        for file in &files[1..] {
            result.add_issue(
                LintIssue::error(
                    "E008",
                    format!("http-stub-id '{id}' is used by {} files: {}", files.len(), names.join(", ")),
                    file.clone(),
                )
                .with_location("http-stub-id")
                .with_suggestion("Only the first file is loaded; give each stub a unique id"),
            );
        }
    }
}

/// Lint a JSON string directly (useful for in-memory validation).
pub fn lint_json(json: &str, source_name: &str, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;
    let path = Path::new(source_name);

    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(value) => validate_stub(path, &value, &mut result, options),
        Err(e) => result.add_issue(LintIssue::error(
            "E002",
            format!("Invalid JSON: {e}"),
            path.to_path_buf(),
        )),
    }
    result
}
