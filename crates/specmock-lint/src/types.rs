//! Core types for the linting library.

use serde::Serialize;
use specmock_stub::Contract;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Severity level of a lint issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The server will reject the stub.
    Error,
    /// The stub loads but probably does not do what was intended.
    Warning,
    Info,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// A single lint issue found during validation.
#[derive(Debug, Clone, Serialize)]
pub struct LintIssue {
    pub severity: Severity,
    /// Issue code (e.g., "E004", "W002").
    pub code: String,
    pub message: String,
    #[serde(serialize_with = "serialize_path")]
    pub file: PathBuf,
    /// Location within the stub (e.g., "http-request.headers.X-Flag").
    pub location: Option<String>,
    pub suggestion: Option<String>,
}

fn serialize_path<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&path.to_string_lossy())
}

impl LintIssue {
    fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>, file: PathBuf) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            file,
            location: None,
            suggestion: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, file: PathBuf) -> Self {
        Self::new(Severity::Error, code, message, file)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>, file: PathBuf) -> Self {
        Self::new(Severity::Warning, code, message, file)
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>, file: PathBuf) -> Self {
        Self::new(Severity::Info, code, message, file)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Issues found across a lint run, with running counts per severity.
#[derive(Debug, Default, Serialize)]
pub struct LintResult {
    pub issues: Vec<LintIssue>,
    pub files_checked: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl LintResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(&mut self, issue: LintIssue) {
        match issue.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Info => {}
        }
        self.issues.push(issue);
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Whether the run should fail: any error, or with `strict` any warning.
    pub fn fails(&self, strict: bool) -> bool {
        self.errors > 0 || (strict && self.warnings > 0)
    }

    /// Issues grouped by file in path order, optionally errors only.
    pub fn by_file(&self, errors_only: bool) -> BTreeMap<&Path, Vec<&LintIssue>> {
        let mut grouped: BTreeMap<&Path, Vec<&LintIssue>> = BTreeMap::new();
        for issue in &self.issues {
            if errors_only && issue.severity != Severity::Error {
                continue;
            }
            grouped.entry(issue.file.as_path()).or_default().push(issue);
        }
        grouped
    }

    #[cfg(test)]
    pub(crate) fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a LintIssue> + 'a {
        self.issues.iter().filter(move |i| i.code == code)
    }
}

/// Options for validation.
#[derive(Debug, Clone, Default)]
pub struct LintOptions {
    /// Enable verbose output (for CLI).
    pub verbose: bool,
    /// When set, stubs that pass the shape checks are also validated
    /// against this contract, exactly as the server would on load.
    pub contract: Option<Contract>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_strictness() {
        let mut result = LintResult::new();
        result.add_issue(LintIssue::warning("W001", "meh", PathBuf::from("b.json")));
        result.add_issue(LintIssue::info("I001", "fyi", PathBuf::from("a.json")));
        assert_eq!((result.errors, result.warnings), (0, 1));
        assert!(!result.fails(false));
        assert!(result.fails(true));

        result.add_issue(LintIssue::error("E001", "bad", PathBuf::from("b.json")));
        assert!(result.fails(false));
    }

    #[test]
    fn test_by_file_groups_in_path_order() {
        let mut result = LintResult::new();
        result.add_issue(LintIssue::warning("W001", "meh", PathBuf::from("b.json")));
        result.add_issue(LintIssue::error("E004", "key", PathBuf::from("b.json")));
        result.add_issue(LintIssue::info("I001", "fyi", PathBuf::from("a.json")));

        let all = result.by_file(false);
        let files: Vec<_> = all.keys().map(|p| p.to_string_lossy().into_owned()).collect();
        assert_eq!(files, vec!["a.json", "b.json"]);
        assert_eq!(all[Path::new("b.json")].len(), 2);

        let errors = result.by_file(true);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[Path::new("b.json")][0].code, "E004");
    }

    #[test]
    fn test_issue_serializes_path_as_string() {
        let issue = LintIssue::error("E004", "Unknown key", PathBuf::from("stubs/a.json"))
            .with_location("http-request.mehtod");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["file"], "stubs/a.json");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["location"], "http-request.mehtod");
    }
}
