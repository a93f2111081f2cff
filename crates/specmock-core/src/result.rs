//! Match results and failure diagnostics.
//!
//! Every validation path returns a [`MatchResult`]. A [`Failure`] carries the
//! breadcrumb segment of the level that produced it plus the nested failures
//! that caused it, so the full path of a leaf failure is the concatenation of
//! the segments from the root down (`body.items.[2].price`).

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// Outcome of a match, encompass or response check.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Success,
    Failure(Failure),
}

/// Machine-readable classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    TypeMismatch,
    ValueMismatch,
    ConstraintViolation,
    MissingKey,
    UnexpectedKey,
    NoMatchingVariant,
    Incompatible,
    MethodMismatch,
    PathMismatch,
    StatusMismatch,
    RegexMismatch,
    ContractViolation,
}

/// Rule-violation metadata attached to a failure for reporting tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RuleViolation {
    pub id: &'static str,
    pub title: &'static str,
}

impl RuleViolation {
    pub const TYPE_MISMATCH: RuleViolation = RuleViolation {
        id: "R1001",
        title: "Type mismatch",
    };
    pub const VALUE_MISMATCH: RuleViolation = RuleViolation {
        id: "R1002",
        title: "Value mismatch",
    };
    pub const CONSTRAINT_VIOLATION: RuleViolation = RuleViolation {
        id: "R1003",
        title: "Constraint violation",
    };
    pub const MISSING_REQUIRED_KEY: RuleViolation = RuleViolation {
        id: "R2001",
        title: "Missing required property",
    };
    pub const UNEXPECTED_KEY: RuleViolation = RuleViolation {
        id: "R2002",
        title: "Unexpected property",
    };
    pub const NO_MATCHING_VARIANT: RuleViolation = RuleViolation {
        id: "R3001",
        title: "No matching union variant",
    };
    pub const BACKWARD_INCOMPATIBLE: RuleViolation = RuleViolation {
        id: "R4001",
        title: "Backward incompatible change",
    };
}

/// A single failure node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Failure {
    pub message: String,
    /// Path segment contributed by this level, if any.
    pub breadcrumb: Option<String>,
    pub causes: Vec<Failure>,
    /// Advisory failures are partial; hard errors are not.
    pub is_partial: bool,
    pub reason: Option<FailureReason>,
    pub rule: Option<RuleViolation>,
}

/// A flattened leaf failure with its full breadcrumb path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEntry {
    pub breadcrumb: String,
    pub message: String,
    pub is_partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<&'static str>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Failure caused by a value of the wrong type.
    pub fn type_mismatch(expected: impl fmt::Display, actual: &crate::Value) -> Self {
        Failure::new(format!(
            "Expected {expected}, actual was {} {}",
            actual.type_name(),
            actual.display_short()
        ))
        .with_reason(FailureReason::TypeMismatch)
        .with_rule(RuleViolation::TYPE_MISMATCH)
    }

    /// A parent failure grouping several causes.
    pub fn aggregate(message: impl Into<String>, causes: Vec<Failure>) -> Self {
        Self {
            message: message.into(),
            causes,
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: FailureReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_rule(mut self, rule: RuleViolation) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn partial(mut self) -> Self {
        self.is_partial = true;
        self
    }

    /// Prefix this failure's path with `segment`.
    ///
    /// A failure that already carries a segment is wrapped in a new parent so
    /// both segments survive.
    pub fn with_breadcrumb(self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        if self.breadcrumb.is_none() {
            return Failure {
                breadcrumb: Some(segment),
                ..self
            };
        }
        Failure {
            breadcrumb: Some(segment),
            is_partial: self.is_partial,
            causes: vec![self],
            ..Default::default()
        }
    }

    /// Leaf failures with their full breadcrumb paths, in depth-first order.
    pub fn entries(&self) -> Vec<FailureEntry> {
        let mut out = Vec::new();
        self.collect_entries(&[], &mut out);
        out
    }

    fn collect_entries(&self, parent: &[String], out: &mut Vec<FailureEntry>) {
        let mut path = parent.to_vec();
        if let Some(segment) = &self.breadcrumb {
            path.push(segment.clone());
        }
        if self.causes.is_empty() {
            out.push(FailureEntry {
                breadcrumb: path.join("."),
                message: self.message.clone(),
                is_partial: self.is_partial,
                reason: self.reason,
                rule_id: self.rule.map(|r| r.id),
            });
            return;
        }
        for cause in &self.causes {
            cause.collect_entries(&path, out);
        }
    }

    /// Human-readable multi-line report.
    pub fn report(&self) -> String {
        let mut out = String::new();
        self.write_report(&[], 0, &mut out);
        out.trim_end().to_string()
    }

    fn write_report(&self, parent: &[String], depth: usize, out: &mut String) {
        let mut path = parent.to_vec();
        if let Some(segment) = &self.breadcrumb {
            path.push(segment.clone());
        }
        let indent = "  ".repeat(depth);
        let has_text = !self.message.is_empty();
        if has_text {
            if !path.is_empty() {
                out.push_str(&format!("{indent}>> {}\n", path.join(".")));
            }
            let marker = if self.is_partial { " (warning)" } else { "" };
            out.push_str(&format!("{indent}   {}{marker}\n", self.message));
        }
        let next_depth = if has_text { depth + 1 } else { depth };
        for cause in &self.causes {
            cause.write_report(&path, next_depth, out);
        }
    }
}

impl MatchResult {
    pub fn failure(message: impl Into<String>) -> Self {
        MatchResult::Failure(Failure::new(message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MatchResult::Success)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// True only for failures where every leaf is advisory.
    pub fn is_partial_failure(&self) -> bool {
        match self {
            MatchResult::Success => false,
            MatchResult::Failure(f) => f.entries().iter().all(|e| e.is_partial),
        }
    }

    pub fn failure_ref(&self) -> Option<&Failure> {
        match self {
            MatchResult::Success => None,
            MatchResult::Failure(f) => Some(f),
        }
    }

    pub fn into_failure(self) -> Option<Failure> {
        match self {
            MatchResult::Success => None,
            MatchResult::Failure(f) => Some(f),
        }
    }

    pub fn breadcrumb(self, segment: impl Into<String>) -> Self {
        match self {
            MatchResult::Success => MatchResult::Success,
            MatchResult::Failure(f) => MatchResult::Failure(f.with_breadcrumb(segment)),
        }
    }

    /// Combine results, keeping every failure.
    ///
    /// A single failure is returned as-is; several become causes of one
    /// aggregate failure with no message of its own.
    pub fn from_results(results: impl IntoIterator<Item = MatchResult>) -> Self {
        let failures: Vec<Failure> = results
            .into_iter()
            .filter_map(MatchResult::into_failure)
            .collect();
        Self::from_failures(failures)
    }

    pub fn from_failures(mut failures: Vec<Failure>) -> Self {
        match failures.len() {
            0 => MatchResult::Success,
            1 => MatchResult::Failure(failures.remove(0)),
            _ => MatchResult::Failure(Failure::aggregate("", failures)),
        }
    }

    /// Run `next` only if this result is a success.
    pub fn and_then<E>(self, next: impl FnOnce() -> Result<MatchResult, E>) -> Result<MatchResult, E> {
        match self {
            MatchResult::Success => next(),
            failure => Ok(failure),
        }
    }

    pub fn entries(&self) -> Vec<FailureEntry> {
        self.failure_ref().map(Failure::entries).unwrap_or_default()
    }

    pub fn report(&self) -> String {
        match self {
            MatchResult::Success => String::new(),
            MatchResult::Failure(f) => f.report(),
        }
    }

    /// Machine-readable form for telemetry and API responses.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MatchResult::Success => serde_json::json!({"result": "success"}),
            MatchResult::Failure(_) => serde_json::json!({
                "result": "failure",
                "failures": self.entries(),
            }),
        }
    }
}

/// Merges failures that describe the same logical problem.
///
/// Failures are grouped by `(breadcrumb, reason, rule id)`; each group keeps
/// the first message, concatenates the causes (de-duplicated recursively)
/// and is partial only if every member was partial. Unclassified failures
/// (no reason, no rule) only merge when their messages are identical.
#[derive(Debug, Default)]
pub struct FailureDeDuper;

impl FailureDeDuper {
    pub fn dedupe(failures: Vec<Failure>) -> Vec<Failure> {
        type Key = (
            Option<String>,
            Option<FailureReason>,
            Option<&'static str>,
            Option<String>,
        );
        let mut groups: IndexMap<Key, Failure> = IndexMap::new();

        for failure in failures {
            let unclassified = failure.reason.is_none() && failure.rule.is_none();
            let key = (
                failure.breadcrumb.clone(),
                failure.reason,
                failure.rule.map(|r| r.id),
                unclassified.then(|| failure.message.clone()),
            );
            match groups.get_mut(&key) {
                Some(existing) => {
                    existing.is_partial = existing.is_partial && failure.is_partial;
                    existing.causes.extend(failure.causes);
                }
                None => {
                    groups.insert(key, failure);
                }
            }
        }

        groups
            .into_values()
            .map(|mut f| {
                f.causes = Self::dedupe(std::mem::take(&mut f.causes));
                f
            })
            .collect()
    }

    /// De-duplicate the cause tree of a result.
    pub fn dedupe_result(result: MatchResult) -> MatchResult {
        match result {
            MatchResult::Success => MatchResult::Success,
            MatchResult::Failure(mut f) => {
                f.causes = Self::dedupe(std::mem::take(&mut f.causes));
                MatchResult::Failure(f)
            }
        }
    }
}
