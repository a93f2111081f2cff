//! Core validation logic for stub files.

use crate::types::{LintIssue, LintOptions, LintResult};
use regex::Regex;
use serde_json::{Map, Value};
use specmock_core::{FuzzyKeyMatcher, Pattern};
use specmock_stub::http::check_header;
use specmock_stub::{Contract, StubDocument, StubEntry, StubError, StubOrigin};
use std::path::Path;
use std::time::Duration;

pub const STUB_KEYS: &[&str] = &["http-stub-id", "delay-in-seconds", "http-request", "http-response"];
pub const REQUEST_KEYS: &[&str] = &["method", "path", "query", "headers", "body", "bodyRegex"];
pub const RESPONSE_KEYS: &[&str] = &["status", "headers", "body", "externalisedResponseCommand"];

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "TRACE", "CONNECT"];

/// Delays above this many seconds are flagged.
const LONG_DELAY_SECONDS: f64 = 60.0;

/// Validate one stub document.
pub fn validate_stub(file: &Path, stub: &Value, result: &mut LintResult, options: &LintOptions) {
    let Some(stub_obj) = stub.as_object() else {
        result.add_issue(LintIssue::error("E003", "Stub must be a JSON object", file.to_path_buf()));
        return;
    };
    let errors_before = result.errors;

    check_keys(file, stub_obj, STUB_KEYS, None, result);
    for field in ["http-request", "http-response"] {
        if !stub_obj.contains_key(field) {
            result.add_issue(
                LintIssue::error("E003", format!("Missing required field: {field}"), file.to_path_buf())
                    .with_suggestion(format!("Add \"{field}\" to the stub")),
            );
        }
    }

    match stub_obj.get("http-stub-id") {
        None => result.add_issue(
            LintIssue::info("I001", "Stub has no http-stub-id", file.to_path_buf())
                .with_suggestion("Without an id the stub gets a generated token"),
        ),
        Some(Value::String(id)) if !id.trim().is_empty() => {}
        Some(_) => result.add_issue(
            LintIssue::error("E003", "http-stub-id must be a non-empty string", file.to_path_buf())
                .with_location("http-stub-id"),
        ),
    }

    if let Some(delay) = stub_obj.get("delay-in-seconds") {
        validate_delay(file, delay, result);
    }
    if let Some(request) = stub_obj.get("http-request") {
        validate_request(file, request, result);
    }
    if let Some(response) = stub_obj.get("http-response") {
        validate_response(file, response, result);
    }

    // The server's own checks only run once the shape is right.
    if result.errors == errors_before {
        validate_compiled(file, stub, result, options);
    }
}

/// Flag keys the server would reject, suggesting the key that was likely meant.
fn check_keys(
    file: &Path,
    obj: &Map<String, Value>,
    known: &[&str],
    parent: Option<&str>,
    result: &mut LintResult,
) {
    let matcher = FuzzyKeyMatcher::new(known.iter().copied());
    for key in obj.keys() {
        if known.contains(&key.as_str()) {
            continue;
        }
        let location = match parent {
            Some(parent) => format!("{parent}.{key}"),
            None => key.clone(),
        };
        let issue = LintIssue::error("E004", format!("Unknown key: {key}"), file.to_path_buf())
            .with_location(location);
        let issue = match matcher.suggest(key) {
            Some(suggestion) => issue.with_suggestion(format!("Did you mean \"{suggestion}\"?")),
            None => issue.with_suggestion(format!("Allowed keys: {}", known.join(", "))),
        };
        result.add_issue(issue);
    }
}

fn validate_delay(file: &Path, delay: &Value, result: &mut LintResult) {
    match delay.as_f64() {
        Some(seconds) if seconds < 0.0 => result.add_issue(
            LintIssue::error(
                "E007",
                format!("delay-in-seconds is negative ({seconds})"),
                file.to_path_buf(),
            )
            .with_location("delay-in-seconds")
            .with_suggestion("Use 0 or a positive number of seconds"),
        ),
        Some(seconds) if Duration::try_from_secs_f64(seconds).is_err() => result.add_issue(
            LintIssue::error(
                "E007",
                format!("delay-in-seconds is too large ({seconds})"),
                file.to_path_buf(),
            )
            .with_location("delay-in-seconds"),
        ),
        Some(seconds) if seconds > LONG_DELAY_SECONDS => result.add_issue(
            LintIssue::warning(
                "W005",
                format!("delay-in-seconds is very long ({seconds}s)"),
                file.to_path_buf(),
            )
            .with_location("delay-in-seconds")
            .with_suggestion("Clients will likely time out first"),
        ),
        Some(_) => {}
        None => result.add_issue(
            LintIssue::error("E007", "delay-in-seconds must be a number", file.to_path_buf())
                .with_location("delay-in-seconds"),
        ),
    }
}

/// Validate the `http-request` section.
pub fn validate_request(file: &Path, request: &Value, result: &mut LintResult) {
    let Some(request_obj) = request.as_object() else {
        result.add_issue(
            LintIssue::error("E003", "http-request must be an object", file.to_path_buf())
                .with_location("http-request"),
        );
        return;
    };
    check_keys(file, request_obj, REQUEST_KEYS, Some("http-request"), result);

    match request_obj.get("method").map(|m| m.as_str()) {
        None => result.add_issue(
            LintIssue::error("E003", "Missing required field: method", file.to_path_buf())
                .with_location("http-request"),
        ),
        Some(Some(method)) if HTTP_METHODS.contains(&method.to_ascii_uppercase().as_str()) => {}
        Some(Some(method)) if !method.trim().is_empty() => result.add_issue(
            LintIssue::warning("W001", format!("Unusual HTTP method: {method}"), file.to_path_buf())
                .with_location("http-request.method"),
        ),
        Some(_) => result.add_issue(
            LintIssue::error("E003", "method must be a non-empty string", file.to_path_buf())
                .with_location("http-request.method"),
        ),
    }

    match request_obj.get("path").map(|p| p.as_str()) {
        None => result.add_issue(
            LintIssue::error("E003", "Missing required field: path", file.to_path_buf())
                .with_location("http-request"),
        ),
        Some(Some(path)) if path.starts_with('/') => {
            let path = path.split('?').next().unwrap_or_default();
            for segment in path.split('/').filter(|s| Pattern::is_token(s)) {
                check_token(file, segment, "http-request.path", result);
            }
        }
        Some(Some(path)) => result.add_issue(
            LintIssue::error("E009", format!("Path must start with '/': {path}"), file.to_path_buf())
                .with_location("http-request.path")
                .with_suggestion(format!("Use \"/{path}\"")),
        ),
        Some(None) => result.add_issue(
            LintIssue::error("E003", "path must be a string", file.to_path_buf())
                .with_location("http-request.path"),
        ),
    }

    if let Some(headers) = request_obj.get("headers") {
        validate_text_map(file, headers, "http-request.headers", result);
    }
    if let Some(query) = request_obj.get("query") {
        validate_text_map(file, query, "http-request.query", result);
    }
    if let Some(body) = request_obj.get("body") {
        check_tokens(file, body, "http-request.body", result);
    }

    if let Some(body_regex) = request_obj.get("bodyRegex") {
        match body_regex.as_str() {
            Some(pattern) => {
                if let Err(e) = Regex::new(pattern) {
                    result.add_issue(
                        LintIssue::error("E006", format!("Invalid bodyRegex: {e}"), file.to_path_buf())
                            .with_location("http-request.bodyRegex")
                            .with_suggestion("Check regex syntax"),
                    );
                }
            }
            None => result.add_issue(
                LintIssue::error("E006", "bodyRegex must be a string", file.to_path_buf())
                    .with_location("http-request.bodyRegex"),
            ),
        }
        if request_obj.contains_key("body") {
            result.add_issue(
                LintIssue::warning("W002", "Both body and bodyRegex are set", file.to_path_buf())
                    .with_location("http-request")
                    .with_suggestion("bodyRegex is used and body is ignored; remove one"),
            );
        }
    }
}

/// Validate the `http-response` section.
pub fn validate_response(file: &Path, response: &Value, result: &mut LintResult) {
    let Some(response_obj) = response.as_object() else {
        result.add_issue(
            LintIssue::error("E003", "http-response must be an object", file.to_path_buf())
                .with_location("http-response"),
        );
        return;
    };
    check_keys(file, response_obj, RESPONSE_KEYS, Some("http-response"), result);

    match response_obj.get("status").map(Value::as_u64) {
        None => result.add_issue(
            LintIssue::error("E003", "Missing required field: status", file.to_path_buf())
                .with_location("http-response"),
        ),
        Some(Some(code)) if (100..=599).contains(&code) => {}
        Some(Some(code)) => result.add_issue(
            LintIssue::error("E005", format!("Invalid HTTP status code: {code}"), file.to_path_buf())
                .with_location("http-response.status")
                .with_suggestion("Use a valid HTTP status code (100-599)"),
        ),
        Some(None) => result.add_issue(
            LintIssue::error("E005", "status must be a number", file.to_path_buf())
                .with_location("http-response.status"),
        ),
    }

    if let Some(headers) = response_obj.get("headers") {
        validate_text_map(file, headers, "http-response.headers", result);
        check_sendable_headers(file, headers, result);
    }
    if let Some(body) = response_obj.get("body") {
        check_tokens(file, body, "http-response.body", result);
    }

    if let Some(command) = response_obj.get("externalisedResponseCommand") {
        if command.as_str().is_none_or(|c| c.trim().is_empty()) {
            result.add_issue(
                LintIssue::error(
                    "E003",
                    "externalisedResponseCommand must be a non-empty string",
                    file.to_path_buf(),
                )
                .with_location("http-response.externalisedResponseCommand"),
            );
        } else if response_obj.contains_key("body") {
            result.add_issue(
                LintIssue::warning(
                    "W003",
                    "Body is ignored when externalisedResponseCommand is set",
                    file.to_path_buf(),
                )
                .with_location("http-response.body"),
            );
        }
    }
}

/// Validate headers or query parameters: an object of scalar values.
pub fn validate_text_map(file: &Path, map: &Value, location: &str, result: &mut LintResult) {
    let Some(map_obj) = map.as_object() else {
        result.add_issue(
            LintIssue::error("E013", "Must be an object", file.to_path_buf()).with_location(location),
        );
        return;
    };

    for (name, value) in map_obj {
        let at = format!("{location}.{name}");
        if name.trim_end_matches('?').is_empty() {
            result.add_issue(LintIssue::error("E013", "Empty name", file.to_path_buf()).with_location(location));
        }
        match value {
            Value::String(text) if Pattern::is_token(text) => check_token(file, text, &at, result),
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
            Value::Array(_) => result.add_issue(
                LintIssue::error(
                    "E013",
                    format!("'{name}' value is an array, must be a string"),
                    file.to_path_buf(),
                )
                .with_location(at)
                .with_suggestion("Convert array to comma-separated string"),
            ),
            Value::Object(_) => result.add_issue(
                LintIssue::error(
                    "E013",
                    format!("'{name}' value is an object, must be a string"),
                    file.to_path_buf(),
                )
                .with_location(at),
            ),
            Value::Null => result.add_issue(
                LintIssue::warning("W004", format!("'{name}' value is null"), file.to_path_buf())
                    .with_location(at)
                    .with_suggestion("Remove it or set a string value"),
            ),
        }
    }
}

/// Response headers are sent verbatim, so names and values must be valid
/// HTTP.
fn check_sendable_headers(file: &Path, headers: &Value, result: &mut LintResult) {
    let Some(headers) = headers.as_object() else {
        return;
    };
    for (name, value) in headers {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(_) | Value::Bool(_) => value.to_string(),
            _ => continue,
        };
        if let Err(reason) = check_header(name, &text) {
            result.add_issue(
                LintIssue::error("E013", reason, file.to_path_buf())
                    .with_location(format!("http-response.headers.{name}")),
            );
        }
    }
}

/// Check every type token inside a body template.
fn check_tokens(file: &Path, value: &Value, location: &str, result: &mut LintResult) {
    match value {
        Value::String(text) if Pattern::is_token(text) => check_token(file, text, location, result),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                check_tokens(file, item, &format!("{location}[{i}]"), result);
            }
        }
        Value::Object(obj) => {
            for (key, item) in obj {
                check_tokens(file, item, &format!("{location}.{key}"), result);
            }
        }
        _ => {}
    }
}

fn check_token(file: &Path, token: &str, location: &str, result: &mut LintResult) {
    if let Err(e) = Pattern::parse_token(token) {
        result.add_issue(
            LintIssue::error("E010", format!("Malformed type token {token}: {e}"), file.to_path_buf())
                .with_location(location),
        );
    }
}

/// Compile the stub the way the server does, against the configured
/// contract if any.
fn validate_compiled(file: &Path, stub: &Value, result: &mut LintResult, options: &LintOptions) {
    let empty = Contract::empty();
    let contract = options.contract.as_ref().unwrap_or(&empty);
    let compiled = StubDocument::from_json(stub.clone()).and_then(|document| {
        StubEntry::compile(document, StubOrigin::File, file.display().to_string(), contract)
    });
    match compiled {
        Ok(_) => {}
        Err(StubError::ContractMismatch { report }) => result.add_issue(
            LintIssue::error("E011", "Stub does not match the contract", file.to_path_buf())
                .with_suggestion(report),
        ),
        Err(e) => result.add_issue(LintIssue::error("E012", format!("Stub rejected: {e}"), file.to_path_buf())),
    }
}

/// Rewrite what can be fixed mechanically: misspelled keys that resolve to
/// exactly one known key, and array header/query values. Returns a line per
/// fix applied.
pub fn fix_stub(stub: &mut Value) -> Vec<String> {
    let mut fixes = Vec::new();
    let Some(stub_obj) = stub.as_object_mut() else {
        return fixes;
    };
    rename_keys(stub_obj, STUB_KEYS, "", &mut fixes);
    if let Some(request) = stub_obj.get_mut("http-request").and_then(Value::as_object_mut) {
        rename_keys(request, REQUEST_KEYS, "http-request.", &mut fixes);
        for section in ["headers", "query"] {
            if let Some(map) = request.get_mut(section).and_then(Value::as_object_mut) {
                join_arrays(map, &format!("http-request.{section}."), &mut fixes);
            }
        }
    }
    if let Some(response) = stub_obj.get_mut("http-response").and_then(Value::as_object_mut) {
        rename_keys(response, RESPONSE_KEYS, "http-response.", &mut fixes);
        if let Some(map) = response.get_mut("headers").and_then(Value::as_object_mut) {
            join_arrays(map, "http-response.headers.", &mut fixes);
        }
    }
    fixes
}

fn rename_keys(obj: &mut Map<String, Value>, known: &[&str], prefix: &str, fixes: &mut Vec<String>) {
    let matcher = FuzzyKeyMatcher::new(known.iter().copied());
    let renames: Vec<(String, String)> = obj
        .keys()
        .filter(|k| !known.contains(&k.as_str()))
        .filter_map(|k| matcher.suggest(k).map(|s| (k.clone(), s.to_string())))
        .collect();
    for (from, to) in renames {
        if obj.contains_key(&to) {
            continue;
        }
        if let Some(value) = obj.remove(&from) {
            obj.insert(to.clone(), value);
            fixes.push(format!("Renamed {prefix}{from} -> {prefix}{to}"));
        }
    }
}

fn join_arrays(map: &mut Map<String, Value>, prefix: &str, fixes: &mut Vec<String>) {
    for (name, value) in map.iter_mut() {
        if let Value::Array(items) = value {
            let joined: Vec<String> = items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            *value = Value::String(joined.join(", "));
            fixes.push(format!("Joined {prefix}{name} array -> string"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn lint(stub: Value) -> LintResult {
        let mut result = LintResult::new();
        validate_stub(&PathBuf::from("stub.json"), &stub, &mut result, &LintOptions::default());
        result
    }

    fn valid() -> Value {
        json!({
            "http-stub-id": "item",
            "http-request": {"method": "GET", "path": "/items/(number)"},
            "http-response": {"status": 200, "body": {"id": "(number)"}}
        })
    }

    #[test]
    fn test_valid_stub_has_no_issues() {
        let result = lint(valid());
        assert!(result.issues.is_empty(), "{:?}", result.issues);
    }

    #[test]
    fn test_unknown_keys_get_suggestions() {
        let result = lint(json!({
            "http-stub-id": "item",
            "http-reqest": {"method": "GET", "path": "/items"},
            "http-response": {"status": 200, "bodyregex": "x"}
        }));
        let unknown: Vec<_> = result.with_code("E004").collect();
        assert_eq!(unknown.len(), 2);
        assert_eq!(unknown[0].location.as_deref(), Some("http-reqest"));
        assert_eq!(
            unknown[0].suggestion.as_deref(),
            Some("Did you mean \"http-request\"?")
        );
        assert_eq!(unknown[1].location.as_deref(), Some("http-response.bodyregex"));
        assert!(unknown[1].suggestion.as_deref().unwrap().starts_with("Allowed keys"));
        // missing http-request is reported as well
        assert_eq!(result.with_code("E003").count(), 1);
    }

    #[test]
    fn test_request_key_typo_is_resolved() {
        let result = lint(json!({
            "http-request": {"methd": "GET", "method": "GET", "path": "/x"},
            "http-response": {"status": 200}
        }));
        let issue = result.with_code("E004").next().unwrap();
        assert_eq!(issue.location.as_deref(), Some("http-request.methd"));
        assert_eq!(issue.suggestion.as_deref(), Some("Did you mean \"method\"?"));
    }

    #[test]
    fn test_negative_delay_and_bad_regex() {
        let mut stub = valid();
        stub["delay-in-seconds"] = json!(-2);
        stub["http-request"]["bodyRegex"] = json!("([a-z");
        let result = lint(stub);
        assert_eq!(result.with_code("E007").count(), 1);
        assert_eq!(result.with_code("E006").count(), 1);
    }

    #[test]
    fn test_oversized_delay_and_unsendable_header() {
        let mut stub = valid();
        stub["delay-in-seconds"] = json!(1e20);
        stub["http-response"]["headers"] = json!({"X-Bad": "a\nb", "Bad Name": "x"});
        let result = lint(stub);
        let delay = result.with_code("E007").next().unwrap();
        assert!(delay.message.contains("too large"));
        assert_eq!(result.with_code("W005").count(), 0);
        let mut headers: Vec<_> = result.with_code("E013").filter_map(|i| i.location.as_deref()).collect();
        headers.sort_unstable();
        assert_eq!(headers, vec!["http-response.headers.Bad Name", "http-response.headers.X-Bad"]);
        assert_eq!(result.with_code("E012").count(), 0);
    }

    #[test]
    fn test_status_path_and_headers() {
        let result = lint(json!({
            "http-request": {"method": "GET", "path": "items", "headers": {"Accept": ["a", "b"]}},
            "http-response": {"status": 700}
        }));
        assert_eq!(result.with_code("E009").count(), 1);
        assert_eq!(result.with_code("E005").count(), 1);
        assert_eq!(result.with_code("E013").count(), 1);
    }

    #[test]
    fn test_malformed_token() {
        let mut stub = valid();
        stub["http-response"]["body"] = json!({"id": "()"});
        let result = lint(stub);
        let issue = result.with_code("E010").next().unwrap();
        assert_eq!(issue.location.as_deref(), Some("http-response.body.id"));
        assert_eq!(result.with_code("E012").count(), 0);
    }

    #[test]
    fn test_warnings() {
        let result = lint(json!({
            "http-stub-id": "w",
            "delay-in-seconds": 120,
            "http-request": {"method": "BREW", "path": "/pot", "body": {"a": 1}, "bodyRegex": "a"},
            "http-response": {"status": 418, "body": {}, "externalisedResponseCommand": "echo {}"}
        }));
        for code in ["W001", "W002", "W003", "W005"] {
            assert_eq!(result.with_code(code).count(), 1, "{code}: {:?}", result.issues);
        }
        assert!(!result.has_errors(), "{:?}", result.issues);
    }

    #[test]
    fn test_contract_mismatch_is_reported() {
        let contract = Contract::parse(
            "items.yaml",
            r#"
operations:
  - method: GET
    path: /items/(id:number)
    response:
      status: 200
      body: { id: "(number)" }
"#,
        )
        .unwrap();
        let options = LintOptions {
            contract: Some(contract),
            ..Default::default()
        };
        let mut result = LintResult::new();
        let stub = json!({
            "http-stub-id": "bad",
            "http-request": {"method": "GET", "path": "/items/1"},
            "http-response": {"status": 200, "body": {"id": "one"}}
        });
        validate_stub(&PathBuf::from("bad.json"), &stub, &mut result, &options);
        let issue = result.with_code("E011").next().unwrap();
        assert!(issue.suggestion.as_deref().unwrap().contains("RESPONSE.BODY.id"));
    }

    #[test]
    fn test_fix_renames_and_joins() {
        let mut stub = json!({
            "http-reqest": {"methd": "GET", "path": "/x", "headers": {"Accept": ["a", "b"]}},
            "http-response": {"status": 200}
        });
        let fixes = fix_stub(&mut stub);
        assert_eq!(fixes.len(), 3, "{fixes:?}");
        assert_eq!(stub["http-request"]["method"], "GET");
        assert_eq!(stub["http-request"]["headers"]["Accept"], "a, b");
        assert!(lint(stub).issues.iter().all(|i| i.code == "I001"));
    }
}
