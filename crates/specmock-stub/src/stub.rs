//! Stub definitions: the on-disk/over-the-wire document and the compiled
//! [`StubEntry`] the pool serves from.
//!
//! ```json
//! {
//!   "http-stub-id": "item-10",
//!   "delay-in-seconds": 0.5,
//!   "http-request": {
//!     "method": "GET",
//!     "path": "/items/10",
//!     "headers": { "X-Flag": "1" },
//!     "bodyRegex": "..."
//!   },
//!   "http-response": {
//!     "status": 200,
//!     "body": { "id": 10, "name": "(string)" },
//!     "externalisedResponseCommand": "./make-response.sh"
//!   }
//! }
//! ```
//!
//! Request values may be type tokens (`"(number)"`), in which case the stub
//! matches any request value of that type. Tokens in the response body are
//! filled with generated values each time the stub is served.

use crate::contract::Contract;
use crate::error::StubError;
use crate::http::{check_header, parse_query, HttpRequest, HttpResponse};
use crate::pattern::{text_constraints, HttpRequestPattern, PathPattern};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use specmock_core::{Failure, MatchResult, Pattern, PatternError, Resolver, ResolverFlags, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// A stub as written in a file or posted to the admin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubDocument {
    #[serde(rename = "http-stub-id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "delay-in-seconds", default, skip_serializing_if = "Option::is_none")]
    pub delay_in_seconds: Option<f64>,
    #[serde(rename = "http-request")]
    pub request: StubRequestDocument,
    #[serde(rename = "http-response")]
    pub response: StubResponseDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubRequestDocument {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub query: IndexMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(rename = "bodyRegex", default, skip_serializing_if = "Option::is_none")]
    pub body_regex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubResponseDocument {
    pub status: u16,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(
        rename = "externalisedResponseCommand",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub external_command: Option<String>,
}

/// Where a stub came from. Transient stubs outrank file stubs of equal
/// specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StubOrigin {
    File,
    Transient,
}

/// The response half of a compiled stub.
#[derive(Debug, Clone, PartialEq)]
pub struct StubResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    /// Body template; `None` sends no body.
    pub body: Option<Pattern>,
}

/// A compiled stub, immutable once in the pool.
#[derive(Debug, Clone)]
pub struct StubEntry {
    pub token: String,
    pub origin: StubOrigin,
    /// Registration sequence number, assigned by the pool.
    pub seq: u64,
    /// File path, or `admin` for stubs registered over HTTP.
    pub source: String,
    pub request: HttpRequestPattern,
    pub response: StubResponse,
    pub delay: Option<Duration>,
    pub external_command: Option<String>,
    /// Index of the contract operation this stub was validated against.
    pub operation: Option<usize>,
    pub document: StubDocument,
}

impl StubDocument {
    pub fn parse(text: &str) -> Result<Self, StubError> {
        serde_json::from_str(text).map_err(|e| StubError::Parse(e.to_string()))
    }

    pub fn from_json(json: serde_json::Value) -> Result<Self, StubError> {
        serde_json::from_value(json).map_err(|e| StubError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, StubError> {
        let text = std::fs::read_to_string(path).map_err(|source| StubError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn delay(&self) -> Result<Option<Duration>, StubError> {
        match self.delay_in_seconds {
            None => Ok(None),
            Some(seconds) => Duration::try_from_secs_f64(seconds).map(Some).map_err(|e| {
                StubError::InvalidShape(format!(
                    "delay-in-seconds must be a non-negative number of seconds, got {seconds} ({e})"
                ))
            }),
        }
    }

    /// The stub's request as a value, type tokens left in place.
    pub fn request_value(&self) -> HttpRequest {
        let (path, inline_query) = split_path(&self.request.path);
        let mut request = HttpRequest::new(&self.request.method, path);
        request.query = inline_query;
        for (key, value) in &self.request.query {
            request.query.insert(key.clone(), text_of(value));
        }
        for (key, value) in &self.request.headers {
            request = request.with_header(key, text_of(value));
        }
        if let Some(body) = &self.request.body {
            request.body = Value::from(body.clone());
        }
        request
    }

    /// The stub's response as a value, type tokens left in place.
    pub fn response_value(&self) -> HttpResponse {
        self.response.to_response()
    }
}

impl StubResponseDocument {
    pub fn to_response(&self) -> HttpResponse {
        let mut response = HttpResponse::new(self.status);
        for (key, value) in &self.headers {
            response = response.with_header(key.clone(), text_of(value));
        }
        if let Some(body) = &self.body {
            response.body = Value::from(body.clone());
        }
        response
    }
}

fn split_path(path: &str) -> (&str, IndexMap<String, String>) {
    match path.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (path, IndexMap::new()),
    }
}

fn text_of(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl StubResponse {
    /// Produce the response to send, filling any type tokens.
    pub fn materialize(&self, resolver: &Resolver) -> Result<HttpResponse, PatternError> {
        let mut response = HttpResponse::new(self.status);
        response.headers = self.headers.clone();
        if let Some(body) = &self.body {
            response.body = body.generate(resolver)?;
        }
        Ok(response)
    }
}

impl StubEntry {
    /// Compile and validate a stub document.
    ///
    /// When the contract declares operations, the stub must match one of
    /// them: its request (in mock-matching mode, so tokens are compared by
    /// type) and, unless the response comes from an external command, its
    /// response.
    pub fn compile(
        document: StubDocument,
        origin: StubOrigin,
        source: impl Into<String>,
        contract: &Contract,
    ) -> Result<Self, StubError> {
        let delay = document.delay()?;
        if !(100..=599).contains(&document.response.status) {
            return Err(StubError::InvalidShape(format!(
                "invalid status {}",
                document.response.status
            )));
        }
        if document.request.method.trim().is_empty() {
            return Err(StubError::InvalidShape("method is empty".to_string()));
        }

        let (path, inline_query) = split_path(&document.request.path);
        let mut query = document.request.query.clone();
        for (key, value) in inline_query {
            query.entry(key).or_insert(serde_json::Value::String(value));
        }

        let mut request = HttpRequestPattern::new(&document.request.method, PathPattern::parse(path)?)
            .with_headers(text_constraints(&document.request.headers, true)?)
            .with_query(text_constraints(&query, false)?);
        match (&document.request.body_regex, &document.request.body) {
            (Some(pattern), _) => {
                let regex = Regex::new(pattern).map_err(|source| StubError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                })?;
                request = request.with_body_regex(regex);
            }
            (None, Some(body)) => request = request.with_body(Pattern::from_template(body)?),
            (None, None) => {}
        }

        let response = StubResponse {
            status: document.response.status,
            headers: document
                .response
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), text_of(v)))
                .collect(),
            body: document
                .response
                .body
                .as_ref()
                .map(Pattern::from_template)
                .transpose()?,
        };

        for (name, value) in &response.headers {
            check_header(name, value).map_err(StubError::InvalidShape)?;
        }

        let operation = find_operation(&document, contract)?;
        let token = document
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            token,
            origin,
            seq: 0,
            source: source.into(),
            request,
            response,
            delay,
            external_command: document.response.external_command.clone(),
            operation,
            document,
        })
    }

    /// Listing form used by the admin API.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "token": self.token,
            "origin": self.origin,
            "seq": self.seq,
            "source": self.source,
            "request": self.request.to_string(),
            "definition": self.document,
        })
    }
}

/// Find the contract operation a stub belongs to.
///
/// Returns `Ok(None)` for an empty contract.
pub fn find_operation(document: &StubDocument, contract: &Contract) -> Result<Option<usize>, StubError> {
    if contract.is_empty() {
        return Ok(None);
    }
    let resolver = contract.resolver().with_flags(ResolverFlags {
        mock_matching: true,
        ..Default::default()
    });
    let request = document.request_value();
    let response = document.response_value();
    let check_body = document.request.body_regex.is_none();
    let check_response = document.response.external_command.is_none();

    let mut failures = Vec::new();
    for (index, operation) in contract.operations().iter().enumerate() {
        if operation.request.matches_route(&request, &resolver)?.is_failure() {
            continue;
        }
        let request_result = if check_body {
            operation.request.matches(&request, &resolver)?
        } else {
            operation.request.without_body().matches(&request, &resolver)?
        };
        let response_result = if check_response {
            operation.response.matches(&response, &resolver)?
        } else {
            MatchResult::Success
        };
        match MatchResult::from_results([request_result, response_result]) {
            MatchResult::Success => return Ok(Some(index)),
            MatchResult::Failure(failure) => failures.push(Failure::aggregate(
                format!("In operation {} ({})", operation.id, operation.request),
                vec![failure],
            )),
        }
    }

    let report = if failures.is_empty() {
        format!(
            "No operation in the contract matches {} {}",
            request.method, request.path
        )
    } else {
        MatchResult::from_failures(failures).report()
    };
    Err(StubError::ContractMismatch { report })
}

/// Expand stub paths: files are taken as-is, directories are searched
/// recursively for `*.json`. Unreadable directories are logged and skipped.
pub fn discover_stub_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for path in paths {
        collect(path, &mut found);
    }
    found
}

fn collect(path: &Path, found: &mut Vec<PathBuf>) {
    if !path.is_dir() {
        found.push(path.to_path_buf());
        return;
    }
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read stub directory");
            return;
        }
    };
    let mut children: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    children.sort();
    for child in children {
        if child.is_dir() {
            collect(&child, found);
        } else if child.extension().is_some_and(|ext| ext == "json") {
            found.push(child);
        }
    }
}
