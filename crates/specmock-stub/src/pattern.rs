//! HTTP-level patterns: method + path template + headers + query + body on
//! the request side, status + headers + body on the response side.
//!
//! Header, query and path values arrive as text. Each is read with the
//! declared pattern's [`Pattern::parse_value`] when possible and matched as
//! a plain string otherwise, so a non-numeric `id` against `(number)` fails
//! with an ordinary type mismatch.

use crate::http::{HttpRequest, HttpResponse};
use indexmap::IndexMap;
use regex::Regex;
use specmock_core::{
    Failure, FailureReason, MatchResult, ObjectPattern, Pattern, PatternError, Resolver, Value,
};
use std::cmp::Reverse;
use std::fmt;

/// One segment of a path template.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Literal(String),
    Param { name: String, pattern: Pattern },
}

/// A path template such as `/items/(id:number)` or `/items/{id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    segments: Vec<PathSegment>,
}

/// Request side of an operation or stub.
#[derive(Debug, Clone)]
pub struct HttpRequestPattern {
    pub method: String,
    pub path: PathPattern,
    /// Header constraints, keys lowercased. Unlisted headers are ignored.
    pub headers: ObjectPattern,
    /// Query constraints. Unlisted parameters are ignored.
    pub query: ObjectPattern,
    pub body: Pattern,
    /// Structural regex over the raw body, used instead of `body` when set.
    pub body_regex: Option<Regex>,
}

/// Response side of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponsePattern {
    pub status: u16,
    pub headers: ObjectPattern,
    pub body: Pattern,
}

/// How narrowly a request pattern pins requests down.
///
/// Ordered so that greater is more specific: fewer wildcard path segments
/// first, then more header/query/body constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    wildcards: Reverse<usize>,
    constraints: usize,
}

impl Specificity {
    pub fn wildcards(&self) -> usize {
        self.wildcards.0
    }

    pub fn constraints(&self) -> usize {
        self.constraints
    }
}

impl PathPattern {
    /// Parse a path template. Segments that are type tokens become
    /// parameters; `(id:number)` names the parameter `id`, `{id}` is a
    /// string parameter.
    pub fn parse(template: &str) -> Result<Self, PatternError> {
        let path = template.split('?').next().unwrap_or_default();
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, segment)| parse_segment(i, segment))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments that accept more than one value.
    pub fn wildcards(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| match s {
                PathSegment::Literal(_) => false,
                PathSegment::Param { pattern, .. } => !matches!(pattern, Pattern::ExactValue(_)),
            })
            .count()
    }

    pub fn matches(&self, path: &str, resolver: &Resolver) -> Result<MatchResult, PatternError> {
        let actual: Vec<String> = path
            .split('?')
            .next()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect();

        let mismatch = || {
            MatchResult::Failure(
                Failure::new(format!("Expected path {self}, actual was {path}"))
                    .with_reason(FailureReason::PathMismatch),
            )
        };
        if actual.len() != self.segments.len() {
            return Ok(mismatch());
        }

        let mut results = Vec::new();
        for (segment, text) in self.segments.iter().zip(&actual) {
            match segment {
                PathSegment::Literal(expected) if expected == text => {}
                PathSegment::Literal(_) => return Ok(mismatch()),
                PathSegment::Param { name, pattern } => {
                    results.push(match_text(pattern, text, resolver)?.breadcrumb(name.clone()));
                }
            }
        }
        Ok(MatchResult::from_results(results))
    }
}

fn parse_segment(index: usize, segment: &str) -> Result<PathSegment, PatternError> {
    if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        return Ok(PathSegment::Param {
            name: name.trim().to_string(),
            pattern: Pattern::string(),
        });
    }
    if !Pattern::is_token(segment) {
        return Ok(PathSegment::Literal(decode_segment(segment)));
    }
    match Pattern::parse_token(segment)? {
        Pattern::LookupFromRow { inner, key } => Ok(PathSegment::Param {
            name: key,
            pattern: *inner,
        }),
        pattern => Ok(PathSegment::Param {
            name: format!("param{}", index + 1),
            pattern,
        }),
    }
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            match segment {
                PathSegment::Literal(text) => write!(f, "/{text}")?,
                PathSegment::Param { name, pattern } => write!(f, "/({name}:{pattern})")?,
            }
        }
        Ok(())
    }
}

/// Match a textual value: parsed with the pattern when possible, otherwise
/// taken as a string.
fn match_text(pattern: &Pattern, text: &str, resolver: &Resolver) -> Result<MatchResult, PatternError> {
    let value = match pattern.parse_value(text, resolver) {
        Ok(value) => value,
        Err(PatternError::InvalidRowValue { .. }) => Value::String(text.to_string()),
        Err(other) => return Err(other),
    };
    pattern.matches(&value, resolver)
}

/// Match string-valued maps (headers, query) against an object pattern.
/// Keys the pattern does not mention are ignored.
fn match_text_map(
    pattern: &ObjectPattern,
    actual: &IndexMap<String, String>,
    resolver: &Resolver,
    case_insensitive: bool,
) -> Result<MatchResult, PatternError> {
    let mut results = Vec::new();
    for (key, field) in &pattern.fields {
        let found = if case_insensitive {
            actual
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        } else {
            actual.get(key)
        };
        match found {
            Some(text) => {
                results.push(match_text(&field.pattern, text, resolver)?.breadcrumb(key.clone()));
            }
            None if field.optional => {}
            None => results.push(MatchResult::Failure(
                Failure::new(format!("Expected key named \"{key}\" was missing"))
                    .with_reason(FailureReason::MissingKey)
                    .with_rule(specmock_core::RuleViolation::MISSING_REQUIRED_KEY)
                    .with_breadcrumb(key.clone()),
            )),
        }
    }
    Ok(MatchResult::from_results(results))
}

/// Build a header or query constraint object from template values.
///
/// Values that are type tokens become patterns, anything else must match
/// exactly as text. Keys ending in `?` are optional.
pub fn text_constraints<'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a serde_json::Value)>,
    lowercase_keys: bool,
) -> Result<ObjectPattern, PatternError> {
    let mut object = ObjectPattern::new().allow_additional();
    for (key, value) in entries {
        let (name, optional) = match key.strip_suffix('?') {
            Some(name) => (name, true),
            None => (key.as_str(), false),
        };
        let name = if lowercase_keys {
            name.to_ascii_lowercase()
        } else {
            name.to_string()
        };
        let pattern = match value {
            serde_json::Value::String(text) if Pattern::is_token(text) => Pattern::parse_token(text)?,
            serde_json::Value::String(text) => Pattern::exact(text.as_str()),
            other => Pattern::exact(other.to_string()),
        };
        object = if optional {
            object.optional(name, pattern)
        } else {
            object.required(name, pattern)
        };
    }
    Ok(object)
}

impl HttpRequestPattern {
    pub fn new(method: &str, path: PathPattern) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path,
            headers: ObjectPattern::new().allow_additional(),
            query: ObjectPattern::new().allow_additional(),
            body: Pattern::Any,
            body_regex: None,
        }
    }

    pub fn with_headers(mut self, headers: ObjectPattern) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_query(mut self, query: ObjectPattern) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Pattern) -> Self {
        self.body = body;
        self
    }

    pub fn with_body_regex(mut self, regex: Regex) -> Self {
        self.body_regex = Some(regex);
        self
    }

    /// The same pattern with any body accepted.
    pub fn without_body(&self) -> Self {
        Self {
            body: Pattern::Any,
            body_regex: None,
            ..self.clone()
        }
    }

    pub fn specificity(&self) -> Specificity {
        let body = usize::from(self.body_regex.is_some() || self.body != Pattern::Any);
        Specificity {
            wildcards: Reverse(self.path.wildcards()),
            constraints: self.headers.fields.len() + self.query.fields.len() + body,
        }
    }

    /// Method and path only; cheap pre-filter before full matching.
    pub fn matches_route(&self, request: &HttpRequest, resolver: &Resolver) -> Result<MatchResult, PatternError> {
        if !self.method.eq_ignore_ascii_case(&request.method) {
            return Ok(MatchResult::Failure(
                Failure::new(format!(
                    "Expected method {}, actual was {}",
                    self.method, request.method
                ))
                .with_reason(FailureReason::MethodMismatch)
                .with_breadcrumb("METHOD"),
            ));
        }
        Ok(self.path.matches(&request.path, resolver)?.breadcrumb("PATH"))
    }

    /// Full request match. Method and path fail fast; header, query and body
    /// mismatches are all reported together.
    pub fn matches(&self, request: &HttpRequest, resolver: &Resolver) -> Result<MatchResult, PatternError> {
        let route = self.matches_route(request, resolver)?;
        if route.is_failure() {
            return Ok(route.breadcrumb("REQUEST"));
        }

        let headers = match_text_map(&self.headers, &request.headers, resolver, true)?.breadcrumb("HEADERS");
        let query = match_text_map(&self.query, &request.query, resolver, false)?.breadcrumb("QUERY");
        let body = match &self.body_regex {
            Some(regex) => {
                let text = body_text(&request.body);
                if regex.is_match(&text) {
                    MatchResult::Success
                } else {
                    MatchResult::Failure(Failure::new(format!(
                        "Expected body to match regex {}, actual was {}",
                        regex.as_str(),
                        request.body.display_short()
                    ))
                    .with_reason(FailureReason::RegexMismatch))
                }
            }
            None => self.body.matches(&request.body, resolver)?,
        }
        .breadcrumb("BODY");

        Ok(MatchResult::from_results([headers, query, body]).breadcrumb("REQUEST"))
    }
}

impl fmt::Display for HttpRequestPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn body_text(body: &Value) -> String {
    match body {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl HttpResponsePattern {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: ObjectPattern::new().allow_additional(),
            body: Pattern::Any,
        }
    }

    pub fn with_headers(mut self, headers: ObjectPattern) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Pattern) -> Self {
        self.body = body;
        self
    }

    pub fn matches(&self, response: &HttpResponse, resolver: &Resolver) -> Result<MatchResult, PatternError> {
        if response.status != self.status {
            return Ok(MatchResult::Failure(
                Failure::new(format!(
                    "Expected status {}, actual was {}",
                    self.status, response.status
                ))
                .with_reason(FailureReason::StatusMismatch)
                .with_breadcrumb("STATUS"),
            )
            .breadcrumb("RESPONSE"));
        }
        let headers = match_text_map(&self.headers, &response.headers, resolver, true)?.breadcrumb("HEADERS");
        let body = self.body.matches(&response.body, resolver)?.breadcrumb("BODY");
        Ok(MatchResult::from_results([headers, body]).breadcrumb("RESPONSE"))
    }

    /// Produce a conforming response.
    pub fn generate(&self, resolver: &Resolver) -> Result<HttpResponse, PatternError> {
        let mut response = HttpResponse::new(self.status);
        for (name, field) in &self.headers.fields {
            if field.optional {
                continue;
            }
            let text = match field.pattern.generate(resolver)? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            response = response.with_header(name.clone(), text);
        }
        let body = match &self.body {
            Pattern::Any => Value::Null,
            pattern => pattern.generate(resolver)?,
        };
        Ok(response.with_body(body))
    }
}
