//! Structural matching of values against patterns.

use super::{Field, ObjectPattern, Pattern};
use crate::error::PatternError;
use crate::resolver::Resolver;
use crate::result::{Failure, FailureDeDuper, FailureReason, MatchResult, RuleViolation};
use crate::value::{Value, XmlNode};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

pub(crate) fn is_email(text: &str) -> bool {
    EMAIL_RE.is_match(text)
}

impl Pattern {
    /// Check `value` against this pattern.
    ///
    /// Object and list mismatches are collected rather than stopping at the
    /// first one; each failure carries the field name or `[index]` it came
    /// from.
    pub fn matches(&self, value: &Value, resolver: &Resolver) -> Result<MatchResult, PatternError> {
        if resolver.is_mock_matching() {
            if let Some(token) = value.as_str().filter(|s| Pattern::is_token(s)) {
                if let Ok(token_pattern) = Pattern::parse_token(token) {
                    return self.encompasses(&token_pattern, resolver, resolver);
                }
            }
        }

        let result = match self {
            Pattern::Any => MatchResult::Success,
            Pattern::Null => match value {
                Value::Null => MatchResult::Success,
                other => MatchResult::Failure(Failure::type_mismatch("null", other)),
            },
            Pattern::Boolean => match value {
                Value::Bool(_) => MatchResult::Success,
                other => MatchResult::Failure(Failure::type_mismatch("boolean", other)),
            },
            Pattern::Number(number) => match value {
                Value::Number(n) => {
                    let f = n.as_f64().unwrap_or(f64::NAN);
                    if number.contains(f) {
                        MatchResult::Success
                    } else {
                        constraint_failure(self, value)
                    }
                }
                other => MatchResult::Failure(Failure::type_mismatch(self, other)),
            },
            Pattern::String(string) => match value {
                Value::String(s) if string.accepts_length(s.chars().count()) => {
                    MatchResult::Success
                }
                Value::String(_) => constraint_failure(self, value),
                other => MatchResult::Failure(Failure::type_mismatch("string", other)),
            },
            Pattern::Date => format_check(self, value, |s| {
                chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }),
            Pattern::DateTime => format_check(self, value, |s| {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
            }),
            Pattern::Uuid => format_check(self, value, |s| uuid::Uuid::parse_str(s).is_ok()),
            Pattern::Email => format_check(self, value, is_email),
            Pattern::ExactValue(expected) => {
                if expected.loosely_equals(value) {
                    MatchResult::Success
                } else {
                    MatchResult::Failure(
                        Failure::new(format!(
                            "Expected {}, actual was {}",
                            expected.display_short(),
                            value.display_short()
                        ))
                        .with_reason(FailureReason::ValueMismatch)
                        .with_rule(RuleViolation::VALUE_MISMATCH),
                    )
                }
            }
            Pattern::DeferredReference(_) => {
                return self.resolve(resolver)?.matches(value, resolver);
            }
            Pattern::LookupFromRow { inner, .. } => return inner.matches(value, resolver),
            Pattern::AnyOf(variants) => return match_any_of(self, variants, value, resolver),
            Pattern::ListOf(element) => match value {
                Value::Array(items) => match_elements(element, items, 0, resolver)?,
                other => MatchResult::Failure(Failure::type_mismatch(self, other)),
            },
            Pattern::Tuple(items) => match value {
                Value::Array(values) => match_tuple(items, values, resolver)?,
                other => MatchResult::Failure(Failure::type_mismatch("array", other)),
            },
            Pattern::Rest(inner) => match value {
                Value::Array(values) => match_elements(inner, values, 0, resolver)?,
                other => MatchResult::Failure(Failure::type_mismatch(self, other)),
            },
            Pattern::ObjectOf(object) => match value {
                Value::Object(map) => match_object(object, map, resolver)?,
                Value::Xml(node) => match_xml_object(object, node, resolver)?,
                other => MatchResult::Failure(Failure::type_mismatch("object", other)),
            },
        };
        Ok(result)
    }
}

fn constraint_failure(pattern: &Pattern, value: &Value) -> MatchResult {
    MatchResult::Failure(
        Failure::new(format!(
            "Expected {pattern}, actual was {}",
            value.display_short()
        ))
        .with_reason(FailureReason::ConstraintViolation)
        .with_rule(RuleViolation::CONSTRAINT_VIOLATION),
    )
}

fn format_check(pattern: &Pattern, value: &Value, valid: impl Fn(&str) -> bool) -> MatchResult {
    match value {
        Value::String(s) if valid(s) => MatchResult::Success,
        Value::String(_) => constraint_failure(pattern, value),
        other => MatchResult::Failure(Failure::type_mismatch(pattern, other)),
    }
}

fn match_any_of(
    pattern: &Pattern,
    variants: &[Pattern],
    value: &Value,
    resolver: &Resolver,
) -> Result<MatchResult, PatternError> {
    if value.is_null() && variants.iter().any(|v| matches!(v, Pattern::Null)) {
        return Ok(MatchResult::Success);
    }

    let mut failures = Vec::new();
    for variant in variants {
        match variant.matches(value, resolver)? {
            MatchResult::Success => return Ok(MatchResult::Success),
            MatchResult::Failure(f) => failures.push(f),
        }
    }

    if pattern.is_enum() {
        return Ok(MatchResult::Failure(
            Failure::new(format!(
                "Expected {pattern}, actual was {}",
                value.display_short()
            ))
            .with_reason(FailureReason::ValueMismatch)
            .with_rule(RuleViolation::VALUE_MISMATCH),
        ));
    }

    Ok(MatchResult::Failure(
        Failure::aggregate(
            format!("Expected {pattern}, but no variant matched"),
            FailureDeDuper::dedupe(failures),
        )
        .with_reason(FailureReason::NoMatchingVariant)
        .with_rule(RuleViolation::NO_MATCHING_VARIANT),
    ))
}

fn match_elements(
    element: &Pattern,
    items: &[Value],
    offset: usize,
    resolver: &Resolver,
) -> Result<MatchResult, PatternError> {
    let mut failures = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if let MatchResult::Failure(f) = element.matches(item, resolver)? {
            failures.push(f.with_breadcrumb(format!("[{}]", i + offset)));
        }
    }
    Ok(MatchResult::from_failures(failures))
}

fn match_tuple(
    items: &[Pattern],
    values: &[Value],
    resolver: &Resolver,
) -> Result<MatchResult, PatternError> {
    let (fixed, rest) = match items.split_last() {
        Some((Pattern::Rest(inner), fixed)) => (fixed, Some(inner.as_ref())),
        _ => (items, None),
    };

    let length_ok = match rest {
        Some(_) => values.len() >= fixed.len(),
        None => values.len() == fixed.len(),
    };
    if !length_ok {
        let qualifier = if rest.is_some() { "at least " } else { "" };
        return Ok(MatchResult::Failure(
            Failure::new(format!(
                "Expected an array of {qualifier}{} elements, actual had {}",
                fixed.len(),
                values.len()
            ))
            .with_reason(FailureReason::ConstraintViolation)
            .with_rule(RuleViolation::CONSTRAINT_VIOLATION),
        ));
    }

    let mut failures = Vec::new();
    for (i, (pattern, value)) in fixed.iter().zip(values).enumerate() {
        if let MatchResult::Failure(f) = pattern.matches(value, resolver)? {
            failures.push(f.with_breadcrumb(format!("[{i}]")));
        }
    }
    if let Some(inner) = rest {
        if let MatchResult::Failure(f) =
            match_elements(inner, &values[fixed.len()..], fixed.len(), resolver)?
        {
            failures.push(f);
        }
    }
    Ok(MatchResult::from_failures(failures))
}

fn missing_key(key: &str) -> Failure {
    Failure::new(format!("Expected key named \"{key}\" was missing"))
        .with_reason(FailureReason::MissingKey)
        .with_rule(RuleViolation::MISSING_REQUIRED_KEY)
        .with_breadcrumb(key)
}

fn unexpected_key(key: &str) -> Failure {
    Failure::new(format!("Key named \"{key}\" was unexpected"))
        .with_reason(FailureReason::UnexpectedKey)
        .with_rule(RuleViolation::UNEXPECTED_KEY)
        .with_breadcrumb(key)
}

fn match_object(
    object: &ObjectPattern,
    map: &IndexMap<String, Value>,
    resolver: &Resolver,
) -> Result<MatchResult, PatternError> {
    let mut failures = Vec::new();

    for (key, Field { pattern, optional }) in &object.fields {
        match map.get(key) {
            None if !optional => failures.push(missing_key(key)),
            None => {}
            Some(value) => {
                if let MatchResult::Failure(f) = pattern.matches(value, resolver)? {
                    failures.push(f.with_breadcrumb(key.as_str()));
                }
            }
        }
    }

    if !object.additional_properties && !resolver.is_lenient() {
        failures.extend(
            map.keys()
                .filter(|k| !object.fields.contains_key(*k))
                .map(|k| unexpected_key(k)),
        );
    }

    Ok(MatchResult::from_failures(failures))
}

/// Match an XML element as an object: child elements are fields, repeated
/// children form a list and leaf text is read through the field's pattern.
fn match_xml_object(
    object: &ObjectPattern,
    node: &XmlNode,
    resolver: &Resolver,
) -> Result<MatchResult, PatternError> {
    let mut grouped: IndexMap<String, Vec<&XmlNode>> = IndexMap::new();
    for child in node.elements() {
        grouped.entry(child.name.clone()).or_default().push(child);
    }

    let mut map = IndexMap::new();
    for (name, nodes) in grouped {
        let pattern = object.fields.get(&name).map(|f| &f.pattern);
        let value = match pattern {
            Some(pattern) => xml_field_value(pattern, &nodes, resolver)?,
            None => Value::Xml(nodes[0].clone()),
        };
        map.insert(name, value);
    }
    for (key, value) in &node.attributes {
        if let Some(field) = object.fields.get(key) {
            let value = field
                .pattern
                .parse_value(value, resolver)
                .unwrap_or_else(|_| Value::String(value.clone()));
            map.insert(key.clone(), value);
        }
    }

    match_object(object, &map, resolver)
}

fn xml_field_value(
    pattern: &Pattern,
    nodes: &[&XmlNode],
    resolver: &Resolver,
) -> Result<Value, PatternError> {
    let resolved = pattern.resolve(resolver)?;
    let element_pattern = match resolved {
        Pattern::ListOf(element) => Some(element.as_ref()),
        _ => None,
    };
    let leaf = |node: &XmlNode, pattern: &Pattern| -> Value {
        if node.elements().next().is_some() {
            return Value::Xml(node.clone());
        }
        let text = node.text();
        pattern
            .parse_value(&text, resolver)
            .unwrap_or(Value::String(text))
    };
    Ok(match element_pattern {
        Some(element) => Value::Array(nodes.iter().map(|n| leaf(*n, element)).collect()),
        None if nodes.len() > 1 => Value::Array(nodes.iter().map(|n| leaf(*n, pattern)).collect()),
        None => leaf(nodes[0], pattern),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{NumberPattern, StringPattern};
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn test_list_reports_every_mismatched_index() {
        let resolver = Resolver::new();
        let pattern = Pattern::list_of(Pattern::number());
        let result = pattern
            .matches(&v(json!(["elementA", 2, "elementC"])), &resolver)
            .unwrap();

        let failure = result.failure_ref().expect("should fail");
        assert_eq!(failure.causes.len(), 2);
        let entries = result.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].breadcrumb, "[0]");
        assert_eq!(entries[1].breadcrumb, "[2]");
        assert!(entries[0].message.contains("Expected number"));
        assert!(entries[0].message.contains("\"elementA\""));
    }

    #[test]
    fn test_object_collects_all_field_failures() {
        let resolver = Resolver::new();
        let pattern = Pattern::object(
            ObjectPattern::new()
                .required("id", Pattern::number())
                .required("name", Pattern::string())
                .optional("tag", Pattern::string()),
        );
        let result = pattern
            .matches(&v(json!({"id": "x", "extra": true})), &resolver)
            .unwrap();
        let mut crumbs: Vec<String> = result.entries().into_iter().map(|e| e.breadcrumb).collect();
        crumbs.sort();
        assert_eq!(crumbs, vec!["extra", "id", "name"]);
    }

    #[test]
    fn test_lenient_resolver_ignores_unexpected_keys() {
        let resolver = Resolver::new().with_flags(crate::ResolverFlags {
            lenient: true,
            ..Default::default()
        });
        let pattern = Pattern::object(ObjectPattern::new().required("id", Pattern::number()));
        assert!(pattern
            .matches(&v(json!({"id": 1, "extra": true})), &resolver)
            .unwrap()
            .is_success());
    }

    #[test]
    fn test_nested_breadcrumb_path() {
        let resolver = Resolver::new();
        let item = Pattern::object(ObjectPattern::new().required("price", Pattern::number()));
        let pattern = Pattern::object(
            ObjectPattern::new().required("items", Pattern::list_of(item)),
        );
        let result = pattern
            .matches(
                &v(json!({"items": [{"price": 1}, {"price": 2}, {"price": "free"}]})),
                &resolver,
            )
            .unwrap();
        let entries = result.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].breadcrumb, "items.[2].price");
    }

    #[test]
    fn test_nullable_accepts_null_first() {
        let resolver = Resolver::new();
        let pattern = Pattern::AnyOf(vec![Pattern::DeferredReference("(Undefined)".into()), Pattern::Null]);
        // Null must succeed without consulting the undefined sibling.
        assert!(pattern.matches(&Value::Null, &resolver).unwrap().is_success());
    }

    #[test]
    fn test_enum_failure_lists_members() {
        let resolver = Resolver::new();
        let status = Pattern::enumeration(["sold", "available"]);
        let result = status.matches(&Value::from("lost"), &resolver).unwrap();
        let report = result.report();
        assert!(report.contains("\"sold\""));
        assert!(report.contains("\"lost\""));
    }

    #[test]
    fn test_number_bounds_and_integer() {
        let resolver = Resolver::new();
        let pattern = Pattern::Number(NumberPattern {
            minimum: Some(1.0),
            maximum: Some(10.0),
            exclusive_maximum: true,
            integer: true,
            ..Default::default()
        });
        assert!(pattern.matches(&Value::from(1), &resolver).unwrap().is_success());
        assert!(pattern.matches(&Value::from(10), &resolver).unwrap().is_failure());
        assert!(pattern.matches(&Value::from(2.5), &resolver).unwrap().is_failure());
    }

    #[test]
    fn test_string_formats() {
        let resolver = Resolver::new();
        assert!(Pattern::Date.matches(&Value::from("2024-02-29"), &resolver).unwrap().is_success());
        assert!(Pattern::Date.matches(&Value::from("2023-02-29"), &resolver).unwrap().is_failure());
        assert!(Pattern::Email.matches(&Value::from("a@b.io"), &resolver).unwrap().is_success());
        assert!(Pattern::Uuid
            .matches(&Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8"), &resolver)
            .unwrap()
            .is_success());
        let short = Pattern::String(StringPattern {
            min_length: Some(2),
            max_length: Some(3),
        });
        assert!(short.matches(&Value::from("abcd"), &resolver).unwrap().is_failure());
    }

    #[test]
    fn test_undefined_reference_is_an_error() {
        let resolver = Resolver::new();
        let pattern = Pattern::reference("Missing");
        assert_eq!(
            pattern.matches(&Value::Null, &resolver),
            Err(PatternError::UndefinedType("(Missing)".into()))
        );
    }

    #[test]
    fn test_recursive_schema_validates() {
        let data = Pattern::object(
            ObjectPattern::new()
                .required("id", Pattern::number())
                .required("children", Pattern::parse_token("(Data*)").unwrap()),
        );
        let resolver = Resolver::with_patterns([("(Data)".to_string(), data)]);
        let value = v(json!({
            "id": 1,
            "children": [{"id": 2, "children": []}, {"id": 3, "children": [{"id": 4, "children": []}]}]
        }));
        assert!(Pattern::reference("Data").matches(&value, &resolver).unwrap().is_success());

        let bad = v(json!({"id": 1, "children": [{"id": "two", "children": []}]}));
        let result = Pattern::reference("Data").matches(&bad, &resolver).unwrap();
        assert_eq!(result.entries()[0].breadcrumb, "children.[0].id");
    }

    #[test]
    fn test_mock_matching_accepts_type_tokens() {
        let resolver = Resolver::new().with_flags(crate::ResolverFlags {
            mock_matching: true,
            ..Default::default()
        });
        assert!(Pattern::number().matches(&Value::from("(number)"), &resolver).unwrap().is_success());
        assert!(Pattern::number().matches(&Value::from("(string)"), &resolver).unwrap().is_failure());
    }

    #[test]
    fn test_tuple_with_spread() {
        let resolver = Resolver::new();
        let pattern = Pattern::from_template(&json!(["(string)", "(number...)"])).unwrap();
        assert!(pattern.matches(&v(json!(["a", 1, 2, 3])), &resolver).unwrap().is_success());
        let result = pattern.matches(&v(json!(["a", 1, "x"])), &resolver).unwrap();
        assert_eq!(result.entries()[0].breadcrumb, "[2]");
        assert!(pattern.matches(&v(json!([])), &resolver).unwrap().is_failure());
    }

    #[test]
    fn test_xml_node_matches_object() {
        let resolver = Resolver::new();
        let pattern = Pattern::object(
            ObjectPattern::new()
                .required("id", Pattern::number())
                .required("tag", Pattern::list_of(Pattern::string())),
        );
        let node = XmlNode::new("pet")
            .with_child(XmlNode::new("id").with_text("12"))
            .with_child(XmlNode::new("tag").with_text("a"))
            .with_child(XmlNode::new("tag").with_text("b"));
        assert!(pattern.matches(&Value::Xml(node), &resolver).unwrap().is_success());

        let bad = XmlNode::new("pet").with_child(XmlNode::new("id").with_text("twelve"));
        let result = pattern.matches(&Value::Xml(bad), &resolver).unwrap();
        assert_eq!(result.entries().len(), 2);
    }
}
