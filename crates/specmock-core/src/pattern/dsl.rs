//! Type tokens and JSON templates.
//!
//! Tokens are parenthesised type references:
//!
//! | token          | pattern                                   |
//! |----------------|-------------------------------------------|
//! | `(number)`     | `Number`                                  |
//! | `(string?)`    | `AnyOf(Null, String)`                     |
//! | `(Data*)`      | `ListOf(DeferredReference("(Data)"))`     |
//! | `(Data...)`    | `Rest(DeferredReference("(Data)"))`       |
//! | `(id:number)`  | `LookupFromRow(Number, "id")`             |
//!
//! A JSON template is any JSON value in which string tokens stand for
//! patterns, object keys ending in `?` are optional, a `"..."` key opens the
//! object to additional keys and arrays are tuples.

use super::{ObjectPattern, Pattern};
use crate::error::PatternError;
use crate::value::Value;

impl Pattern {
    /// Whether `text` looks like a type token.
    pub fn is_token(text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.len() >= 2 && trimmed.starts_with('(') && trimmed.ends_with(')')
    }

    /// Parse a single type token.
    pub fn parse_token(token: &str) -> Result<Pattern, PatternError> {
        let trimmed = token.trim();
        if !Self::is_token(trimmed) {
            return Err(PatternError::malformed(
                token,
                "type tokens are wrapped in parentheses",
            ));
        }
        let inner = trimmed[1..trimmed.len() - 1].trim();
        if inner.is_empty() {
            return Err(PatternError::malformed(token, "empty type token"));
        }
        if inner.contains(['(', ')']) {
            return Err(PatternError::malformed(token, "nested parentheses"));
        }
        if let Some(base) = inner.strip_suffix("...") {
            return Ok(Pattern::Rest(Box::new(parse_inner(base, token)?)));
        }
        parse_inner(inner, token)
    }

    /// Build a pattern from a JSON template.
    pub fn from_template(template: &serde_json::Value) -> Result<Pattern, PatternError> {
        match template {
            serde_json::Value::String(text) if Self::is_token(text) => Self::parse_token(text),
            serde_json::Value::Array(items) => {
                let patterns = items
                    .iter()
                    .map(Self::from_template)
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(pos) = patterns.iter().position(|p| matches!(p, Pattern::Rest(_))) {
                    if pos + 1 != patterns.len() {
                        return Err(PatternError::malformed(
                            template.to_string(),
                            "a spread token may only appear as the last array element",
                        ));
                    }
                }
                Ok(Pattern::Tuple(patterns))
            }
            serde_json::Value::Object(map) => {
                let mut object = ObjectPattern::new();
                for (key, value) in map {
                    if key == "..." {
                        object.additional_properties = true;
                        continue;
                    }
                    let pattern = Self::from_template(value)?;
                    object = match key.strip_suffix('?') {
                        Some(name) => object.optional(name, pattern),
                        None => object.required(key.as_str(), pattern),
                    };
                }
                Ok(Pattern::ObjectOf(object))
            }
            other => Ok(Pattern::ExactValue(Value::from(other.clone()))),
        }
    }

    /// Parse a template from JSON or YAML-ish text; plain tokens are accepted too.
    pub fn from_template_str(text: &str) -> Result<Pattern, PatternError> {
        if Self::is_token(text) {
            return Self::parse_token(text);
        }
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => Self::from_template(&json),
            Err(_) => Ok(Pattern::ExactValue(Value::String(text.to_string()))),
        }
    }
}

fn parse_inner(inner: &str, token: &str) -> Result<Pattern, PatternError> {
    let inner = inner.trim();
    if inner.is_empty() {
        return Err(PatternError::malformed(token, "missing type name"));
    }
    if let Some((key, type_part)) = inner.split_once(':') {
        let key = key.trim();
        if !is_identifier(key) {
            return Err(PatternError::malformed(
                token,
                format!("'{key}' is not a valid lookup key"),
            ));
        }
        return Ok(Pattern::lookup(parse_inner(type_part, token)?, key));
    }
    if let Some(base) = inner.strip_suffix('*') {
        return Ok(Pattern::list_of(parse_inner(base, token)?));
    }
    if let Some(base) = inner.strip_suffix('?') {
        return Ok(Pattern::nullable(parse_inner(base, token)?));
    }
    if let Some(builtin) = builtin(inner) {
        return Ok(builtin);
    }
    if is_identifier(inner) {
        return Ok(Pattern::DeferredReference(format!("({inner})")));
    }
    Err(PatternError::malformed(
        token,
        format!("'{inner}' is not a valid type name"),
    ))
}

fn builtin(name: &str) -> Option<Pattern> {
    let pattern = match name {
        "number" => Pattern::number(),
        "integer" => Pattern::integer(),
        "string" => Pattern::string(),
        "boolean" | "bool" => Pattern::Boolean,
        "null" => Pattern::Null,
        "date" => Pattern::Date,
        "datetime" => Pattern::DateTime,
        "uuid" => Pattern::Uuid,
        "email" => Pattern::Email,
        "anything" | "any" => Pattern::Any,
        _ => return None,
    };
    Some(pattern)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::NumberPattern;
    use serde_json::json;

    #[test]
    fn test_parse_primitive_tokens() {
        assert_eq!(Pattern::parse_token("(number)").unwrap(), Pattern::number());
        assert_eq!(Pattern::parse_token(" (boolean) ").unwrap(), Pattern::Boolean);
        assert_eq!(Pattern::parse_token("(uuid)").unwrap(), Pattern::Uuid);
    }

    #[test]
    fn test_parse_modifiers() {
        assert_eq!(
            Pattern::parse_token("(string?)").unwrap(),
            Pattern::AnyOf(vec![Pattern::Null, Pattern::string()])
        );
        assert_eq!(
            Pattern::parse_token("(Data*)").unwrap(),
            Pattern::list_of(Pattern::DeferredReference("(Data)".into()))
        );
        assert_eq!(
            Pattern::parse_token("(Data...)").unwrap(),
            Pattern::Rest(Box::new(Pattern::DeferredReference("(Data)".into())))
        );
        assert_eq!(
            Pattern::parse_token("(number?*)").unwrap(),
            Pattern::list_of(Pattern::nullable(Pattern::number()))
        );
    }

    #[test]
    fn test_parse_lookup_token() {
        assert_eq!(
            Pattern::parse_token("(id:integer)").unwrap(),
            Pattern::lookup(
                Pattern::Number(NumberPattern {
                    integer: true,
                    ..Default::default()
                }),
                "id"
            )
        );
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(
            Pattern::parse_token("number"),
            Err(PatternError::MalformedToken { .. })
        ));
        assert!(matches!(
            Pattern::parse_token("()"),
            Err(PatternError::MalformedToken { .. })
        ));
        assert!(matches!(
            Pattern::parse_token("((number))"),
            Err(PatternError::MalformedToken { .. })
        ));
        assert!(matches!(
            Pattern::parse_token("(9lives)"),
            Err(PatternError::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_template_object_with_optional_keys() {
        let pattern = Pattern::from_template(&json!({
            "id": "(number)",
            "nickname?": "(string)",
            "kind": "dog",
            "...": ""
        }))
        .unwrap();
        let Pattern::ObjectOf(object) = pattern else {
            panic!("expected object pattern");
        };
        assert!(!object.fields["id"].optional);
        assert!(object.fields["nickname"].optional);
        assert_eq!(object.fields["kind"].pattern, Pattern::exact("dog"));
        assert!(object.additional_properties);
    }

    #[test]
    fn test_template_spread_must_be_last() {
        assert!(Pattern::from_template(&json!(["(number...)", "(string)"])).is_err());
        assert!(Pattern::from_template(&json!(["(string)", "(number...)"])).is_ok());
    }
}
