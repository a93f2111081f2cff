//! Interpreting textual example values (row cells, path segments, query
//! parameters, XML text) according to a pattern.

use super::Pattern;
use crate::error::PatternError;
use crate::resolver::Resolver;
use crate::value::Value;

impl Pattern {
    /// Parse `text` into a value of this pattern's shape.
    ///
    /// Fails with [`PatternError::InvalidRowValue`] when the text cannot be
    /// read as such a value or the value does not match.
    pub fn parse_value(&self, text: &str, resolver: &Resolver) -> Result<Value, PatternError> {
        let value = match self {
            Pattern::Any => serde_json::from_str::<serde_json::Value>(text)
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(text.to_string())),
            Pattern::Null => match text.trim() {
                "" | "null" => Value::Null,
                _ => return Err(PatternError::invalid_row_value(text, "null")),
            },
            Pattern::Boolean => match text.trim() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(PatternError::invalid_row_value(text, "boolean")),
            },
            Pattern::Number(_) => parse_number(text)
                .ok_or_else(|| PatternError::invalid_row_value(text, self.to_string()))?,
            Pattern::String(_) | Pattern::Date | Pattern::DateTime | Pattern::Uuid | Pattern::Email => {
                Value::String(text.to_string())
            }
            Pattern::ExactValue(expected) => match expected {
                Value::String(_) => Value::String(text.to_string()),
                Value::Number(_) => parse_number(text)
                    .ok_or_else(|| PatternError::invalid_row_value(text, self.to_string()))?,
                Value::Bool(_) => return Pattern::Boolean.parse_value(text, resolver).and_then(
                    |v| self.checked(v, text, resolver),
                ),
                Value::Null => return Pattern::Null.parse_value(text, resolver),
                _ => parse_json(text, self)?,
            },
            Pattern::DeferredReference(_) => {
                return self.resolve(resolver)?.parse_value(text, resolver);
            }
            Pattern::LookupFromRow { inner, .. } => return inner.parse_value(text, resolver),
            Pattern::AnyOf(variants) => {
                for variant in variants {
                    if let Ok(value) = variant.parse_value(text, resolver) {
                        return Ok(value);
                    }
                }
                return Err(PatternError::invalid_row_value(text, self.to_string()));
            }
            Pattern::ListOf(_) | Pattern::Tuple(_) | Pattern::Rest(_) | Pattern::ObjectOf(_) => {
                parse_json(text, self)?
            }
        };
        self.checked(value, text, resolver)
    }

    fn checked(&self, value: Value, text: &str, resolver: &Resolver) -> Result<Value, PatternError> {
        if self.matches(&value, resolver)?.is_success() {
            Ok(value)
        } else {
            Err(PatternError::invalid_row_value(text, self.to_string()))
        }
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = trimmed.parse::<f64>().ok()?;
    f.is_finite().then(|| Value::number(f))
}

fn parse_json(text: &str, pattern: &Pattern) -> Result<Value, PatternError> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|_| PatternError::invalid_row_value(text, pattern.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{NumberPattern, ObjectPattern};

    #[test]
    fn test_parse_number_row_value() {
        let resolver = Resolver::new();
        assert_eq!(
            Pattern::number().parse_value("42", &resolver).unwrap(),
            Value::from(42)
        );
        assert!(Pattern::number().parse_value("forty", &resolver).is_err());
    }

    #[test]
    fn test_parse_respects_constraints() {
        let resolver = Resolver::new();
        let bounded = Pattern::Number(NumberPattern::between(1.0, 10.0));
        assert!(bounded.parse_value("11", &resolver).is_err());
        assert!(Pattern::Uuid.parse_value("not-a-uuid", &resolver).is_err());
    }

    #[test]
    fn test_parse_object_from_json_text() {
        let resolver = Resolver::new();
        let pattern = Pattern::object(ObjectPattern::new().required("id", Pattern::number()));
        let value = pattern.parse_value(r#"{"id": 7}"#, &resolver).unwrap();
        assert_eq!(value.as_object().unwrap()["id"], Value::from(7));
    }

    #[test]
    fn test_parse_through_union() {
        let resolver = Resolver::new();
        let pattern = Pattern::nullable(Pattern::number());
        assert_eq!(pattern.parse_value("null", &resolver).unwrap(), Value::Null);
        assert_eq!(pattern.parse_value("3", &resolver).unwrap(), Value::from(3));
    }
}
