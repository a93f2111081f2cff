//! Generating conforming example values.

use super::{NumberPattern, ObjectPattern, Pattern, StringPattern};
use crate::error::PatternError;
use crate::resolver::Resolver;
use crate::value::Value;
use indexmap::IndexMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

const DEFAULT_NUMBER_SPAN: f64 = 1000.0;
const MAX_LIST_LEN: usize = 3;

impl Pattern {
    /// Produce one value that matches this pattern.
    ///
    /// A dictionary entry for the current position wins when it matches.
    /// Self-referential types terminate by emitting empty lists and leaving
    /// out optional keys whose expansion would recurse; a required
    /// self-reference with no finite value is an error.
    pub fn generate(&self, resolver: &Resolver) -> Result<Value, PatternError> {
        if let Some(pinned) = resolver.dictionary_value() {
            if !matches!(self, Pattern::ObjectOf(_) | Pattern::DeferredReference(_))
                && self.matches(pinned, resolver)?.is_success()
            {
                return Ok(pinned.clone());
            }
            debug!(
                path = %resolver.current_path(),
                "Dictionary value does not match {}, generating instead", self
            );
        }

        let mut rng = rand::thread_rng();
        let value = match self {
            Pattern::Any => random_string(&mut rng, 8),
            Pattern::Null => Value::Null,
            Pattern::Boolean => Value::Bool(rng.gen()),
            Pattern::Number(number) => generate_number(number, &mut rng),
            Pattern::String(string) => generate_string(string, &mut rng),
            Pattern::Date => Value::String(chrono::Utc::now().format("%Y-%m-%d").to_string()),
            Pattern::DateTime => Value::String(chrono::Utc::now().to_rfc3339()),
            Pattern::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
            Pattern::Email => {
                let user: String = (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(8)
                    .map(char::from)
                    .collect();
                Value::String(format!("{}@example.com", user.to_lowercase()))
            }
            Pattern::ExactValue(value) => value.clone(),
            Pattern::DeferredReference(name) => {
                let inner = resolver
                    .entered_type(name)
                    .map_err(|cycle| PatternError::CycleDetected(format!("({})", cycle.name)))?;
                return resolver.lookup(name)?.generate(&inner);
            }
            Pattern::LookupFromRow { inner, .. } => return inner.generate(resolver),
            Pattern::AnyOf(variants) => return generate_any_of(self, variants, resolver),
            Pattern::ListOf(element) => {
                if element.would_cycle(resolver) {
                    return Ok(Value::Array(Vec::new()));
                }
                let len = rng.gen_range(1..=MAX_LIST_LEN);
                let element_resolver = resolver.at_element();
                let items = (0..len)
                    .map(|_| element.generate(&element_resolver))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(items)
            }
            Pattern::Tuple(items) => {
                let element_resolver = resolver.at_element();
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Pattern::Rest(inner) => {
                            if !inner.would_cycle(resolver) {
                                values.push(inner.generate(&element_resolver)?);
                            }
                        }
                        other => values.push(other.generate(&element_resolver)?),
                    }
                }
                Value::Array(values)
            }
            Pattern::Rest(inner) => {
                if inner.would_cycle(resolver) {
                    Value::Array(Vec::new())
                } else {
                    Value::Array(vec![inner.generate(&resolver.at_element())?])
                }
            }
            Pattern::ObjectOf(object) => generate_object(object, resolver)?,
        };
        Ok(value)
    }
}

fn generate_any_of(
    pattern: &Pattern,
    variants: &[Pattern],
    resolver: &Resolver,
) -> Result<Value, PatternError> {
    let preferred = variants
        .iter()
        .find(|v| !matches!(v, Pattern::Null) && !v.would_cycle(resolver))
        .or_else(|| variants.iter().find(|v| matches!(v, Pattern::Null)));
    match preferred {
        Some(variant) => variant.generate(resolver),
        None => Err(PatternError::CycleDetected(pattern.to_string())),
    }
}

fn generate_object(object: &ObjectPattern, resolver: &Resolver) -> Result<Value, PatternError> {
    let object_resolver = resolver.for_object(object.alias.as_deref());
    let mut map = IndexMap::new();
    for (key, field) in &object.fields {
        if field.optional && field.pattern.would_cycle(&object_resolver) {
            continue;
        }
        let value = field.pattern.generate(&object_resolver.at_key(key))?;
        map.insert(key.clone(), value);
    }
    Ok(Value::Object(map))
}

fn generate_number(number: &NumberPattern, rng: &mut impl Rng) -> Value {
    let low = match number.minimum {
        Some(min) if number.exclusive_minimum => min + step(number, min),
        Some(min) => min,
        None => number.maximum.map_or(1.0, |max| (max - DEFAULT_NUMBER_SPAN).min(1.0)),
    };
    let high = match number.maximum {
        Some(max) if number.exclusive_maximum => max - step(number, max),
        Some(max) => max,
        None => low.max(0.0) + DEFAULT_NUMBER_SPAN,
    };

    let (low, high) = if number.integer {
        (low.ceil(), high.floor())
    } else {
        (low, high)
    };
    if high <= low {
        return Value::number(low);
    }
    if number.integer || (low.fract() == 0.0 && high.fract() == 0.0) {
        let n = rng.gen_range(low as i64..=high as i64);
        return Value::from(n);
    }
    Value::number(rng.gen_range(low..=high))
}

/// Smallest distance that moves off an exclusive bound.
fn step(number: &NumberPattern, bound: f64) -> f64 {
    if number.integer {
        1.0
    } else {
        f64::EPSILON.max(bound.abs() * 1e-9)
    }
}

fn generate_string(string: &StringPattern, rng: &mut impl Rng) -> Value {
    let min = string.min_length.unwrap_or(5);
    let max = string.max_length.unwrap_or(min.max(10)).max(min);
    let len = rng.gen_range(min..=max);
    random_string(rng, len)
}

fn random_string(rng: &mut impl Rng, len: usize) -> Value {
    Value::String(
        rng.sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Dictionary;

    #[test]
    fn test_generated_values_match() {
        let resolver = Resolver::new();
        let patterns = [
            Pattern::number(),
            Pattern::integer(),
            Pattern::Number(NumberPattern {
                minimum: Some(0.5),
                maximum: Some(0.75),
                ..Default::default()
            }),
            Pattern::Number(NumberPattern {
                minimum: Some(3.0),
                maximum: Some(4.0),
                exclusive_minimum: true,
                integer: true,
                ..Default::default()
            }),
            Pattern::String(StringPattern {
                min_length: Some(12),
                max_length: None,
            }),
            Pattern::Date,
            Pattern::DateTime,
            Pattern::Uuid,
            Pattern::Email,
            Pattern::enumeration(["a", "b"]),
            Pattern::nullable(Pattern::Boolean),
            Pattern::list_of(Pattern::string()),
        ];
        for pattern in patterns {
            let value = pattern.generate(&resolver).unwrap();
            assert!(
                pattern.matches(&value, &resolver).unwrap().is_success(),
                "{pattern} generated non-matching {value}"
            );
        }
    }

    #[test]
    fn test_recursive_type_generation_terminates() {
        let data = Pattern::object(
            ObjectPattern::new()
                .required("id", Pattern::number())
                .required("children", Pattern::parse_token("(Data*)").unwrap())
                .optional("parent", Pattern::reference("Data")),
        );
        let resolver = Resolver::with_patterns([("Data".to_string(), data)]);
        let pattern = Pattern::reference("Data");
        let value = pattern.generate(&resolver).unwrap();
        assert_eq!(value.as_object().unwrap()["children"], Value::Array(vec![]));
        assert!(!value.as_object().unwrap().contains_key("parent"));
        assert!(pattern.matches(&value, &resolver).unwrap().is_success());
    }

    #[test]
    fn test_required_self_reference_is_an_error() {
        let node = Pattern::object(ObjectPattern::new().required("next", Pattern::reference("Node")));
        let resolver = Resolver::with_patterns([("Node".to_string(), node)]);
        assert!(matches!(
            Pattern::reference("Node").generate(&resolver),
            Err(PatternError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_dictionary_pins_values() {
        let pet = Pattern::object(
            ObjectPattern::new()
                .required("name", Pattern::string())
                .required("status", Pattern::enumeration(["sold", "available"])),
        );
        let resolver = Resolver::with_patterns([("Pet".to_string(), pet)]).with_dictionary(
            Dictionary::new()
                .with_entry("Pet.name", "Rex")
                .with_entry("Pet.status", "available"),
        );
        let value = Pattern::reference("Pet").generate(&resolver).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["name"], Value::from("Rex"));
        assert_eq!(object["status"], Value::from("available"));
    }

    #[test]
    fn test_non_matching_dictionary_value_is_ignored() {
        let pattern = Pattern::object(ObjectPattern::new().required("age", Pattern::number()));
        let resolver = Resolver::new().with_dictionary(Dictionary::new().with_entry("age", "old"));
        let value = pattern.generate(&resolver).unwrap();
        assert!(value.as_object().unwrap()["age"].as_f64().is_some());
    }
}
