//! Backward-compatibility between patterns.
//!
//! `a.encompasses(b)` holds when every value `b` accepts is also accepted by
//! `a`, so a consumer written against `a` can safely read whatever a producer
//! written against `b` emits.

use super::{Field, NumberPattern, ObjectPattern, Pattern, StringPattern};
use crate::error::PatternError;
use crate::resolver::{Resolver, Trail};
use crate::result::{Failure, FailureReason, MatchResult, RuleViolation};

/// Pair of positions being compared, used to stop on recursive schemas.
type Comparison = (String, String);

impl Pattern {
    /// Check that this pattern accepts everything `other` accepts.
    ///
    /// Named references are resolved through their own side's resolver.
    /// Comparing two recursive types terminates: once the same pair of
    /// positions comes round again it is assumed compatible.
    pub fn encompasses(
        &self,
        other: &Pattern,
        this_resolver: &Resolver,
        other_resolver: &Resolver,
    ) -> Result<MatchResult, PatternError> {
        Comparer {
            this_resolver,
            other_resolver,
        }
        .compare(self, other, &Trail::default())
    }

    fn has_references(&self) -> bool {
        match self {
            Pattern::DeferredReference(_) => true,
            Pattern::LookupFromRow { inner, .. } | Pattern::ListOf(inner) | Pattern::Rest(inner) => {
                inner.has_references()
            }
            Pattern::AnyOf(items) | Pattern::Tuple(items) => items.iter().any(Pattern::has_references),
            Pattern::ObjectOf(object) => object.fields.values().any(|f| f.pattern.has_references()),
            _ => false,
        }
    }
}

fn incompatible(message: impl Into<String>) -> Failure {
    Failure::new(message)
        .with_reason(FailureReason::Incompatible)
        .with_rule(RuleViolation::BACKWARD_INCOMPATIBLE)
}

fn not_encompassed(this: &Pattern, other: &Pattern) -> MatchResult {
    MatchResult::Failure(incompatible(format!("Expected {this}, but the other side allows {other}")))
}

struct Comparer<'r> {
    this_resolver: &'r Resolver,
    other_resolver: &'r Resolver,
}

impl Comparer<'_> {
    fn compare(
        &self,
        this: &Pattern,
        other: &Pattern,
        seen: &Trail<Comparison>,
    ) -> Result<MatchResult, PatternError> {
        if this == other && !this.has_references() {
            return Ok(MatchResult::Success);
        }

        if matches!(this, Pattern::DeferredReference(_)) || matches!(other, Pattern::DeferredReference(_)) {
            let key = (position_key(this), position_key(other));
            if seen.contains(&key) {
                return Ok(MatchResult::Success);
            }
            let seen = seen.push(key);
            let this = this.resolve(self.this_resolver)?;
            let other = other.resolve(self.other_resolver)?;
            return self.compare(this, other, &seen);
        }

        if let Pattern::LookupFromRow { inner, .. } = this {
            return self.compare(inner, other, seen);
        }
        if let Pattern::LookupFromRow { inner, .. } = other {
            return self.compare(this, inner, seen);
        }

        if let Pattern::AnyOf(variants) = other {
            let mut failures = Vec::new();
            for variant in variants {
                if let MatchResult::Failure(f) = self.compare(this, variant, seen)? {
                    failures.push(f);
                }
            }
            if failures.is_empty() {
                return Ok(MatchResult::Success);
            }
            return Ok(MatchResult::Failure(
                Failure::aggregate(
                    format!("{this} does not accept every variant of {other}"),
                    failures,
                )
                .with_reason(FailureReason::Incompatible)
                .with_rule(RuleViolation::BACKWARD_INCOMPATIBLE),
            ));
        }

        if let Pattern::ExactValue(value) = other {
            return Ok(match this.matches(value, self.this_resolver)? {
                MatchResult::Success => MatchResult::Success,
                MatchResult::Failure(cause) => MatchResult::Failure(Failure {
                    causes: vec![cause],
                    ..incompatible(format!("{this} does not accept {}", value.display_short()))
                }),
            });
        }

        if let Pattern::AnyOf(variants) = this {
            for variant in variants {
                if self.compare(variant, other, seen)?.is_success() {
                    return Ok(MatchResult::Success);
                }
            }
            return Ok(not_encompassed(this, other));
        }

        let result = match (this, other) {
            (Pattern::Any, _) => MatchResult::Success,
            (Pattern::Number(a), Pattern::Number(b)) => numbers(a, b),
            (Pattern::String(a), Pattern::String(b)) => strings(this, a, b),
            (
                Pattern::String(s),
                Pattern::Date | Pattern::DateTime | Pattern::Uuid | Pattern::Email,
            ) if !s.has_bounds() => MatchResult::Success,
            (Pattern::ListOf(a), Pattern::ListOf(b)) => self
                .compare(a, b, seen)?
                .breadcrumb("[*]"),
            (Pattern::ListOf(a), Pattern::Tuple(items)) => {
                let mut failures = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    let item = match item {
                        Pattern::Rest(inner) => inner.as_ref(),
                        other => other,
                    };
                    if let MatchResult::Failure(f) = self.compare(a, item, seen)? {
                        failures.push(f.with_breadcrumb(format!("[{i}]")));
                    }
                }
                MatchResult::from_failures(failures)
            }
            (Pattern::Tuple(a), Pattern::Tuple(b)) => self.tuples(a, b, seen)?,
            (Pattern::Rest(a), Pattern::Rest(b)) => self.compare(a, b, seen)?,
            (Pattern::ObjectOf(a), Pattern::ObjectOf(b)) => self.objects(a, b, seen)?,
            _ => not_encompassed(this, other),
        };
        Ok(result)
    }

    fn tuples(
        &self,
        this: &[Pattern],
        other: &[Pattern],
        seen: &Trail<Comparison>,
    ) -> Result<MatchResult, PatternError> {
        let (this_fixed, this_rest) = split_rest(this);
        let (other_fixed, other_rest) = split_rest(other);

        if other_fixed.len() < this_fixed.len() {
            return Ok(MatchResult::Failure(incompatible(format!(
                "Expected at least {} elements, but the other side allows {}",
                this_fixed.len(),
                other_fixed.len()
            ))));
        }

        let mut failures = Vec::new();
        for (i, item) in other_fixed.iter().enumerate() {
            let slot = match this_fixed.get(i).or(this_rest) {
                Some(slot) => slot,
                None => {
                    failures.push(
                        incompatible(format!("Expected at most {} elements", this_fixed.len()))
                            .with_breadcrumb(format!("[{i}]")),
                    );
                    break;
                }
            };
            if let MatchResult::Failure(f) = self.compare(slot, item, seen)? {
                failures.push(f.with_breadcrumb(format!("[{i}]")));
            }
        }

        if let Some(other_rest) = other_rest {
            match this_rest {
                Some(this_rest) => {
                    if let MatchResult::Failure(f) = self.compare(this_rest, other_rest, seen)? {
                        failures.push(f.with_breadcrumb("[...]"));
                    }
                }
                None => failures.push(incompatible(format!(
                    "Expected exactly {} elements, but the other side allows more",
                    this_fixed.len()
                ))),
            }
        }
        Ok(MatchResult::from_failures(failures))
    }

    fn objects(
        &self,
        this: &ObjectPattern,
        other: &ObjectPattern,
        seen: &Trail<Comparison>,
    ) -> Result<MatchResult, PatternError> {
        let mut failures = Vec::new();

        for (key, Field { pattern, optional }) in &this.fields {
            match other.fields.get(key) {
                None if !optional => failures.push(
                    incompatible(format!("Key {key} is required but the other side does not declare it"))
                        .with_reason(FailureReason::MissingKey)
                        .with_breadcrumb(key.as_str()),
                ),
                None => {}
                Some(theirs) => {
                    if !optional && theirs.optional {
                        failures.push(
                            incompatible(format!("Key {key} is required but optional on the other side"))
                                .with_reason(FailureReason::MissingKey)
                                .with_breadcrumb(key.as_str()),
                        );
                        continue;
                    }
                    if let MatchResult::Failure(f) = self.compare(pattern, &theirs.pattern, seen)? {
                        failures.push(f.with_breadcrumb(key.as_str()));
                    }
                }
            }
        }

        if !this.additional_properties && !self.this_resolver.is_lenient() {
            for (key, field) in &other.fields {
                if !field.optional && !this.fields.contains_key(key) {
                    failures.push(
                        incompatible(format!("Key {key} is always sent but not expected"))
                            .with_reason(FailureReason::UnexpectedKey)
                            .with_breadcrumb(key.as_str()),
                    );
                }
            }
        }

        Ok(MatchResult::from_failures(failures))
    }
}

fn split_rest(items: &[Pattern]) -> (&[Pattern], Option<&Pattern>) {
    match items.split_last() {
        Some((Pattern::Rest(inner), fixed)) => (fixed, Some(inner.as_ref())),
        _ => (items, None),
    }
}

fn position_key(pattern: &Pattern) -> String {
    match pattern {
        Pattern::DeferredReference(name) => name.clone(),
        other => format!("{other:?}"),
    }
}

fn numbers(this: &NumberPattern, other: &NumberPattern) -> MatchResult {
    if this.covers(other) {
        MatchResult::Success
    } else {
        MatchResult::Failure(incompatible(format!(
            "Expected {this}, but the other side allows {other}"
        )))
    }
}

fn strings(pattern: &Pattern, this: &StringPattern, other: &StringPattern) -> MatchResult {
    let min_ok = match (this.min_length, other.min_length) {
        (None, _) => true,
        (Some(a), Some(b)) => b >= a,
        (Some(a), None) => a == 0,
    };
    let max_ok = match (this.max_length, other.max_length) {
        (None, _) => true,
        (Some(a), Some(b)) => b <= a,
        (Some(_), None) => false,
    };
    if min_ok && max_ok {
        MatchResult::Success
    } else {
        MatchResult::Failure(incompatible(format!(
            "Expected {pattern}, but the other side allows {}",
            Pattern::String(other.clone())
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(this: &Pattern, other: &Pattern) -> MatchResult {
        let resolver = Resolver::new();
        this.encompasses(other, &resolver, &resolver).unwrap()
    }

    #[test]
    fn test_union_widening() {
        let nullable = Pattern::nullable(Pattern::number());
        assert!(check(&nullable, &Pattern::Null).is_success());
        assert!(check(&nullable, &Pattern::number()).is_success());
        assert!(check(&Pattern::number(), &nullable).is_failure());
    }

    #[test]
    fn test_enum_compatibility() {
        let declared = Pattern::enumeration(["sold", "available"]);
        let widened = Pattern::enumeration(["sold", "available", "reserved"]);
        let narrowed = Pattern::enumeration(["sold"]);

        let result = check(&declared, &widened);
        assert!(result.is_failure());
        assert!(result.report().contains("reserved"));
        assert!(check(&declared, &narrowed).is_success());
        assert!(check(&declared, &Pattern::exact("sold")).is_success());
    }

    #[test]
    fn test_list_widening() {
        let nullable_numbers = Pattern::list_of(Pattern::nullable(Pattern::number()));
        let numbers = Pattern::list_of(Pattern::number());
        let strings = Pattern::list_of(Pattern::string());
        assert!(check(&nullable_numbers, &numbers).is_success());
        assert!(check(&numbers, &strings).is_failure());
    }

    #[test]
    fn test_list_encompasses_tuple() {
        let numbers = Pattern::list_of(Pattern::number());
        let tuple = Pattern::Tuple(vec![Pattern::exact(1), Pattern::integer()]);
        assert!(check(&numbers, &tuple).is_success());
        let mixed = Pattern::Tuple(vec![Pattern::exact(1), Pattern::string()]);
        let result = check(&numbers, &mixed);
        assert_eq!(result.entries()[0].breadcrumb, "[1]");
    }

    #[test]
    fn test_tuple_with_rest() {
        let open = Pattern::Tuple(vec![
            Pattern::string(),
            Pattern::Rest(Box::new(Pattern::number())),
        ]);
        let fixed = Pattern::Tuple(vec![Pattern::string(), Pattern::integer(), Pattern::exact(3)]);
        assert!(check(&open, &fixed).is_success());
        assert!(check(&fixed, &open).is_failure());
    }

    #[test]
    fn test_number_bounds() {
        let wide = Pattern::Number(NumberPattern::between(0.0, 100.0));
        let narrow = Pattern::Number(NumberPattern::between(10.0, 20.0));
        assert!(check(&wide, &narrow).is_success());
        assert!(check(&narrow, &wide).is_failure());
        assert!(check(&Pattern::number(), &Pattern::integer()).is_success());
        assert!(check(&Pattern::integer(), &Pattern::number()).is_failure());
    }

    #[test]
    fn test_string_accepts_formats() {
        assert!(check(&Pattern::string(), &Pattern::Uuid).is_success());
        assert!(check(&Pattern::Uuid, &Pattern::string()).is_failure());
    }

    #[test]
    fn test_object_required_and_optional_keys() {
        let consumer = Pattern::object(
            ObjectPattern::new()
                .required("id", Pattern::number())
                .optional("name", Pattern::string()),
        );
        let producer = Pattern::object(
            ObjectPattern::new()
                .required("id", Pattern::integer())
                .optional("tag", Pattern::string()),
        );
        assert!(check(&consumer, &producer).is_success());

        let missing = Pattern::object(ObjectPattern::new().optional("id", Pattern::number()));
        let result = check(&consumer, &missing);
        assert!(result.is_failure());
        assert_eq!(result.entries()[0].breadcrumb, "id");

        let wrong_type = Pattern::object(ObjectPattern::new().required("id", Pattern::string()));
        assert!(check(&consumer, &wrong_type).is_failure());
    }

    #[test]
    fn test_extra_required_key_on_closed_object() {
        let consumer = Pattern::object(ObjectPattern::new().required("id", Pattern::number()));
        let producer = Pattern::object(
            ObjectPattern::new()
                .required("id", Pattern::number())
                .required("extra", Pattern::string()),
        );
        assert!(check(&consumer, &producer).is_failure());
        let open = Pattern::object(
            ObjectPattern::new()
                .required("id", Pattern::number())
                .allow_additional(),
        );
        assert!(check(&open, &producer).is_success());
    }

    #[test]
    fn test_recursive_schema_self_encompasses() {
        let data = Pattern::object(
            ObjectPattern::new()
                .required("id", Pattern::number())
                .required("children", Pattern::parse_token("(Data*)").unwrap()),
        );
        let resolver = Resolver::with_patterns([("Data".to_string(), data)]);
        let other = resolver.clone();
        let reference = Pattern::reference("Data");
        assert!(reference
            .encompasses(&reference, &resolver, &other)
            .unwrap()
            .is_success());
    }

    #[test]
    fn test_references_resolve_per_side() {
        let v1 = Resolver::with_patterns([(
            "Pet".to_string(),
            Pattern::object(ObjectPattern::new().required("id", Pattern::number())),
        )]);
        let v2 = Resolver::with_patterns([(
            "Pet".to_string(),
            Pattern::object(ObjectPattern::new().required("id", Pattern::string())),
        )]);
        let pet = Pattern::reference("Pet");
        assert!(pet.encompasses(&pet, &v1, &v2).unwrap().is_failure());
        assert!(pet.encompasses(&pet, &v1, &v1).unwrap().is_success());
    }

    #[test]
    fn test_undefined_reference_is_an_error() {
        let resolver = Resolver::new();
        let result = Pattern::reference("Ghost").encompasses(&Pattern::Null, &resolver, &resolver);
        assert!(matches!(result, Err(PatternError::UndefinedType(_))));
    }
}
