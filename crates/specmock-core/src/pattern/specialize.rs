//! Narrowing patterns with example rows, and deriving deliberately
//! non-conforming mutants from them.
//!
//! Both operations return a lazy [`Variants`] sequence: nothing is expanded
//! until the first item is pulled, and composite patterns walk the cartesian
//! product of their children's variants one combination at a time.

use super::{Field, NumberPattern, ObjectPattern, Pattern, StringPattern};
use crate::error::PatternError;
use crate::resolver::{type_name_of, Resolver};
use crate::row::Row;
use crate::value::Value;
use std::sync::Arc;

/// A lazily produced sequence of patterns.
pub type Variants = Box<dyn Iterator<Item = Result<Pattern, PatternError>> + Send>;

const BAD_DATE: &str = "not-a-date";
const BAD_DATETIME: &str = "2020-13-45T99:99:99";
const BAD_UUID: &str = "not-a-uuid";
const BAD_EMAIL: &str = "not-an-email";

impl Pattern {
    /// Narrow this pattern with the example values in `row`.
    ///
    /// `LookupFromRow` collapses to an exact value when the row has its
    /// column, object fields collapse when the row has a column named after
    /// the key, and everything else passes through. With the generative flag
    /// set, objects with optional keys yield one variant with all of them
    /// present and one with all of them left out.
    pub fn specialize_from_row(&self, row: &Row, resolver: &Resolver) -> Variants {
        specialize(self.clone(), Arc::new(row.clone()), resolver.clone())
    }

    /// Patterns whose values this pattern rejects: wrong types, boundary
    /// violations and missing required keys. Yields nothing when no
    /// meaningful mutation exists.
    pub fn negative_specialize(&self, row: &Row, resolver: &Resolver) -> Variants {
        negatives(self.clone(), Arc::new(row.clone()), resolver.clone())
    }
}

fn one(pattern: Pattern) -> Variants {
    Box::new(std::iter::once(Ok(pattern)))
}

fn fail(err: PatternError) -> Variants {
    Box::new(std::iter::once(Err(err)))
}

fn none() -> Variants {
    Box::new(std::iter::empty())
}

fn all(patterns: Vec<Pattern>) -> Variants {
    Box::new(patterns.into_iter().map(Ok))
}

fn lazy(produce: impl FnOnce() -> Variants + Send + 'static) -> Variants {
    Box::new(std::iter::once_with(produce).flatten())
}

/// Resolve a named type for expansion. `None` means the type is already
/// being expanded further up.
fn enter(name: &str, resolver: &Resolver) -> Result<Option<(Pattern, Resolver)>, PatternError> {
    let Ok(inner) = resolver.entered_type(name) else {
        return Ok(None);
    };
    let pattern = match resolver.lookup(name)?.clone() {
        Pattern::ObjectOf(mut object) => {
            object
                .alias
                .get_or_insert_with(|| type_name_of(name).to_string());
            Pattern::ObjectOf(object)
        }
        other => other,
    };
    Ok(Some((pattern, inner)))
}

fn specialize(pattern: Pattern, row: Arc<Row>, resolver: Resolver) -> Variants {
    match pattern {
        Pattern::LookupFromRow { inner, key } => match row.get(&key) {
            Some(text) => match inner.parse_value(text, &resolver) {
                Ok(value) => one(Pattern::ExactValue(value)),
                Err(err) => fail(err),
            },
            None => specialize(*inner, row, resolver),
        },
        Pattern::DeferredReference(name) => match enter(&name, &resolver) {
            Ok(Some((resolved, inner))) => specialize(resolved, row, inner),
            Ok(None) => one(Pattern::DeferredReference(name)),
            Err(err) => fail(err),
        },
        Pattern::AnyOf(variants) => Box::new(
            variants
                .into_iter()
                .flat_map(move |variant| specialize(variant, Arc::clone(&row), resolver.clone())),
        ),
        Pattern::ListOf(element) => {
            Box::new(specialize(*element, row, resolver.at_element()).map(|r| r.map(Pattern::list_of)))
        }
        Pattern::Rest(inner) => Box::new(
            specialize(*inner, row, resolver.at_element())
                .map(|r| r.map(|p| Pattern::Rest(Box::new(p)))),
        ),
        Pattern::Tuple(items) => lazy(move || {
            let element = resolver.at_element();
            let children = items
                .into_iter()
                .map(|item| specialize(item, Arc::clone(&row), element.clone()))
                .collect();
            product_of(children, Pattern::Tuple)
        }),
        Pattern::ObjectOf(object) => lazy(move || specialize_object(object, row, resolver)),
        leaf => one(leaf),
    }
}

#[derive(Clone)]
struct Slot {
    key: String,
    optional: bool,
    variants: Vec<Pattern>,
}

#[derive(Clone, Copy)]
enum Shape {
    Declared,
    OptionalIncluded,
    OptionalOmitted,
}

fn specialize_object(object: ObjectPattern, row: Arc<Row>, resolver: Resolver) -> Variants {
    let object_resolver = resolver.for_object(object.alias.as_deref());
    let mut slots = Vec::with_capacity(object.fields.len());
    for (key, field) in &object.fields {
        if let Some(text) = row.get(key) {
            match field.pattern.parse_value(text, &object_resolver) {
                Ok(value) => slots.push(Slot {
                    key: key.clone(),
                    optional: false,
                    variants: vec![Pattern::ExactValue(value)],
                }),
                Err(err) => return fail(err),
            }
            continue;
        }
        let variants = specialize(
            field.pattern.clone(),
            Arc::clone(&row),
            object_resolver.at_key(key),
        )
        .collect::<Result<Vec<_>, _>>();
        match variants {
            Ok(variants) => slots.push(Slot {
                key: key.clone(),
                optional: field.optional,
                variants,
            }),
            Err(err) => return fail(err),
        }
    }

    let shapes = if resolver.is_generative() && slots.iter().any(|s| s.optional) {
        vec![Shape::OptionalIncluded, Shape::OptionalOmitted]
    } else {
        vec![Shape::Declared]
    };

    let alias = object.alias;
    let open = object.additional_properties;
    Box::new(shapes.into_iter().flat_map(move |shape| {
        let chosen: Vec<Slot> = slots
            .iter()
            .filter(|s| !matches!(shape, Shape::OptionalOmitted) || !s.optional)
            .cloned()
            .map(|mut s| {
                if matches!(shape, Shape::OptionalIncluded) {
                    s.optional = false;
                }
                s
            })
            .collect();
        let keys: Vec<(String, bool)> = chosen.iter().map(|s| (s.key.clone(), s.optional)).collect();
        let lists = chosen.into_iter().map(|s| s.variants).collect();
        let alias = alias.clone();
        Product::new(lists).map(move |combo| {
            let fields = keys
                .iter()
                .zip(combo)
                .map(|((key, optional), pattern)| {
                    (
                        key.clone(),
                        Field {
                            pattern,
                            optional: *optional,
                        },
                    )
                })
                .collect();
            Ok(Pattern::ObjectOf(ObjectPattern {
                fields,
                alias: alias.clone(),
                additional_properties: open,
            }))
        })
    }))
}

fn product_of(
    children: Vec<Variants>,
    build: impl Fn(Vec<Pattern>) -> Pattern + Send + 'static,
) -> Variants {
    let mut lists = Vec::with_capacity(children.len());
    for variants in children {
        match variants.collect::<Result<Vec<_>, _>>() {
            Ok(list) => lists.push(list),
            Err(err) => return fail(err),
        }
    }
    Box::new(Product::new(lists).map(move |combo| Ok(build(combo))))
}

/// Odometer over the cartesian product of several lists, rightmost fastest.
struct Product {
    lists: Vec<Vec<Pattern>>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl Product {
    fn new(lists: Vec<Vec<Pattern>>) -> Self {
        Self {
            exhausted: lists.iter().any(Vec::is_empty),
            indices: vec![0; lists.len()],
            lists,
        }
    }
}

impl Iterator for Product {
    type Item = Vec<Pattern>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let combo = self
            .indices
            .iter()
            .zip(&self.lists)
            .map(|(&i, list)| list[i].clone())
            .collect();

        self.exhausted = true;
        for pos in (0..self.indices.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.lists[pos].len() {
                self.exhausted = false;
                break;
            }
            self.indices[pos] = 0;
        }
        Some(combo)
    }
}

fn negatives(pattern: Pattern, row: Arc<Row>, resolver: Resolver) -> Variants {
    match pattern {
        Pattern::Any | Pattern::Null => none(),
        Pattern::Boolean => all(vec![Pattern::Null, Pattern::number(), Pattern::string()]),
        Pattern::Number(number) => {
            let mut out = vec![Pattern::Null, Pattern::string(), Pattern::Boolean];
            out.extend(number_violations(&number));
            all(out)
        }
        Pattern::String(string) => {
            let mut out = vec![Pattern::Null, Pattern::number(), Pattern::Boolean];
            out.extend(length_violations(&string));
            all(out)
        }
        Pattern::Date => format_violation(BAD_DATE),
        Pattern::DateTime => format_violation(BAD_DATETIME),
        Pattern::Uuid => format_violation(BAD_UUID),
        Pattern::Email => format_violation(BAD_EMAIL),
        Pattern::ExactValue(value) => all(wrong_types_for(&value)),
        Pattern::LookupFromRow { inner, .. } => negatives(*inner, row, resolver),
        Pattern::DeferredReference(name) => match enter(&name, &resolver) {
            Ok(Some((resolved, inner))) => negatives(resolved, row, inner),
            Ok(None) => none(),
            Err(err) => fail(err),
        },
        Pattern::AnyOf(variants) => lazy(move || {
            let whole = Pattern::AnyOf(variants.clone());
            let mut kept: Vec<Pattern> = Vec::new();
            for (index, variant) in variants.iter().enumerate() {
                let siblings: Vec<Kind> = variants
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .flat_map(|(_, v)| kinds(v, &resolver))
                    .collect();
                for negative in negatives(variant.clone(), Arc::clone(&row), resolver.clone()) {
                    let negative = match negative {
                        Ok(n) => n,
                        Err(err) => return fail(err),
                    };
                    if kept.contains(&negative) {
                        continue;
                    }
                    // An open negative may still overlap a sibling variant.
                    if !matches!(negative, Pattern::ExactValue(_) | Pattern::Null)
                        && kinds(&negative, &resolver)
                            .iter()
                            .any(|k| siblings.contains(k) || siblings.contains(&Kind::Any))
                    {
                        continue;
                    }
                    match whole.encompasses(&negative, &resolver, &resolver) {
                        Ok(result) if result.is_success() => {}
                        Ok(_) => kept.push(negative),
                        Err(err) => return fail(err),
                    }
                }
            }
            all(kept)
        }),
        Pattern::ListOf(element) => lazy(move || {
            let mut out = vec![Pattern::Null, Pattern::string()];
            for negative in negatives(*element, row, resolver.at_element()) {
                match negative {
                    Ok(n) => out.push(Pattern::list_of(n)),
                    Err(err) => return fail(err),
                }
            }
            all(out)
        }),
        Pattern::Rest(inner) => Box::new(
            negatives(*inner, row, resolver.at_element())
                .map(|r| r.map(|p| Pattern::Rest(Box::new(p)))),
        ),
        Pattern::Tuple(items) => lazy(move || {
            let element = resolver.at_element();
            let mut out = vec![Pattern::Null, Pattern::string()];
            for (index, item) in items.iter().enumerate() {
                for negative in negatives(item.clone(), Arc::clone(&row), element.clone()) {
                    let negative = match negative {
                        Ok(n) => n,
                        Err(err) => return fail(err),
                    };
                    let mut mutated = items.clone();
                    mutated[index] = negative;
                    out.push(Pattern::Tuple(mutated));
                }
            }
            all(out)
        }),
        Pattern::ObjectOf(object) => lazy(move || object_negatives(object, row, resolver)),
    }
}

/// Coarse value shape, used to spot overlapping union variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Any,
    Null,
    Boolean,
    Number,
    Text,
    List,
    Object,
}

fn kinds(pattern: &Pattern, resolver: &Resolver) -> Vec<Kind> {
    let Ok(pattern) = pattern.resolve(resolver) else {
        return Vec::new();
    };
    match pattern {
        Pattern::Any => vec![Kind::Any],
        Pattern::Null => vec![Kind::Null],
        Pattern::Boolean => vec![Kind::Boolean],
        Pattern::Number(_) => vec![Kind::Number],
        Pattern::String(_) | Pattern::Date | Pattern::DateTime | Pattern::Uuid | Pattern::Email => {
            vec![Kind::Text]
        }
        Pattern::ExactValue(value) => match value {
            Value::Null => vec![Kind::Null],
            Value::Bool(_) => vec![Kind::Boolean],
            Value::Number(_) => vec![Kind::Number],
            Value::String(_) => vec![Kind::Text],
            Value::Array(_) => vec![Kind::List],
            Value::Object(_) | Value::Xml(_) => vec![Kind::Object],
        },
        Pattern::LookupFromRow { inner, .. } => kinds(inner, resolver),
        Pattern::AnyOf(variants) => variants.iter().flat_map(|v| kinds(v, resolver)).collect(),
        Pattern::ListOf(_) | Pattern::Tuple(_) | Pattern::Rest(_) => vec![Kind::List],
        Pattern::ObjectOf(_) => vec![Kind::Object],
        Pattern::DeferredReference(_) => Vec::new(),
    }
}

fn object_negatives(object: ObjectPattern, row: Arc<Row>, resolver: Resolver) -> Variants {
    let object_resolver = resolver.for_object(object.alias.as_deref());
    let mut out = vec![Pattern::Null];

    for key in object.required_keys() {
        let mut without = object.clone();
        without.fields.shift_remove(key);
        out.push(Pattern::ObjectOf(without));
    }

    for (key, field) in &object.fields {
        for negative in negatives(
            field.pattern.clone(),
            Arc::clone(&row),
            object_resolver.at_key(key),
        ) {
            let negative = match negative {
                Ok(n) => n,
                Err(err) => return fail(err),
            };
            let mut mutated = object.clone();
            mutated.fields.insert(
                key.clone(),
                Field {
                    pattern: negative,
                    optional: false,
                },
            );
            out.push(Pattern::ObjectOf(mutated));
        }
    }
    all(out)
}

fn number_violations(number: &NumberPattern) -> Vec<Pattern> {
    let mut out = Vec::new();
    if let Some(min) = number.minimum {
        let below = if number.exclusive_minimum { min } else { min - 1.0 };
        out.push(Pattern::ExactValue(Value::number(below)));
    }
    if let Some(max) = number.maximum {
        let above = if number.exclusive_maximum { max } else { max + 1.0 };
        out.push(Pattern::ExactValue(Value::number(above)));
    }
    if number.integer {
        let base = number.minimum.map_or(0.0, f64::floor);
        out.push(Pattern::ExactValue(Value::number(base + 1.5)));
    }
    out
}

fn length_violations(string: &StringPattern) -> Vec<Pattern> {
    let mut out = Vec::new();
    if let Some(min) = string.min_length.filter(|&m| m > 0) {
        out.push(Pattern::exact("a".repeat(min - 1)));
    }
    if let Some(max) = string.max_length {
        out.push(Pattern::exact("a".repeat(max + 1)));
    }
    out
}

fn format_violation(bad: &str) -> Variants {
    all(vec![
        Pattern::Null,
        Pattern::number(),
        Pattern::Boolean,
        Pattern::exact(bad),
    ])
}

fn wrong_types_for(value: &Value) -> Vec<Pattern> {
    match value {
        Value::Null => Vec::new(),
        Value::Bool(_) => vec![Pattern::Null, Pattern::number(), Pattern::string()],
        Value::Number(_) => vec![Pattern::Null, Pattern::string(), Pattern::Boolean],
        Value::String(_) => vec![Pattern::Null, Pattern::number(), Pattern::Boolean],
        Value::Array(_) | Value::Object(_) | Value::Xml(_) => vec![Pattern::Null, Pattern::string()],
    }
}
