//! The pattern type algebra.
//!
//! A [`Pattern`] is a closed tagged union. Each operation lives in its own
//! submodule and matches exhaustively over every variant:
//!
//! - `matching`: [`Pattern::matches`]
//! - `generate`: [`Pattern::generate`]
//! - `specialize`: [`Pattern::specialize_from_row`], [`Pattern::negative_specialize`]
//! - `encompass`: [`Pattern::encompasses`]
//! - `parse`: [`Pattern::parse_value`]
//! - `dsl`: type tokens (`(number)`, `(Data*)`, ...) and JSON templates

mod dsl;
mod encompass;
mod generate;
mod matching;
mod parse;
mod specialize;

pub use specialize::Variants;

use crate::error::PatternError;
use crate::resolver::Resolver;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

/// A schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Accepts any value.
    Any,
    Null,
    Boolean,
    Number(NumberPattern),
    String(StringPattern),
    /// Calendar date, `YYYY-MM-DD`.
    Date,
    /// RFC 3339 timestamp.
    DateTime,
    Uuid,
    Email,
    /// Matches only this literal value.
    ExactValue(Value),
    /// Named placeholder resolved through the resolver registry, e.g. `(Data)`.
    DeferredReference(String),
    /// Collapses to an exact value when an example row supplies `key`.
    LookupFromRow { inner: Box<Pattern>, key: String },
    AnyOf(Vec<Pattern>),
    ListOf(Box<Pattern>),
    /// Fixed-position array. A trailing [`Pattern::Rest`] absorbs the remainder.
    Tuple(Vec<Pattern>),
    /// Spread: any number of further elements matching the inner pattern.
    Rest(Box<Pattern>),
    ObjectOf(ObjectPattern),
}

/// Numeric constraints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumberPattern {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub integer: bool,
}

/// String length constraints (in characters).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringPattern {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

/// Structural record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectPattern {
    pub fields: IndexMap<String, Field>,
    /// Name of the type this object was declared as, if any.
    pub alias: Option<String>,
    /// Whether keys not listed in `fields` are accepted.
    pub additional_properties: bool,
}

/// An object field and whether its key may be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub pattern: Pattern,
    pub optional: bool,
}

impl NumberPattern {
    pub fn between(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..Default::default()
        }
    }

    pub fn has_bounds(&self) -> bool {
        self.minimum.is_some() || self.maximum.is_some()
    }

    pub fn contains(&self, n: f64) -> bool {
        let above = match self.minimum {
            Some(min) if self.exclusive_minimum => n > min,
            Some(min) => n >= min,
            None => true,
        };
        let below = match self.maximum {
            Some(max) if self.exclusive_maximum => n < max,
            Some(max) => n <= max,
            None => true,
        };
        above && below && (!self.integer || n.fract() == 0.0)
    }

    /// Whether every number accepted by `other` is accepted by `self`.
    pub fn covers(&self, other: &NumberPattern) -> bool {
        let lower_ok = match (self.minimum, other.minimum) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => {
                if self.exclusive_minimum && !other.exclusive_minimum {
                    b > a
                } else {
                    b >= a
                }
            }
        };
        let upper_ok = match (self.maximum, other.maximum) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => {
                if self.exclusive_maximum && !other.exclusive_maximum {
                    b < a
                } else {
                    b <= a
                }
            }
        };
        lower_ok && upper_ok && (!self.integer || other.integer)
    }
}

impl fmt::Display for NumberPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.integer { "integer" } else { "number" };
        write!(f, "{kind}")?;
        if let Some(min) = self.minimum {
            let op = if self.exclusive_minimum { ">" } else { ">=" };
            write!(f, " {op} {}", Value::number(min))?;
        }
        if let Some(max) = self.maximum {
            let op = if self.exclusive_maximum { "<" } else { "<=" };
            write!(f, " {op} {}", Value::number(max))?;
        }
        Ok(())
    }
}

impl StringPattern {
    pub fn has_bounds(&self) -> bool {
        self.min_length.is_some() || self.max_length.is_some()
    }

    pub fn accepts_length(&self, len: usize) -> bool {
        self.min_length.is_none_or(|min| len >= min) && self.max_length.is_none_or(|max| len <= max)
    }
}

impl ObjectPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, key: impl Into<String>, pattern: Pattern) -> Self {
        self.fields.insert(
            key.into(),
            Field {
                pattern,
                optional: false,
            },
        );
        self
    }

    pub fn optional(mut self, key: impl Into<String>, pattern: Pattern) -> Self {
        self.fields.insert(
            key.into(),
            Field {
                pattern,
                optional: true,
            },
        );
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn allow_additional(mut self) -> Self {
        self.additional_properties = true;
        self
    }

    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, f)| !f.optional)
            .map(|(k, _)| k.as_str())
    }
}

impl Pattern {
    pub fn number() -> Self {
        Pattern::Number(NumberPattern::default())
    }

    pub fn integer() -> Self {
        Pattern::Number(NumberPattern {
            integer: true,
            ..Default::default()
        })
    }

    pub fn string() -> Self {
        Pattern::String(StringPattern::default())
    }

    pub fn exact(value: impl Into<Value>) -> Self {
        Pattern::ExactValue(value.into())
    }

    /// `AnyOf(Null, inner)`.
    pub fn nullable(inner: Pattern) -> Self {
        if inner.is_nullable() {
            return inner;
        }
        Pattern::AnyOf(vec![Pattern::Null, inner])
    }

    /// Enum of literal values: `AnyOf(ExactValue, ...)`.
    pub fn enumeration<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Pattern::AnyOf(
            values
                .into_iter()
                .map(|v| Pattern::ExactValue(v.into()))
                .collect(),
        )
    }

    pub fn list_of(element: Pattern) -> Self {
        Pattern::ListOf(Box::new(element))
    }

    /// Reference to a named type. `Data` and `(Data)` are equivalent.
    pub fn reference(name: &str) -> Self {
        Pattern::DeferredReference(format!("({})", crate::resolver::type_name_of(name)))
    }

    pub fn lookup(inner: Pattern, key: impl Into<String>) -> Self {
        Pattern::LookupFromRow {
            inner: Box::new(inner),
            key: key.into(),
        }
    }

    pub fn object(object: ObjectPattern) -> Self {
        Pattern::ObjectOf(object)
    }

    /// True for `Null` and for unions with a direct `Null` variant.
    pub fn is_nullable(&self) -> bool {
        match self {
            Pattern::Null | Pattern::Any => true,
            Pattern::AnyOf(variants) => variants.iter().any(|v| matches!(v, Pattern::Null)),
            _ => false,
        }
    }

    /// True when every variant is an exact literal.
    pub fn is_enum(&self) -> bool {
        match self {
            Pattern::AnyOf(variants) => {
                !variants.is_empty()
                    && variants
                        .iter()
                        .all(|v| matches!(v, Pattern::ExactValue(_) | Pattern::Null))
                    && variants.iter().any(|v| matches!(v, Pattern::ExactValue(_)))
            }
            _ => false,
        }
    }

    /// Follow `DeferredReference` hops until a concrete pattern is reached.
    pub fn resolve<'a>(&'a self, resolver: &'a Resolver) -> Result<&'a Pattern, PatternError> {
        let mut current = self;
        let mut seen: Vec<&str> = Vec::new();
        while let Pattern::DeferredReference(name) = current {
            if seen.contains(&name.as_str()) {
                return Err(PatternError::CycleDetected(name.clone()));
            }
            seen.push(name);
            current = resolver.lookup(name)?;
        }
        Ok(current)
    }

    /// True when expanding this pattern would re-enter a type already being
    /// expanded, so generation must not produce it.
    pub(crate) fn would_cycle(&self, resolver: &Resolver) -> bool {
        match self {
            Pattern::DeferredReference(name) => resolver.is_expanding(name),
            Pattern::LookupFromRow { inner, .. } => inner.would_cycle(resolver),
            Pattern::AnyOf(variants) => {
                !variants.is_empty() && variants.iter().all(|v| v.would_cycle(resolver))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => write!(f, "anything"),
            Pattern::Null => write!(f, "null"),
            Pattern::Boolean => write!(f, "boolean"),
            Pattern::Number(n) => write!(f, "{n}"),
            Pattern::String(s) => {
                write!(f, "string")?;
                match (s.min_length, s.max_length) {
                    (Some(min), Some(max)) => write!(f, " of length {min}..={max}"),
                    (Some(min), None) => write!(f, " of length >= {min}"),
                    (None, Some(max)) => write!(f, " of length <= {max}"),
                    (None, None) => Ok(()),
                }
            }
            Pattern::Date => write!(f, "date (YYYY-MM-DD)"),
            Pattern::DateTime => write!(f, "datetime (RFC 3339)"),
            Pattern::Uuid => write!(f, "uuid"),
            Pattern::Email => write!(f, "email"),
            Pattern::ExactValue(v) => write!(f, "{}", v.display_short()),
            Pattern::DeferredReference(name) => write!(f, "{name}"),
            Pattern::LookupFromRow { inner, .. } => write!(f, "{inner}"),
            Pattern::AnyOf(variants) => match variants.as_slice() {
                [Pattern::Null, only] | [only, Pattern::Null] => write!(f, "nullable {only}"),
                _ => {
                    let parts: Vec<String> = variants.iter().map(ToString::to_string).collect();
                    write!(f, "one of {}", parts.join(", "))
                }
            },
            Pattern::ListOf(element) => write!(f, "list of {element}"),
            Pattern::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Pattern::Rest(inner) => write!(f, "{inner}..."),
            Pattern::ObjectOf(o) => match &o.alias {
                Some(alias) => write!(f, "object {alias}"),
                None => write!(f, "object"),
            },
        }
    }
}
