//! Evaluation context threaded through every pattern operation.
//!
//! A [`Resolver`] is cheap to clone and never mutated after construction:
//! every "change" (an extra named pattern, a step into a field, entering a
//! named type) returns a new resolver that shares the rest of its state.

use crate::error::PatternError;
use crate::pattern::Pattern;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Persistent singly-linked list used for recursion guards.
#[derive(Debug)]
struct TrailNode<T> {
    head: T,
    tail: Trail<T>,
}

#[derive(Debug)]
pub(crate) struct Trail<T>(Option<Arc<TrailNode<T>>>);

impl<T> Clone for Trail<T> {
    fn clone(&self) -> Self {
        Trail(self.0.clone())
    }
}

impl<T> Default for Trail<T> {
    fn default() -> Self {
        Trail(None)
    }
}

impl<T: PartialEq> Trail<T> {
    pub(crate) fn push(&self, head: T) -> Self {
        Trail(Some(Arc::new(TrailNode {
            head,
            tail: self.clone(),
        })))
    }

    pub(crate) fn contains(&self, needle: &T) -> bool {
        let mut current = &self.0;
        while let Some(node) = current {
            if &node.head == needle {
                return true;
            }
            current = &node.tail.0;
        }
        false
    }
}

/// Layered name → pattern registry. Extensions add a layer on top of the
/// shared parent instead of copying it.
#[derive(Debug, Default)]
struct Registry {
    patterns: HashMap<String, Pattern>,
    parent: Option<Arc<Registry>>,
}

impl Registry {
    fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.get(name)))
    }

    fn names(&self, out: &mut Vec<String>) {
        if let Some(parent) = &self.parent {
            parent.names(out);
        }
        for name in self.patterns.keys() {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
    }
}

/// Example values keyed by field path.
///
/// Keys are either `TypeName.field` or a dotted path from the root where
/// array elements are written `[*]`, e.g. `pets[*].name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: HashMap<String, Value>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Build a dictionary from a flat JSON object of `path: value` entries.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let entries = json
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                    .collect()
            })
            .unwrap_or_default();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mode switches that change how lenient the algebra is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverFlags {
    /// Generative testing: specialization also explores optional keys.
    pub generative: bool,
    /// Lenient schema: unexpected object keys are tolerated.
    pub lenient: bool,
    /// Mock matching: string values that are type tokens (`"(number)"`)
    /// match any pattern that encompasses the token's pattern.
    pub mock_matching: bool,
}

/// Returned by [`Resolver::entered_type`] when a named type is already
/// being expanded further up the call chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub name: String,
}

/// Pattern evaluation context.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    registry: Arc<Registry>,
    dictionary: Arc<Dictionary>,
    expanding: Trail<String>,
    path: Vec<String>,
    alias: Option<String>,
    flags: ResolverFlags,
}

/// Strip the token parentheses from a type reference: `(Data)` → `Data`.
pub fn type_name_of(reference: &str) -> &str {
    let trimmed = reference.trim();
    trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed)
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resolver over a set of named patterns.
    pub fn with_patterns(patterns: impl IntoIterator<Item = (String, Pattern)>) -> Self {
        let patterns = patterns
            .into_iter()
            .map(|(name, pattern)| (type_name_of(&name).to_string(), pattern))
            .collect();
        Self {
            registry: Arc::new(Registry {
                patterns,
                parent: None,
            }),
            ..Self::default()
        }
    }

    pub fn with_dictionary(&self, dictionary: Dictionary) -> Self {
        Self {
            dictionary: Arc::new(dictionary),
            ..self.clone()
        }
    }

    pub fn with_flags(&self, flags: ResolverFlags) -> Self {
        Self {
            flags,
            ..self.clone()
        }
    }

    pub fn flags(&self) -> ResolverFlags {
        self.flags
    }

    pub fn is_lenient(&self) -> bool {
        self.flags.lenient
    }

    pub fn is_mock_matching(&self) -> bool {
        self.flags.mock_matching
    }

    pub fn is_generative(&self) -> bool {
        self.flags.generative
    }

    /// Look up a named pattern. `(Name)` and `Name` are equivalent.
    pub fn lookup(&self, name: &str) -> Result<&Pattern, PatternError> {
        let bare = type_name_of(name);
        self.registry
            .get(bare)
            .ok_or_else(|| PatternError::UndefinedType(format!("({bare})")))
    }

    pub fn contains_type(&self, name: &str) -> bool {
        self.registry.get(type_name_of(name)).is_some()
    }

    /// Names of all registered patterns, oldest layer first.
    pub fn type_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.registry.names(&mut names);
        names
    }

    /// A new resolver that additionally knows `name`.
    pub fn with_additional_pattern(&self, name: &str, pattern: Pattern) -> Self {
        let mut patterns = HashMap::new();
        patterns.insert(type_name_of(name).to_string(), pattern);
        Self {
            registry: Arc::new(Registry {
                patterns,
                parent: Some(Arc::clone(&self.registry)),
            }),
            ..self.clone()
        }
    }

    /// Record that `name` is being expanded, or report a cycle if it already is.
    pub fn entered_type(&self, name: &str) -> Result<Resolver, Cycle> {
        let bare = type_name_of(name).to_string();
        if self.expanding.contains(&bare) {
            return Err(Cycle { name: bare });
        }
        Ok(Self {
            expanding: self.expanding.push(bare.clone()),
            alias: Some(bare),
            ..self.clone()
        })
    }

    pub fn is_expanding(&self, name: &str) -> bool {
        self.expanding.contains(&type_name_of(name).to_string())
    }

    /// Step into an object field for dictionary lookups.
    pub fn at_key(&self, key: &str) -> Self {
        let mut path = self.path.clone();
        path.push(key.to_string());
        Self {
            path,
            ..self.clone()
        }
    }

    /// Step into an array element for dictionary lookups.
    pub fn at_element(&self) -> Self {
        let mut path = self.path.clone();
        match path.last_mut() {
            Some(last) => last.push_str("[*]"),
            None => path.push("[*]".to_string()),
        }
        Self {
            path,
            ..self.clone()
        }
    }

    /// Dotted path of the current position, e.g. `pets[*].name`.
    pub fn current_path(&self) -> String {
        self.path.join(".")
    }

    /// Example value pinned for the current position, if any.
    ///
    /// `TypeName.field` entries take precedence over root paths.
    pub fn dictionary_value(&self) -> Option<&Value> {
        if self.dictionary.is_empty() {
            return None;
        }
        let field = self.path.last()?;
        let field = field.trim_end_matches("[*]");
        self.alias
            .as_ref()
            .and_then(|alias| self.dictionary.get(&format!("{alias}.{field}")))
            .or_else(|| self.dictionary.get(&self.current_path()))
    }

    /// Resolver used for the fields of an object with the given type alias.
    pub(crate) fn for_object(&self, alias: Option<&str>) -> Self {
        match alias {
            Some(alias) => Self {
                alias: Some(type_name_of(alias).to_string()),
                ..self.clone()
            },
            None => self.clone(),
        }
    }
}
