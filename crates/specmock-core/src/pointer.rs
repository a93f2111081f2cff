//! JSON-pointer addressed edits over [`Value`] trees.
//!
//! Every operation takes the tree by reference and returns a new tree; the
//! input is never modified. Pointers follow RFC 6901 (`/a/0/b`, with `~0`
//! and `~1` escapes) plus three index sentinels:
//!
//! - `-` appends after the last element,
//! - `^` prepends before the first element,
//! - `*` applies the rest of the pointer to every element.

use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("Invalid pointer '{0}'")]
    InvalidPointer(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Index {index} out of bounds at {path} (length {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("Cannot address {path}: found {found}")]
    NotAContainer { path: String, found: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    At(usize),
    Append,
    Prepend,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(Index),
}

impl Segment {
    /// The segment as an object key; numeric indices double as keys.
    fn as_key(&self) -> Option<String> {
        match self {
            Segment::Key(key) => Some(key.clone()),
            Segment::Index(Index::At(n)) => Some(n.to_string()),
            Segment::Index(_) => None,
        }
    }

    fn empty_container(&self) -> Value {
        match self {
            Segment::Key(_) => Value::Object(IndexMap::new()),
            Segment::Index(_) => Value::Array(Vec::new()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{}", key.replace('~', "~0").replace('/', "~1")),
            Segment::Index(Index::At(n)) => write!(f, "{n}"),
            Segment::Index(Index::Append) => write!(f, "-"),
            Segment::Index(Index::Prepend) => write!(f, "^"),
            Segment::Index(Index::All) => write!(f, "*"),
        }
    }
}

/// A parsed pointer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pointer {
    segments: Vec<Segment>,
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Pointer {
    type Err = PointerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pointer::parse(s)
    }
}

impl Pointer {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, PointerError> {
        if text.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = text.strip_prefix('/') else {
            return Err(PointerError::InvalidPointer(text.to_string()));
        };
        let segments = rest
            .split('/')
            .map(|raw| parse_segment(raw, text))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The addressed value. With `*` the result is an array of every match.
    pub fn get(&self, root: &Value) -> Result<Value, PointerError> {
        self.get_at(root, 0)
    }

    /// Set the addressed location, creating missing intermediate containers
    /// (an object for a key segment, an array for an index segment).
    pub fn insert(&self, root: &Value, value: Value) -> Result<Value, PointerError> {
        self.insert_at(Some(root), 0, value)
    }

    /// Replace the addressed value, which must already exist.
    pub fn update(&self, root: &Value, value: Value) -> Result<Value, PointerError> {
        self.update_at(root, 0, &value)
    }

    /// Remove the addressed value, which must exist. `None` means nothing is
    /// left: the root itself was removed, or a `*` drained every element.
    pub fn delete(&self, root: &Value) -> Result<Option<Value>, PointerError> {
        self.delete_at(root, 0)
    }

    fn path_to(&self, depth: usize) -> String {
        let mut out = String::new();
        for segment in &self.segments[..=depth.min(self.segments.len().saturating_sub(1))] {
            out.push('/');
            out.push_str(&segment.to_string());
        }
        out
    }

    fn not_a_container(&self, depth: usize, found: &Value) -> PointerError {
        PointerError::NotAContainer {
            path: self.path_to(depth),
            found: found.type_name(),
        }
    }

    fn get_at(&self, current: &Value, depth: usize) -> Result<Value, PointerError> {
        let Some(segment) = self.segments.get(depth) else {
            return Ok(current.clone());
        };
        match (current, segment) {
            (Value::Object(map), segment) => {
                let key = segment
                    .as_key()
                    .ok_or_else(|| self.not_a_container(depth, current))?;
                let child = map
                    .get(&key)
                    .ok_or_else(|| PointerError::PathNotFound(self.path_to(depth)))?;
                self.get_at(child, depth + 1)
            }
            (Value::Array(items), Segment::Index(Index::At(n))) => {
                let child = items.get(*n).ok_or(PointerError::IndexOutOfBounds {
                    path: self.path_to(depth),
                    index: *n,
                    len: items.len(),
                })?;
                self.get_at(child, depth + 1)
            }
            (Value::Array(items), Segment::Index(Index::All)) => items
                .iter()
                .map(|item| self.get_at(item, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Value::Array(_), Segment::Index(Index::Append | Index::Prepend)) => {
                Err(PointerError::PathNotFound(self.path_to(depth)))
            }
            _ => Err(self.not_a_container(depth, current)),
        }
    }

    fn insert_at(&self, current: Option<&Value>, depth: usize, value: Value) -> Result<Value, PointerError> {
        let Some(segment) = self.segments.get(depth) else {
            return Ok(value);
        };
        let last = depth + 1 == self.segments.len();
        let created;
        let current = match current {
            None | Some(Value::Null) => {
                created = segment.empty_container();
                &created
            }
            Some(existing) => existing,
        };

        match (current, segment) {
            (Value::Object(map), segment) => {
                let key = segment
                    .as_key()
                    .ok_or_else(|| self.not_a_container(depth, current))?;
                let child = self.insert_at(map.get(&key), depth + 1, value)?;
                let mut map = map.clone();
                map.insert(key, child);
                Ok(Value::Object(map))
            }
            (Value::Array(items), Segment::Index(index)) => {
                let mut items = items.clone();
                match *index {
                    Index::At(n) if n < items.len() && !last => {
                        items[n] = self.insert_at(Some(&items[n]), depth + 1, value)?;
                    }
                    Index::At(n) if n <= items.len() => {
                        let child = self.insert_at(None, depth + 1, value)?;
                        items.insert(n, child);
                    }
                    Index::At(n) => {
                        return Err(PointerError::IndexOutOfBounds {
                            path: self.path_to(depth),
                            index: n,
                            len: items.len(),
                        })
                    }
                    Index::Append => items.push(self.insert_at(None, depth + 1, value)?),
                    Index::Prepend => items.insert(0, self.insert_at(None, depth + 1, value)?),
                    Index::All if last => {
                        return Err(PointerError::InvalidPointer(format!(
                            "{self}: '*' cannot be the target of an insert"
                        )))
                    }
                    Index::All => {
                        items = items
                            .iter()
                            .map(|item| self.insert_at(Some(item), depth + 1, value.clone()))
                            .collect::<Result<_, _>>()?;
                    }
                }
                Ok(Value::Array(items))
            }
            _ => Err(self.not_a_container(depth, current)),
        }
    }

    fn update_at(&self, current: &Value, depth: usize, value: &Value) -> Result<Value, PointerError> {
        let Some(segment) = self.segments.get(depth) else {
            return Ok(value.clone());
        };
        match (current, segment) {
            (Value::Object(map), segment) => {
                let key = segment
                    .as_key()
                    .ok_or_else(|| self.not_a_container(depth, current))?;
                let child = map
                    .get(&key)
                    .ok_or_else(|| PointerError::PathNotFound(self.path_to(depth)))?;
                let updated = self.update_at(child, depth + 1, value)?;
                let mut map = map.clone();
                map.insert(key, updated);
                Ok(Value::Object(map))
            }
            (Value::Array(items), Segment::Index(Index::At(n))) => {
                let child = items.get(*n).ok_or(PointerError::IndexOutOfBounds {
                    path: self.path_to(depth),
                    index: *n,
                    len: items.len(),
                })?;
                let updated = self.update_at(child, depth + 1, value)?;
                let mut items = items.clone();
                items[*n] = updated;
                Ok(Value::Array(items))
            }
            (Value::Array(items), Segment::Index(Index::All)) => items
                .iter()
                .map(|item| self.update_at(item, depth + 1, value))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Value::Array(_), Segment::Index(Index::Append | Index::Prepend)) => {
                Err(PointerError::PathNotFound(self.path_to(depth)))
            }
            _ => Err(self.not_a_container(depth, current)),
        }
    }

    fn delete_at(&self, current: &Value, depth: usize) -> Result<Option<Value>, PointerError> {
        let Some(segment) = self.segments.get(depth) else {
            return Ok(None);
        };
        match (current, segment) {
            (Value::Object(map), segment) => {
                let key = segment
                    .as_key()
                    .ok_or_else(|| self.not_a_container(depth, current))?;
                let child = map
                    .get(&key)
                    .ok_or_else(|| PointerError::PathNotFound(self.path_to(depth)))?;
                let mut map = map.clone();
                match self.delete_at(child, depth + 1)? {
                    Some(remaining) => {
                        map.insert(key, remaining);
                    }
                    None => {
                        map.shift_remove(&key);
                    }
                }
                Ok(Some(Value::Object(map)))
            }
            (Value::Array(items), Segment::Index(Index::At(n))) => {
                let child = items.get(*n).ok_or(PointerError::IndexOutOfBounds {
                    path: self.path_to(depth),
                    index: *n,
                    len: items.len(),
                })?;
                let mut items = items.clone();
                match self.delete_at(child, depth + 1)? {
                    Some(remaining) => items[*n] = remaining,
                    None => {
                        items.remove(*n);
                    }
                }
                Ok(Some(Value::Array(items)))
            }
            (Value::Array(items), Segment::Index(Index::All)) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(remaining) = self.delete_at(item, depth + 1)? {
                        kept.push(remaining);
                    }
                }
                if kept.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Value::Array(kept)))
                }
            }
            (Value::Array(_), Segment::Index(Index::Append | Index::Prepend)) => {
                Err(PointerError::PathNotFound(self.path_to(depth)))
            }
            _ => Err(self.not_a_container(depth, current)),
        }
    }
}

fn parse_segment(raw: &str, pointer: &str) -> Result<Segment, PointerError> {
    match raw {
        "-" => return Ok(Segment::Index(Index::Append)),
        "^" => return Ok(Segment::Index(Index::Prepend)),
        "*" => return Ok(Segment::Index(Index::All)),
        _ => {}
    }
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) && (raw == "0" || !raw.starts_with('0')) {
        if let Ok(n) = raw.parse() {
            return Ok(Segment::Index(Index::At(n)));
        }
    }

    let mut key = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            key.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => key.push('~'),
            Some('1') => key.push('/'),
            _ => return Err(PointerError::InvalidPointer(pointer.to_string())),
        }
    }
    Ok(Segment::Key(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    fn pointer(text: &str) -> Pointer {
        Pointer::parse(text).unwrap()
    }

    #[test]
    fn test_parse_segments() {
        assert_eq!(
            pointer("/a~1b/0/-/^/*/c~0").segments(),
            &[
                Segment::Key("a/b".into()),
                Segment::Index(Index::At(0)),
                Segment::Index(Index::Append),
                Segment::Index(Index::Prepend),
                Segment::Index(Index::All),
                Segment::Key("c~".into()),
            ]
        );
        assert!(pointer("").is_root());
        assert!(matches!(Pointer::parse("a/b"), Err(PointerError::InvalidPointer(_))));
        assert!(matches!(Pointer::parse("/a~2"), Err(PointerError::InvalidPointer(_))));
        assert_eq!(pointer("/a~1b/01").to_string(), "/a~1b/01");
    }

    #[test]
    fn test_get_with_all_elements() {
        let tree = value(json!({"pets": [{"name": "Rex"}, {"name": "Tom"}]}));
        assert_eq!(
            pointer("/pets/*/name").get(&tree).unwrap(),
            value(json!(["Rex", "Tom"]))
        );
        assert!(matches!(
            pointer("/pets/5").get(&tree),
            Err(PointerError::IndexOutOfBounds { index: 5, len: 2, .. })
        ));
    }

    #[test]
    fn test_insert_is_pure_and_creates_containers() {
        let tree = value(json!({"a": 1}));
        let updated = pointer("/b/items/-/id").insert(&tree, Value::from(7)).unwrap();
        assert_eq!(updated, value(json!({"a": 1, "b": {"items": [{"id": 7}]}})));
        assert_eq!(tree, value(json!({"a": 1})));
    }

    #[test]
    fn test_insert_append_prepend_and_position() {
        let tree = value(json!([1, 2]));
        assert_eq!(
            pointer("/-").insert(&tree, Value::from(3)).unwrap(),
            value(json!([1, 2, 3]))
        );
        assert_eq!(
            pointer("/^").insert(&tree, Value::from(0)).unwrap(),
            value(json!([0, 1, 2]))
        );
        assert_eq!(
            pointer("/1").insert(&tree, Value::from(9)).unwrap(),
            value(json!([1, 9, 2]))
        );
        assert!(pointer("/5").insert(&tree, Value::from(9)).is_err());
    }

    #[test]
    fn test_update_requires_existing_path() {
        let tree = value(json!({"pets": [{"name": "Rex"}, {"name": "Tom"}]}));
        let renamed = pointer("/pets/*/name").update(&tree, Value::from("X")).unwrap();
        assert_eq!(renamed, value(json!({"pets": [{"name": "X"}, {"name": "X"}]})));
        assert!(matches!(
            pointer("/pets/0/age").update(&tree, Value::from(3)),
            Err(PointerError::PathNotFound(path)) if path == "/pets/0/age"
        ));
    }

    #[test]
    fn test_all_elements_fails_as_a_whole() {
        let tree = value(json!({"pets": [{"name": "Rex"}, {"kind": "cat"}]}));
        assert!(pointer("/pets/*/name").update(&tree, Value::from("X")).is_err());
        assert!(pointer("/pets/*/name").delete(&tree).is_err());
    }

    #[test]
    fn test_delete_removes_key_and_index() {
        let tree = value(json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]}));
        assert_eq!(
            pointer("/a/b").delete(&tree).unwrap(),
            Some(value(json!({"a": {"c": 2}, "list": [1, 2, 3]})))
        );
        assert_eq!(
            pointer("/list/1").delete(&tree).unwrap(),
            Some(value(json!({"a": {"b": 1, "c": 2}, "list": [1, 3]})))
        );
        assert_eq!(pointer("").delete(&tree).unwrap(), None);
    }

    #[test]
    fn test_delete_all_elements_drains_array() {
        let tree = value(json!({"keep": true, "tags": ["a", "b"]}));
        assert_eq!(
            pointer("/tags/*").delete(&tree).unwrap(),
            Some(value(json!({"keep": true})))
        );
        let nested = value(json!([{"x": 1, "y": 2}, {"x": 3, "y": 4}]));
        assert_eq!(
            pointer("/*/x").delete(&nested).unwrap(),
            Some(value(json!([{"y": 2}, {"y": 4}])))
        );
    }

    #[test]
    fn test_scalar_is_not_a_container() {
        let tree = value(json!({"a": 1}));
        assert!(matches!(
            pointer("/a/b").get(&tree),
            Err(PointerError::NotAContainer { found: "number", .. })
        ));
    }
}
