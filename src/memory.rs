//! Read-only memory that trigger expressions are evaluated against.
//!
//! Accessor paths are dotted member names with optional `[index]`
//! segments, e.g. `turn.entities.city[0]`.

use std::collections::{BTreeMap, HashMap};

use crate::value::Value;

/// Key/path lookup used during matching.
pub trait Memory {
    /// Resolves an accessor path, returning `None` when nothing is there.
    fn get(&self, path: &str) -> Option<Value>;
}

/// One step of an accessor path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Splits an accessor path into segments.
///
/// A bracket holding something other than an integer is kept as a key,
/// so `a['b']` and `a.b` resolve the same.
pub(crate) fn segments(path: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        let head_end = rest.find('[').unwrap_or(rest.len());
        if head_end > 0 {
            out.push(Segment::Key(&rest[..head_end]));
        }
        rest = &rest[head_end..];
        while let Some(stripped) = rest.strip_prefix('[') {
            let Some(close) = stripped.find(']') else {
                break;
            };
            let inner = stripped[..close].trim_matches(|c| c == '\'' || c == '"');
            match inner.parse::<usize>() {
                Ok(index) => out.push(Segment::Index(index)),
                Err(_) => out.push(Segment::Key(inner)),
            }
            rest = &stripped[close + 1..];
        }
    }
    out
}

fn walk<'v>(mut current: &'v Value, rest: &[Segment<'_>]) -> Option<&'v Value> {
    for segment in rest {
        current = match segment {
            Segment::Key(key) => current.member(key)?,
            Segment::Index(index) => current.element(*index)?,
        };
    }
    Some(current)
}

fn walk_json<'v>(
    mut current: &'v serde_json::Value,
    rest: &[Segment<'_>],
) -> Option<&'v serde_json::Value> {
    for segment in rest {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(*key)?,
            Segment::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}

impl Memory for serde_json::Value {
    fn get(&self, path: &str) -> Option<Value> {
        walk_json(self, &segments(path)).map(Value::from)
    }
}

impl Memory for Value {
    fn get(&self, path: &str) -> Option<Value> {
        walk(self, &segments(path)).cloned()
    }
}

fn lookup_map<'m>(
    path: &str,
    get_root: impl Fn(&str) -> Option<&'m Value>,
) -> Option<Value> {
    if let Some(value) = get_root(path) {
        return Some(value.clone());
    }
    let segs = segments(path);
    let (first, rest) = segs.split_first()?;
    match first {
        Segment::Key(key) => walk(get_root(key)?, rest).cloned(),
        Segment::Index(_) => None,
    }
}

impl<S: std::hash::BuildHasher> Memory for HashMap<String, Value, S> {
    fn get(&self, path: &str) -> Option<Value> {
        lookup_map(path, |key| HashMap::get(self, key))
    }
}

impl Memory for BTreeMap<String, Value> {
    fn get(&self, path: &str) -> Option<Value> {
        lookup_map(path, |key| BTreeMap::get(self, key))
    }
}

impl<M: Memory + ?Sized> Memory for &M {
    fn get(&self, path: &str) -> Option<Value> {
        (**self).get(path)
    }
}
