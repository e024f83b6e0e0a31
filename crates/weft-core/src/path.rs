//! Dotted-path access into nested values.
//!
//! Segments are separated by `.`; a segment addressing a sequence must parse
//! as an index (`items.2.name`). Empty segments are ignored.

use crate::patch::patch;
use crate::value::Value;

/// Split a path into its first segment and the remainder, if any.
#[must_use]
pub fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) if !rest.is_empty() => (head, Some(rest)),
        Some((head, _)) => (head, None),
        None => (path, None),
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

#[must_use]
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(value, |cur, seg| match cur {
        Value::Map(map) => map.get(seg),
        Value::List(items) => items.get(seg.parse::<usize>().ok()?),
        _ => None,
    })
}

pub fn get_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    segments(path).try_fold(value, |cur, seg| match cur {
        Value::Map(map) => map.get_mut(seg),
        Value::List(items) => items.get_mut(seg.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Strict-patch `new` onto the value at `path`. Returns `true` on change;
/// a missing path is reported as no change.
pub fn set(value: &mut Value, path: &str, new: &Value) -> bool {
    get_mut(value, path).is_some_and(|slot| patch(slot, new))
}

/// Remove and return the value at `path`.
///
/// Returns `None` when the path does not exist or addresses the root.
pub fn remove(value: &mut Value, path: &str) -> Option<Value> {
    let trimmed = path.trim_matches('.');
    let (parent, last) = match trimmed.rsplit_once('.') {
        Some((parent, last)) => (get_mut(value, parent)?, last),
        None if trimmed.is_empty() => return None,
        None => (value, trimmed),
    };
    match parent {
        Value::Map(map) => map.remove(last),
        Value::List(items) => {
            let index = last.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}
