#![forbid(unsafe_code)]

//! Strict, shape-preserving patch of external data onto existing storage.
//!
//! [`patch`] merges `source` into `target` in place and reports whether
//! anything changed. It never changes the shape of `target`:
//!
//! | target \ source | same primitive kind | `Null` / other primitive | sequence | mapping |
//! |---|---|---|---|---|
//! | `Null` | replace | replace | replace | replace |
//! | primitive | replace if different | replace if either is `Null`, else drop | drop | drop |
//! | sequence | drop | drop | element-wise, then resize | drop |
//! | mapping | drop | drop | drop | key-wise |
//!
//! A mapping patch recurses into keys already present in the target and
//! drops unknown keys, except that an *empty* target mapping is an open
//! record and adopts the source wholesale. A sequence patch recurses over
//! the shared prefix and then truncates or extends to the source length.
//!
//! Dropped input is not an error: the prior value is retained and the
//! mismatch is reported at `debug` level.

use std::collections::BTreeMap;

use tracing::debug;

use crate::value::{Shape, Value};

/// Patch `source` onto `target`. Returns `true` if `target` changed.
pub fn patch(target: &mut Value, source: &Value) -> bool {
    if let (Value::Map(dst), Value::Map(src)) = (&mut *target, source) {
        return patch_map(dst, src);
    }
    if let (Value::List(dst), Value::List(src)) = (&mut *target, source) {
        return patch_list(dst, src);
    }
    if !compatible(target, source) {
        debug!(
            target_kind = target.kind().name(),
            source_kind = source.kind().name(),
            "patch dropped: shape mismatch"
        );
        return false;
    }
    if *target == *source {
        return false;
    }
    *target = source.clone();
    true
}

/// Whether `source` may replace `target` outright.
#[must_use]
pub fn compatible(target: &Value, source: &Value) -> bool {
    match (target, source) {
        (Value::Null, _) => true,
        (_, Value::Null) => target.shape() == Shape::Primitive,
        _ => target.kind() == source.kind(),
    }
}

fn patch_map(dst: &mut BTreeMap<String, Value>, src: &BTreeMap<String, Value>) -> bool {
    if dst.is_empty() {
        if src.is_empty() {
            return false;
        }
        dst.clone_from(src);
        return true;
    }
    let mut changed = false;
    for (key, value) in src {
        match dst.get_mut(key) {
            Some(slot) => changed |= patch(slot, value),
            None => debug!(key = %key, "patch dropped: unknown key"),
        }
    }
    changed
}

fn patch_list(dst: &mut Vec<Value>, src: &[Value]) -> bool {
    let mut changed = false;
    for (slot, value) in dst.iter_mut().zip(src) {
        changed |= patch(slot, value);
    }
    if dst.len() > src.len() {
        dst.truncate(src.len());
        changed = true;
    } else if dst.len() < src.len() {
        let shared = dst.len();
        dst.extend_from_slice(&src[shared..]);
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_is_dropped() {
        let mut target = Value::map([("a", 1)]);
        let changed = patch(&mut target, &Value::map([("a", "str")]));
        assert!(!changed);
        assert_eq!(target, Value::map([("a", 1)]));
    }

    #[test]
    fn same_kind_replaces() {
        let mut target = Value::map([("a", 1)]);
        assert!(patch(&mut target, &Value::map([("a", 2)])));
        assert_eq!(target, Value::map([("a", 2)]));
    }

    #[test]
    fn equal_value_reports_no_change() {
        let mut target = Value::map([("a", 2)]);
        assert!(!patch(&mut target, &Value::map([("a", 2)])));
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let mut target = Value::map([("a", 1)]);
        assert!(!patch(&mut target, &Value::map([("b", 5)])));
        assert!(target.get("b").is_none());
    }

    #[test]
    fn empty_mapping_is_open_record() {
        let mut target = Value::map(Vec::<(String, Value)>::new());
        assert!(patch(&mut target, &Value::map([("b", 5)])));
        assert_eq!(target.get("b"), Some(&Value::from(5)));
    }

    #[test]
    fn null_target_adopts_anything() {
        let mut target = Value::Null;
        assert!(patch(&mut target, &Value::list([1, 2])));
        assert_eq!(target, Value::list([1, 2]));
    }

    #[test]
    fn null_clears_primitive_but_not_container() {
        let mut prim = Value::from("x");
        assert!(patch(&mut prim, &Value::Null));
        assert!(prim.is_null());

        let mut list = Value::list([1]);
        assert!(!patch(&mut list, &Value::Null));
        assert_eq!(list, Value::list([1]));
    }

    #[test]
    fn sequence_resizes_and_recurses() {
        let mut target = Value::list([1, 2, 3]);
        assert!(patch(&mut target, &Value::list([1, 5])));
        assert_eq!(target, Value::list([1, 5]));

        assert!(patch(&mut target, &Value::list([1, 5, 9])));
        assert_eq!(target, Value::list([1, 5, 9]));
    }

    #[test]
    fn sequence_element_mismatch_keeps_old_element() {
        let mut target = Value::list([1, 2]);
        assert!(!patch(&mut target, &Value::list([Value::from(1), Value::from("x")])));
        assert_eq!(target, Value::list([1, 2]));
    }

    #[test]
    fn nested_mapping_is_patched_in_place() {
        let mut target = Value::map([(
            "settings",
            Value::map([("theme", Value::from("dark")), ("size", Value::from(12))]),
        )]);
        let source = Value::map([("settings", Value::map([("size", 14)]))]);
        assert!(patch(&mut target, &source));
        let settings = target.get("settings").and_then(Value::as_map).cloned();
        let settings = settings.unwrap_or_default();
        assert_eq!(settings.get("theme"), Some(&Value::from("dark")));
        assert_eq!(settings.get("size"), Some(&Value::from(14)));
    }

    #[test]
    fn sequence_onto_mapping_dropped() {
        let mut target = Value::map([("a", 1)]);
        assert!(!patch(&mut target, &Value::list([1])));
        assert_eq!(target.kind(), crate::Kind::Map);
    }
}
