#![forbid(unsafe_code)]

//! Reactive sequence container.
//!
//! # Design
//!
//! Indices are not stable identities, so an [`Array`] has no per-key
//! observers: only wildcard observers (any public change, including changes
//! inside nested items) and one structural observer that fires only when the
//! sequence itself changes shape: length or item identity.
//!
//! Every mutator compares item identities before and after. A shape change
//! arms the structural observer for exactly one delivery, enqueues the
//! wildcard observers, and bubbles to the parent. Nested containers entering
//! or leaving the sequence have their parent link set or cleared.
//!
//! User callbacks (`sort_by` comparators, `retain` predicates) run on a copy
//! of the items, never under a borrow.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use ahash::AHashSet;
use tracing::{debug, trace, warn};
use weft_core::{Value, patch, path};

use crate::datum::{Datum, ParentLink, Projection};
use crate::error::{ReactiveError, Result};
use crate::observer::{ObserveOptions, Observer, ObserverId, ObserverIndex, Payload, Subscription, WILDCARD};
use crate::scheduler::{self, Lane};

#[derive(Default)]
pub(crate) struct ArrayState {
    items: Vec<Datum>,
    observers: ObserverIndex,
    structural: Option<Rc<Observer>>,
    parent: Option<ParentLink>,
    disposed: bool,
}

/// Reactive sequence container.
///
/// Cloning yields another handle to the same sequence.
#[derive(Clone, Default)]
pub struct Array {
    inner: Rc<RefCell<ArrayState>>,
}

impl Array {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence of plain values.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let array = Self::new();
        array.inner.borrow_mut().items = values.into_iter().map(Datum::Value).collect();
        array
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<ArrayState>>) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner).cast::<()>() as usize
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    // ─── Reads ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Datum> {
        self.inner.borrow().items.get(index).cloned()
    }

    /// Item `index` exported as a plain value.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<Value> {
        self.get(index).map(|d| d.project(Projection::Public))
    }

    /// Current items; containers by handle.
    #[must_use]
    pub fn items(&self) -> Vec<Datum> {
        self.inner.borrow().items.clone()
    }

    /// Writable projection of every item.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.project(Projection::Writable)
    }

    pub(crate) fn project(&self, projection: Projection) -> Value {
        Value::List(self.items().iter().map(|d| d.project(projection)).collect())
    }

    /// Read a dotted path whose first segment is an index.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let (head, rest) = path::split_first(path);
        let value = self.value(head.parse().ok()?)?;
        match rest {
            None => Some(value),
            Some(rest) => path::get(&value, rest).cloned(),
        }
    }

    // ─── Mutators ───────────────────────────────────────────────────────

    /// Append `item`; returns the new length.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::AlreadyOwned`] / [`ReactiveError::CyclicOwnership`]
    /// for a container that cannot be placed here, [`ReactiveError::Disposed`].
    pub fn push(&self, item: impl Into<Datum>) -> Result<usize> {
        let item = item.into();
        self.admit(std::slice::from_ref(&item), self.len())?;
        self.mutate(false, |items| {
            items.push(item);
            items.len()
        })
    }

    /// Prepend `item`; returns the new length.
    ///
    /// # Errors
    ///
    /// As for [`push`](Self::push).
    pub fn unshift(&self, item: impl Into<Datum>) -> Result<usize> {
        let item = item.into();
        self.admit(std::slice::from_ref(&item), 0)?;
        self.mutate(false, |items| {
            items.insert(0, item);
            items.len()
        })
    }

    /// # Errors
    ///
    /// [`ReactiveError::Disposed`].
    pub fn pop(&self) -> Result<Option<Datum>> {
        self.mutate(false, Vec::pop)
    }

    /// # Errors
    ///
    /// [`ReactiveError::Disposed`].
    pub fn shift(&self) -> Result<Option<Datum>> {
        self.mutate(false, |items| (!items.is_empty()).then(|| items.remove(0)))
    }

    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfBounds`] when `index > len`, plus the
    /// errors of [`push`](Self::push).
    pub fn insert(&self, index: usize, item: impl Into<Datum>) -> Result<()> {
        self.check_bounds(index, self.len() + 1)?;
        let item = item.into();
        self.admit(std::slice::from_ref(&item), index)?;
        self.mutate(false, |items| items.insert(index, item))
    }

    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfBounds`], [`ReactiveError::Disposed`].
    pub fn remove(&self, index: usize) -> Result<Datum> {
        self.check_bounds(index, self.len())?;
        self.mutate(false, |items| items.remove(index))
    }

    /// Remove up to `delete_count` items at `start` and insert `insert` in
    /// their place. Returns the removed items.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfBounds`] when `start > len`, plus the
    /// errors of [`push`](Self::push) for each inserted item.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        insert: impl IntoIterator<Item = Datum>,
    ) -> Result<Vec<Datum>> {
        let len = self.len();
        self.check_bounds(start, len + 1)?;
        let insert: Vec<Datum> = insert.into_iter().collect();
        self.admit(&insert, start)?;
        let end = start + delete_count.min(len - start);
        self.mutate(false, |items| items.splice(start..end, insert).collect())
    }

    /// Replace the item at `index`.
    ///
    /// # Errors
    ///
    /// As for [`insert`](Self::insert), with `index < len`.
    pub fn set_index(&self, index: usize, item: impl Into<Datum>) -> Result<()> {
        self.check_bounds(index, self.len())?;
        let item = item.into();
        self.admit(std::slice::from_ref(&item), index)?;
        self.mutate(false, |items| items[index] = item)
    }

    /// Stable sort with `compare`.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::Disposed`].
    pub fn sort_by(&self, mut compare: impl FnMut(&Datum, &Datum) -> Ordering) -> Result<()> {
        let mut sorted = self.items();
        sorted.sort_by(&mut compare);
        self.mutate(false, |items| *items = sorted)
    }

    /// # Errors
    ///
    /// [`ReactiveError::Disposed`].
    pub fn reverse(&self) -> Result<()> {
        self.mutate(false, |items| items.reverse())
    }

    /// Filter in place, keeping items for which `keep` returns `true`.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::Disposed`].
    pub fn retain(&self, mut keep: impl FnMut(&Datum) -> bool) -> Result<()> {
        let kept: Vec<Datum> = self.items().into_iter().filter(|d| keep(d)).collect();
        self.mutate(false, |items| *items = kept)
    }

    /// # Errors
    ///
    /// [`ReactiveError::Disposed`].
    pub fn clear(&self) -> Result<()> {
        self.mutate(false, Vec::clear)
    }

    /// Strict-patch a whole sequence: shared indices are patched (nested
    /// containers in place), then the sequence is truncated or extended to
    /// the source length. Non-sequence sources are dropped. Returns whether
    /// anything changed.
    pub fn replace(&self, value: &Value, silent: bool) -> bool {
        let Some(source) = value.as_list() else {
            debug!(kind = value.kind().name(), "array replace expects a list; dropped");
            return false;
        };
        let nested: Vec<(usize, Datum)> = self
            .items()
            .into_iter()
            .take(source.len())
            .enumerate()
            .filter(|(_, d)| d.is_container())
            .collect();
        let mut changed = false;
        for (index, datum) in nested {
            changed |= match datum {
                Datum::Object(object) => object.set_data(&source[index], silent),
                Datum::Array(array) => array.replace(&source[index], silent),
                Datum::Value(_) => false,
            };
        }
        let patched = self.mutate(silent, |items| {
            let mut changed = false;
            for (slot, src) in items.iter_mut().zip(source) {
                if let Datum::Value(current) = slot {
                    changed |= patch(current, src);
                }
            }
            let shared = items.len().min(source.len());
            if items.len() != source.len() {
                items.truncate(shared);
                items.extend(source[shared..].iter().cloned().map(Datum::Value));
                changed = true;
            }
            changed
        });
        changed | patched.unwrap_or(false)
    }

    /// Strict-patch at a dotted path whose first segment is an index. A
    /// missing path logs a warning and reports no change.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::Disposed`], or errors from a nested object.
    pub fn set_path(&self, path: &str, value: &Value) -> Result<bool> {
        let (head, rest) = path::split_first(path);
        let Some((index, item)) = self.locate(head) else {
            return Ok(missing_path(path));
        };
        match (item, rest) {
            (Datum::Object(object), None) => Ok(object.set_data(value, false)),
            (Datum::Object(object), Some(rest)) => object.set_path(rest, value),
            (Datum::Array(array), None) => Ok(array.replace(value, false)),
            (Datum::Array(array), Some(rest)) => array.set_path(rest, value),
            (Datum::Value(current), rest) => {
                let mut next = current;
                let changed = match rest {
                    None => patch(&mut next, value),
                    Some(rest) if path::get(&next, rest).is_some() => path::set(&mut next, rest, value),
                    Some(_) => return Ok(missing_path(path)),
                };
                if changed {
                    self.mutate(false, |items| items[index] = Datum::Value(next))?;
                }
                Ok(changed)
            }
        }
    }

    /// Remove the entry at a dotted path; a bare index removes the item. A
    /// missing path logs a warning and returns `false`.
    pub fn remove_path(&self, path: &str) -> bool {
        let (head, rest) = path::split_first(path);
        let Some((index, item)) = self.locate(head) else {
            return missing_path(path);
        };
        match (item, rest) {
            (_, None) => self.remove(index).is_ok(),
            (Datum::Object(object), Some(rest)) => object.remove_path(rest),
            (Datum::Array(array), Some(rest)) => array.remove_path(rest),
            (Datum::Value(mut current), Some(rest)) => {
                if path::remove(&mut current, rest).is_none() {
                    return missing_path(path);
                }
                self.mutate(false, |items| items[index] = Datum::Value(current))
                    .is_ok()
            }
        }
    }

    fn locate(&self, segment: &str) -> Option<(usize, Datum)> {
        let index = segment.parse::<usize>().ok()?;
        self.get(index).map(|item| (index, item))
    }

    fn check_bounds(&self, index: usize, limit: usize) -> Result<()> {
        if index < limit {
            Ok(())
        } else {
            Err(ReactiveError::IndexOutOfBounds {
                index,
                length: self.len(),
            })
        }
    }

    /// Containers entering the sequence must be unowned and must not be an
    /// ancestor of this array.
    fn admit(&self, incoming: &[Datum], at: usize) -> Result<()> {
        let host = Datum::Array(self.clone());
        for (offset, item) in incoming.iter().enumerate() {
            if !item.is_container() {
                continue;
            }
            let key = (at + offset).to_string();
            if item.parent().is_some() {
                return Err(ReactiveError::AlreadyOwned { key });
            }
            if item.would_cycle(&host) {
                return Err(ReactiveError::CyclicOwnership { key });
            }
        }
        let mut seen = AHashSet::new();
        for item in incoming.iter().filter(|d| d.is_container()) {
            if !seen.insert(item) {
                return Err(ReactiveError::AlreadyOwned {
                    key: at.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Apply `f` to the items; on a shape change relink nested containers
    /// and, unless `silent`, notify.
    fn mutate<R>(&self, silent: bool, f: impl FnOnce(&mut Vec<Datum>) -> R) -> Result<R> {
        let (result, before, after) = {
            let mut s = self.inner.borrow_mut();
            if s.disposed {
                return Err(ReactiveError::Disposed);
            }
            let before = s.items.clone();
            let result = f(&mut s.items);
            (result, before, s.items.clone())
        };
        if before != after {
            self.relink(&before, &after);
            if !silent {
                self.did_mutate(after);
            }
        }
        Ok(result)
    }

    fn relink(&self, before: &[Datum], after: &[Datum]) {
        let host = Datum::Array(self.clone());
        let old: AHashSet<&Datum> = before.iter().filter(|d| d.is_container()).collect();
        let new: AHashSet<&Datum> = after.iter().filter(|d| d.is_container()).collect();
        for gone in old.difference(&new) {
            if gone.parent().is_some_and(|link| link.is(&host)) {
                gone.set_parent(None);
            }
        }
        for added in new.difference(&old) {
            added.set_parent(Some(ParentLink::array(&self.inner)));
        }
    }

    /// Shape changed: arm the structural observer, notify wildcards, bubble.
    fn did_mutate(&self, items: Vec<Datum>) {
        let structural = self.inner.borrow().structural.clone();
        if let Some(observer) = structural {
            observer.arm();
            scheduler::enqueue(Lane::Key, &observer, Payload::Items(items));
        }
        self.child_changed();
    }

    /// Something inside the sequence changed: wildcards and parent only.
    pub(crate) fn child_changed(&self) {
        if let Ok(mut s) = self.inner.try_borrow_mut() {
            s.observers.sweep_inactive();
        }
        let (wildcards, parent) = {
            let s = self.inner.borrow();
            if s.disposed {
                return;
            }
            (s.observers.wildcard().to_vec(), s.parent.clone())
        };
        if !wildcards.is_empty() {
            let view = self.project(Projection::Public);
            for observer in &wildcards {
                scheduler::enqueue(Lane::Wildcard, observer, Payload::Value(view.clone()));
            }
        }
        if let Some(parent) = parent {
            parent.bubble();
        }
        scheduler::request_flush();
    }

    // ─── Observers ──────────────────────────────────────────────────────

    /// Observe any change of the sequence or its items.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::Disposed`].
    pub fn observe(
        &self,
        callback: impl Fn(&Value) + 'static,
        options: ObserveOptions,
    ) -> Result<Option<Subscription>> {
        if self.is_disposed() {
            return Err(ReactiveError::Disposed);
        }
        let observer = Rc::new(Observer::value(Rc::new(callback), &options));
        self.inner.borrow_mut().observers.add(WILDCARD, Rc::clone(&observer));
        if !options.silent {
            let view = self.project(Projection::Public);
            scheduler::enqueue(Lane::Wildcard, &observer, Payload::Value(view));
            scheduler::request_flush();
        }
        if !options.cancelable {
            return Ok(None);
        }
        let id = observer.id();
        let weak_observer = Rc::downgrade(&observer);
        let weak_state = Rc::downgrade(&self.inner);
        Ok(Some(Subscription::new(id, move || {
            if let Some(observer) = weak_observer.upgrade() {
                observer.deactivate();
            }
            if let Some(state) = weak_state.upgrade() {
                match state.try_borrow_mut() {
                    Ok(mut s) => {
                        s.observers.remove(WILDCARD, id);
                    }
                    Err(_) => trace!(id = id.raw(), "observer busy; swept on next change"),
                }
            }
        })))
    }

    /// Unregister a wildcard observer. Unknown ids log a warning.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let removed = self.inner.borrow_mut().observers.remove(WILDCARD, id);
        if !removed {
            warn!(id = id.raw(), "unobserve: no such observer");
        }
        removed
    }

    /// Register the structural observer, replacing any previous one.
    ///
    /// The callback receives the items after each shape change, at most once
    /// per flush, and never for changes inside nested items. Dropping the
    /// returned subscription unregisters it.
    pub fn on_structure(&self, callback: impl Fn(&[Datum]) + 'static) -> Subscription {
        let observer = Rc::new(Observer::structural(Rc::new(callback)));
        let previous = self.inner.borrow_mut().structural.replace(Rc::clone(&observer));
        if let Some(previous) = previous {
            previous.deactivate();
        }
        let id = observer.id();
        let weak_observer = Rc::downgrade(&observer);
        let weak_state = Rc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(observer) = weak_observer.upgrade() {
                observer.deactivate();
            }
            if let Some(state) = weak_state.upgrade() {
                if let Ok(mut s) = state.try_borrow_mut() {
                    if s.structural.as_ref().is_some_and(|o| o.id() == id) {
                        s.structural = None;
                    }
                }
            }
        })
    }

    // ─── Ownership ──────────────────────────────────────────────────────

    pub(crate) fn parent(&self) -> Option<ParentLink> {
        self.inner.borrow().parent.clone()
    }

    pub(crate) fn set_parent(&self, link: Option<ParentLink>) {
        self.inner.borrow_mut().parent = link;
    }

    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.inner.borrow().parent.is_some()
    }

    /// Release observers, detach from the parent and dispose nested items.
    /// Idempotent.
    pub fn dispose(&self) {
        let children: Vec<Datum> = {
            let mut s = self.inner.borrow_mut();
            if s.disposed {
                return;
            }
            s.disposed = true;
            s.observers.clear();
            if let Some(structural) = s.structural.take() {
                structural.deactivate();
            }
            s.parent = None;
            s.items.iter().filter(|d| d.is_container()).cloned().collect()
        };
        for child in children {
            child.dispose();
        }
    }
}

fn missing_path(path: &str) -> bool {
    warn!(path, "path does not exist; ignored");
    false
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(s) => f
                .debug_struct("Array")
                .field("len", &s.items.len())
                .field("observers", &s.observers.len())
                .field("structural", &s.structural.is_some())
                .field("disposed", &s.disposed)
                .finish(),
            Err(_) => f.write_str("Array(<borrowed>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use std::cell::Cell;

    fn flush() {
        scheduler::tick().expect("flush");
    }

    fn structural_counter(array: &Array) -> (Rc<Cell<usize>>, Rc<RefCell<Vec<Datum>>>, Subscription) {
        let count = Rc::new(Cell::new(0));
        let last = Rc::new(RefCell::new(Vec::new()));
        let (c, l) = (Rc::clone(&count), Rc::clone(&last));
        let sub = array.on_structure(move |items| {
            c.set(c.get() + 1);
            *l.borrow_mut() = items.to_vec();
        });
        (count, last, sub)
    }

    fn nums(values: &[i32]) -> Array {
        Array::from_values(values.iter().map(|n| Value::from(*n)))
    }

    #[test]
    fn mutators_follow_vec_semantics() {
        scheduler::reset();
        let a = nums(&[1, 2, 3]);
        assert_eq!(a.push(4), Ok(4));
        assert_eq!(a.unshift(0), Ok(5));
        assert_eq!(a.pop(), Ok(Some(Datum::from(4))));
        assert_eq!(a.shift(), Ok(Some(Datum::from(0))));
        a.insert(1, 9).expect("insert");
        assert_eq!(a.snapshot(), Value::list([1, 9, 2, 3]));
        assert_eq!(a.remove(1), Ok(Datum::from(9)));
        let removed = a.splice(1, 5, [Datum::from(7), Datum::from(8)]).expect("splice");
        assert_eq!(removed, vec![Datum::from(2), Datum::from(3)]);
        assert_eq!(a.snapshot(), Value::list([1, 7, 8]));
        a.reverse().expect("reverse");
        a.retain(|d| d != &Datum::from(7)).expect("retain");
        assert_eq!(a.snapshot(), Value::list([8, 1]));
        a.sort_by(|x, y| {
            let (x, y) = (x.as_value().and_then(Value::as_number), y.as_value().and_then(Value::as_number));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        })
        .expect("sort");
        assert_eq!(a.snapshot(), Value::list([1, 8]));
        a.clear().expect("clear");
        assert!(a.is_empty());
        assert_eq!(a.pop(), Ok(None));
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        scheduler::reset();
        let a = nums(&[1]);
        assert!(matches!(a.remove(3), Err(ReactiveError::IndexOutOfBounds { index: 3, .. })));
        assert!(a.insert(1, 2).is_ok());
        assert!(a.insert(5, 2).is_err());
        assert!(a.splice(9, 0, Vec::new()).is_err());
    }

    #[test]
    fn structural_observer_fires_once_per_flush() {
        scheduler::reset();
        let a = nums(&[1, 2]);
        let (count, last, _sub) = structural_counter(&a);
        a.push(3).expect("push");
        a.push(4).expect("push");
        flush();
        assert_eq!(count.get(), 1);
        assert_eq!(last.borrow().len(), 4);
    }

    #[test]
    fn order_preserving_sort_is_not_structural() {
        scheduler::reset();
        let a = nums(&[1, 2, 3]);
        let (count, _, _sub) = structural_counter(&a);
        a.sort_by(|_, _| Ordering::Equal).expect("sort");
        flush();
        assert_eq!(count.get(), 0);
        a.reverse().expect("reverse");
        flush();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn nested_change_skips_structural_but_reaches_wildcards() {
        scheduler::reset();
        let a = Array::new();
        let row = Object::from_value(&Value::map([("label", "x")])).expect("row");
        a.push(row.clone()).expect("push");
        assert!(row.has_parent());
        flush();

        let (count, _, _sub) = structural_counter(&a);
        let wild = Rc::new(Cell::new(0));
        let w = Rc::clone(&wild);
        a.observe(move |_| w.set(w.get() + 1), ObserveOptions::new().silent())
            .expect("observe");
        row.set("label", "y").expect("set");
        flush();
        assert_eq!(count.get(), 0);
        assert_eq!(wild.get(), 1);
        assert_eq!(a.get_path("0.label"), Some(Value::from("y")));
    }

    #[test]
    fn removed_container_is_released() {
        scheduler::reset();
        let a = Array::new();
        let row = Object::from_value(&Value::map([("n", 1)])).expect("row");
        a.push(row.clone()).expect("push");
        assert_eq!(
            a.push(row.clone()),
            Err(ReactiveError::AlreadyOwned { key: "1".into() })
        );
        a.pop().expect("pop");
        assert!(!row.has_parent());
        a.push(row).expect("re-push after release");
    }

    #[test]
    fn array_cannot_contain_itself() {
        scheduler::reset();
        let a = Array::new();
        assert_eq!(
            a.push(a.clone()),
            Err(ReactiveError::CyclicOwnership { key: "0".into() })
        );
    }

    #[test]
    fn replace_is_strict() {
        scheduler::reset();
        let a = nums(&[1, 2, 3]);
        assert!(!a.replace(&Value::from("nope"), false));
        assert!(!a.replace(&Value::list([1, 2, 3]), false));
        assert!(a.replace(&Value::list([Value::from(1), Value::from("two")]), false));
        assert_eq!(a.snapshot(), Value::list([1, 2]), "mismatched item dropped, tail truncated");
        assert!(a.replace(&Value::list([1, 2, 5]), false));
        assert_eq!(a.snapshot(), Value::list([1, 2, 5]));
    }

    #[test]
    fn paths_into_items() {
        scheduler::reset();
        let a = Array::from_values([Value::map([("n", 1)])]);
        assert_eq!(a.set_path("0.n", &Value::from(2)), Ok(true));
        assert_eq!(a.get_path("0.n"), Some(Value::from(2)));
        assert_eq!(a.set_path("4.n", &Value::from(2)), Ok(false));
        assert!(a.remove_path("0.n"));
        assert_eq!(a.get_path("0"), Some(Value::map(Vec::<(String, Value)>::new())));
        assert!(a.remove_path("0"));
        assert!(!a.remove_path("0"));
    }

    #[test]
    fn structural_subscription_drop_unregisters() {
        scheduler::reset();
        let a = nums(&[]);
        let (count, _, sub) = structural_counter(&a);
        drop(sub);
        a.push(1).expect("push");
        flush();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn disposed_array_rejects_writes() {
        scheduler::reset();
        let a = nums(&[1]);
        a.dispose();
        assert_eq!(a.push(2), Err(ReactiveError::Disposed));
        assert!(!a.replace(&Value::list([5]), false));
    }
}
