#![forbid(unsafe_code)]

//! Memoized derived properties.
//!
//! # Design
//!
//! A [`ComputedDef`] is created once per blueprint: name, derivation, and
//! the dependency names discovered at install time. Every container instance
//! wraps it in its own [`ComputedProperty`] so cached values are never shared
//! between instances.
//!
//! Derivations read through a [`Scope`]. During install the scope records
//! every name read; at runtime it reads the live container.
//!
//! # Invariants
//!
//! 1. The cache is valid iff `dirty` is false.
//! 2. [`ComputedProperty::value`] runs the derivation only when dirty.
//! 3. The cache is replaced only when the new value differs from it;
//!    `has_changed` reports whether the last recomputation replaced it.
//! 4. `version` increments by exactly 1 per derivation run.
//!
//! # Failure Modes
//!
//! - **Derivation returns an error**: the previous cache is kept, the
//!   recomputation reports "no change", and a `warn` event is logged.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::{trace, warn};
use weft_core::Value;

use crate::graph;

/// Signature of a derivation: reads through the scope, receives the previous
/// value (if any).
pub type Derivation = Rc<dyn Fn(&Scope<'_>, Option<&Value>) -> Result<Value, DeriveError>>;

/// Error returned from a derivation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeriveError {
    /// Read of a name the container does not declare.
    #[error("unknown property `{0}`")]
    UnknownKey(String),
    #[error("property `{key}` is not a {expected}")]
    Type { key: String, expected: &'static str },
    #[error("{0}")]
    Message(String),
}

/// Read access used by a [`Scope`].
pub(crate) trait Lookup {
    fn lookup(&self, key: &str) -> Option<Value>;
}

/// Read accessor handed to derivations.
///
/// While a blueprint is being installed the scope is *recording*: every
/// name read is captured as a dependency, and the typed accessors return
/// neutral defaults instead of type errors since computed inputs are not
/// known yet.
pub struct Scope<'a> {
    source: &'a dyn Lookup,
    reads: Option<&'a RefCell<Vec<String>>>,
}

impl<'a> Scope<'a> {
    pub(crate) fn live(source: &'a dyn Lookup) -> Self {
        Self {
            source,
            reads: None,
        }
    }

    pub(crate) fn recording(source: &'a dyn Lookup, reads: &'a RefCell<Vec<String>>) -> Self {
        Self {
            source,
            reads: Some(reads),
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.reads.is_some()
    }

    /// Read a property.
    ///
    /// # Errors
    ///
    /// [`DeriveError::UnknownKey`] when the container does not declare `key`.
    pub fn get(&self, key: &str) -> Result<Value, DeriveError> {
        if let Some(reads) = self.reads {
            trace!(computed = ?graph::installing(), key, "dependency read");
            reads.borrow_mut().push(key.to_owned());
        }
        self.source
            .lookup(key)
            .ok_or_else(|| DeriveError::UnknownKey(key.to_owned()))
    }

    /// Read a numeric property. `Null` is not a number.
    ///
    /// # Errors
    ///
    /// Unknown key, or a non-numeric value outside of recording.
    pub fn number(&self, key: &str) -> Result<f64, DeriveError> {
        let value = self.get(key)?;
        self.typed(key, value.as_number(), "number", 0.0)
    }

    /// # Errors
    ///
    /// Unknown key, or a non-text value outside of recording.
    pub fn text(&self, key: &str) -> Result<String, DeriveError> {
        let value = self.get(key)?;
        let text = value.as_str().map(str::to_owned);
        self.typed(key, text, "text", String::new())
    }

    /// # Errors
    ///
    /// Unknown key, or a non-boolean value outside of recording.
    pub fn flag(&self, key: &str) -> Result<bool, DeriveError> {
        let value = self.get(key)?;
        self.typed(key, value.as_bool(), "boolean", false)
    }

    fn typed<T>(
        &self,
        key: &str,
        value: Option<T>,
        expected: &'static str,
        neutral: T,
    ) -> Result<T, DeriveError> {
        match value {
            Some(value) => Ok(value),
            None if self.is_recording() => Ok(neutral),
            None => Err(DeriveError::Type {
                key: key.to_owned(),
                expected,
            }),
        }
    }
}

/// Blueprint-level definition shared by every instance.
pub struct ComputedDef {
    pub(crate) name: String,
    pub(crate) derive: Derivation,
    pub(crate) deps: Vec<String>,
}

impl ComputedDef {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names read by the derivation, in first-read order.
    #[must_use]
    pub fn deps(&self) -> &[String] {
        &self.deps
    }
}

impl fmt::Debug for ComputedDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedDef")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Per-instance memoized value of one computed property.
pub struct ComputedProperty {
    def: Rc<ComputedDef>,
    cached: RefCell<Option<Value>>,
    dirty: Cell<bool>,
    changed: Cell<bool>,
    version: Cell<u64>,
}

impl ComputedProperty {
    pub(crate) fn new(def: Rc<ComputedDef>) -> Self {
        Self {
            def,
            cached: RefCell::new(None),
            dirty: Cell::new(true),
            changed: Cell::new(false),
            version: Cell::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    #[must_use]
    pub fn deps(&self) -> &[String] {
        &self.def.deps
    }

    /// Current value, recomputing first if dirty.
    pub(crate) fn value(&self, scope: &Scope<'_>) -> Value {
        if self.dirty.get() {
            self.recompute(scope);
        }
        self.cached.borrow().clone().unwrap_or_default()
    }

    fn recompute(&self, scope: &Scope<'_>) {
        let previous = self.cached.borrow().clone();
        self.version.set(self.version.get() + 1);
        self.dirty.set(false);
        match (self.def.derive)(scope, previous.as_ref()) {
            Ok(next) => {
                let changed = previous.as_ref() != Some(&next);
                self.changed.set(changed);
                if changed {
                    trace!(computed = %self.def.name, value = %next, "recomputed");
                    *self.cached.borrow_mut() = Some(next);
                }
            }
            Err(err) => {
                warn!(computed = %self.def.name, error = %err, "derivation failed; keeping previous value");
                self.changed.set(false);
            }
        }
    }

    /// Mark the cache stale.
    pub fn invalidate(&self) {
        self.dirty.set(true);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Whether the last recomputation replaced the cache.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.changed.get()
    }

    /// Number of derivation runs so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.get()
    }
}

impl fmt::Debug for ComputedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedProperty")
            .field("name", &self.def.name)
            .field("cached", &self.cached.borrow())
            .field("dirty", &self.dirty.get())
            .field("version", &self.version.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct Table(RefCell<BTreeMap<String, Value>>);

    impl Lookup for Table {
        fn lookup(&self, key: &str) -> Option<Value> {
            self.0.borrow().get(key).cloned()
        }
    }

    fn table(entries: &[(&str, Value)]) -> Table {
        Table(RefCell::new(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        ))
    }

    fn doubled() -> ComputedProperty {
        let derive: Derivation = Rc::new(|s: &Scope<'_>, _: Option<&Value>| Ok(Value::from(s.number("a")? * 2.0)));
        ComputedProperty::new(Rc::new(ComputedDef {
            name: "double".into(),
            derive,
            deps: vec!["a".into()],
        }))
    }

    #[test]
    fn memoizes_until_invalidated() {
        let source = table(&[("a", Value::from(2))]);
        let scope = Scope::live(&source);
        let c = doubled();
        assert_eq!(c.value(&scope), Value::from(4));
        assert_eq!(c.value(&scope), Value::from(4));
        assert_eq!(c.version(), 1);

        source.0.borrow_mut().insert("a".into(), Value::from(5));
        assert_eq!(c.value(&scope), Value::from(4), "stale until invalidated");
        c.invalidate();
        assert_eq!(c.value(&scope), Value::from(10));
        assert_eq!(c.version(), 2);
        assert!(c.has_changed());
    }

    #[test]
    fn equal_result_reports_no_change() {
        let source = table(&[("a", Value::from(2))]);
        let scope = Scope::live(&source);
        let c = doubled();
        c.value(&scope);
        c.invalidate();
        c.value(&scope);
        assert!(!c.has_changed());
    }

    #[test]
    fn failing_derivation_keeps_cache() {
        let source = table(&[("a", Value::from(2))]);
        let scope = Scope::live(&source);
        let c = doubled();
        c.value(&scope);
        source.0.borrow_mut().insert("a".into(), Value::from("oops"));
        c.invalidate();
        assert_eq!(c.value(&scope), Value::from(4));
        assert!(!c.has_changed());
        assert!(!c.is_dirty());
    }

    #[test]
    fn recording_scope_is_lenient_and_records() {
        let source = table(&[("a", Value::Null), ("b", Value::from("x"))]);
        let reads = RefCell::new(Vec::new());
        let scope = Scope::recording(&source, &reads);
        assert_eq!(scope.number("a"), Ok(0.0));
        assert_eq!(scope.flag("b"), Ok(false));
        assert_eq!(scope.get("zzz"), Err(DeriveError::UnknownKey("zzz".into())));
        assert_eq!(*reads.borrow(), vec!["a", "b", "zzz"]);
    }

    #[test]
    fn live_scope_reports_type_errors() {
        let source = table(&[("b", Value::from("x"))]);
        let scope = Scope::live(&source);
        assert_eq!(
            scope.number("b"),
            Err(DeriveError::Type {
                key: "b".into(),
                expected: "number"
            })
        );
        assert_eq!(scope.text("b"), Ok("x".to_owned()));
    }

    #[test]
    fn previous_value_is_passed_in() {
        let source = table(&[]);
        let scope = Scope::live(&source);
        let derive: Derivation = Rc::new(|_: &Scope<'_>, prev: Option<&Value>| {
            let n = prev.and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::from(n + 1.0))
        });
        let c = ComputedProperty::new(Rc::new(ComputedDef {
            name: "counter".into(),
            derive,
            deps: Vec::new(),
        }));
        assert_eq!(c.value(&scope), Value::from(1));
        c.invalidate();
        assert_eq!(c.value(&scope), Value::from(2));
    }
}
