#![forbid(unsafe_code)]

//! Reactive mapping container.
//!
//! # Design
//!
//! [`Object`] is a cheap handle (`Rc<RefCell<ObjectState>>`) over one
//! instantiation of a [`Blueprint`]. It owns its plain data, nested
//! containers, per-instance computed properties, dependency graph, observer
//! index, outgoing bindings and bound-from bindings, plus an optional weak
//! link to the container holding it.
//!
//! A write is strict-patched onto the slot. When it changes something,
//! [`resolve`](Object::resolve) runs:
//!
//! 1. computed properties downstream of the key are recomputed in install
//!    order, each at most once, and only when one of its inputs changed;
//! 2. key observers of the key and of every changed computed property are
//!    enqueued;
//! 3. unless every changed name is private: wildcard observers are enqueued
//!    with the public view and the change bubbles to the parent;
//! 4. bindings exposed for any changed name forward to their consumers;
//! 5. a flush is requested.
//!
//! No `RefCell` borrow is held while user code (derivations, callbacks) or
//! another container runs.
//!
//! # Failure Modes
//!
//! - **Shape mismatch**: dropped by the strict patch, reported as no change.
//! - **Write to a computed name**: [`ReactiveError::ReadonlyComputed`].
//! - **Write to a disposed container**: [`ReactiveError::Disposed`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};
use tracing::{debug, trace, warn};
use weft_core::{Value, is_private, patch, path};

use crate::array::Array;
use crate::binding::Binding;
use crate::blueprint::{Blueprint, Field};
use crate::computed::{ComputedProperty, Lookup, Scope};
use crate::datum::{Datum, ParentLink, Projection};
use crate::error::{ReactiveError, Result};
use crate::graph::DependencyGraph;
use crate::observer::{ObserveOptions, Observer, ObserverId, ObserverIndex, Payload, Subscription, WILDCARD};
use crate::scheduler::{self, Lane};

pub(crate) struct ObjectState {
    blueprint: Blueprint,
    data: BTreeMap<String, Datum>,
    computed: AHashMap<String, Rc<ComputedProperty>>,
    graph: DependencyGraph,
    observers: ObserverIndex,
    /// Bindings this instance exposes, by source key.
    exposed: AHashMap<String, Binding>,
    /// Bindings this instance forwards through, by consumer key.
    bound: AHashMap<String, Binding>,
    parent: Option<ParentLink>,
    disposed: bool,
}

/// What a key resolves to, extracted so the borrow can be released.
enum Slot {
    Computed(Rc<ComputedProperty>),
    Bound(Binding),
    Datum(Datum),
}

/// Reactive mapping container.
///
/// Cloning yields another handle to the same container.
#[derive(Clone)]
pub struct Object {
    inner: Rc<RefCell<ObjectState>>,
}

impl Object {
    /// Instantiate `blueprint`: nested containers are created, computed
    /// properties cloned per instance, and declared bindings connected.
    ///
    /// # Errors
    ///
    /// Binding connection errors ([`ReactiveError::SelfBinding`],
    /// [`ReactiveError::DetachedBinding`], ...).
    pub fn new(blueprint: &Blueprint) -> Result<Self> {
        let mut data = BTreeMap::new();
        let mut bindings = Vec::new();
        for (key, field) in blueprint.fields() {
            let datum = match field {
                Field::Data(value) => Datum::Value(value.clone()),
                Field::Object(nested) => Datum::Object(Object::new(nested)?),
                Field::Array(items) => Datum::Array(Array::from_values(items.iter().cloned())),
                Field::Bound(binding) => {
                    bindings.push((key.clone(), binding.clone()));
                    continue;
                }
            };
            data.insert(key.clone(), datum);
        }
        let computed: AHashMap<String, Rc<ComputedProperty>> = blueprint
            .computed_defs()
            .iter()
            .map(|(name, def)| (name.clone(), Rc::new(ComputedProperty::new(Rc::clone(def)))))
            .collect();
        let graph = DependencyGraph::build(blueprint.dependents_map(), &computed);

        let inner = Rc::new(RefCell::new(ObjectState {
            blueprint: blueprint.clone(),
            data,
            computed,
            graph,
            observers: ObserverIndex::default(),
            exposed: AHashMap::new(),
            bound: AHashMap::new(),
            parent: None,
            disposed: false,
        }));
        let object = Self { inner };
        for (key, child) in object.children() {
            child.set_parent(Some(ParentLink::object(&object.inner, &key)));
        }
        for (key, binding) in bindings {
            binding.connect(&object, &key)?;
        }
        Ok(object)
    }

    /// Instantiate a blueprint of plain data fields taken from `map`.
    ///
    /// # Errors
    ///
    /// See [`Blueprint::from_value`].
    pub fn from_value(map: &Value) -> Result<Self> {
        Self::new(&Blueprint::from_value(map)?)
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<ObjectState>>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<ObjectState>> {
        Rc::downgrade(&self.inner)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner).cast::<()>() as usize
    }

    #[must_use]
    pub fn blueprint(&self) -> Blueprint {
        self.inner.borrow().blueprint.clone()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Whether `key` is readable on this container.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let s = self.inner.borrow();
        s.data.contains_key(key) || s.computed.contains_key(key) || s.bound.contains_key(key)
    }

    fn slot(&self, key: &str) -> Option<Slot> {
        let s = self.inner.borrow();
        if let Some(c) = s.computed.get(key) {
            Some(Slot::Computed(Rc::clone(c)))
        } else if let Some(b) = s.bound.get(key) {
            Some(Slot::Bound(b.clone()))
        } else {
            s.data.get(key).cloned().map(Slot::Datum)
        }
    }

    fn children(&self) -> Vec<(String, Datum)> {
        self.inner
            .borrow()
            .data
            .iter()
            .filter(|(_, d)| d.is_container())
            .map(|(k, d)| (k.clone(), d.clone()))
            .collect()
    }

    // ─── Reads ──────────────────────────────────────────────────────────

    /// Current value of `key`. Nested containers are exported with their
    /// public view; computed properties recompute if stale.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnknownKey`].
    pub fn get(&self, key: &str) -> Result<Value> {
        match self.slot(key) {
            Some(Slot::Bound(binding)) => binding.read(),
            Some(slot) => Ok(self.read_slot(slot)),
            None => Err(ReactiveError::unknown(key)),
        }
    }

    fn read_slot(&self, slot: Slot) -> Value {
        match slot {
            Slot::Computed(c) => c.value(&Scope::live(self)),
            Slot::Bound(b) => b.read().unwrap_or_default(),
            Slot::Datum(d) => d.project(Projection::Public),
        }
    }

    /// Live slot content: nested containers by handle.
    #[must_use]
    pub fn get_datum(&self, key: &str) -> Option<Datum> {
        match self.slot(key)? {
            Slot::Datum(d) => Some(d),
            slot => Some(Datum::Value(self.read_slot(slot))),
        }
    }

    /// Nested object held in `key`.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Object> {
        match self.inner.borrow().data.get(key)? {
            Datum::Object(o) => Some(o.clone()),
            _ => None,
        }
    }

    /// Nested array held in `key`.
    #[must_use]
    pub fn array(&self, key: &str) -> Option<Array> {
        match self.inner.borrow().data.get(key)? {
            Datum::Array(a) => Some(a.clone()),
            _ => None,
        }
    }

    /// Per-instance computed property `key`.
    #[must_use]
    pub fn computed(&self, key: &str) -> Option<Rc<ComputedProperty>> {
        self.inner.borrow().computed.get(key).cloned()
    }

    /// Every property as one mapping, or, with `writable_only`, the writable
    /// projection (no private, computed, or bound properties).
    #[must_use]
    pub fn get_data(&self, writable_only: bool) -> Value {
        self.project(if writable_only {
            Projection::Writable
        } else {
            Projection::All
        })
    }

    /// Writable projection, suitable for persistence and [`set_data`](Self::set_data).
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.project(Projection::Writable)
    }

    /// The blueprint's initial writable values.
    #[must_use]
    pub fn defaults(&self) -> Value {
        self.inner.borrow().blueprint.defaults()
    }

    pub(crate) fn project(&self, projection: Projection) -> Value {
        let (data, mut derived) = {
            let s = self.inner.borrow();
            let derived: Vec<String> = match projection {
                Projection::Writable => Vec::new(),
                _ => s.computed.keys().chain(s.bound.keys()).cloned().collect(),
            };
            (s.data.clone(), derived)
        };
        let keep = |key: &str| projection == Projection::All || !is_private(key);
        let mut out: BTreeMap<String, Value> = data
            .into_iter()
            .filter(|(key, _)| keep(key.as_str()))
            .map(|(key, datum)| {
                let value = datum.project(projection);
                (key, value)
            })
            .collect();
        derived.retain(|key| keep(key.as_str()));
        for key in derived {
            if let Some(slot) = self.slot(&key) {
                let value = self.read_slot(slot);
                out.insert(key, value);
            }
        }
        Value::Map(out)
    }

    /// Read a dotted path. The first segment names a property.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let (head, rest) = path::split_first(path);
        let value = self.get(head).ok()?;
        match rest {
            None => Some(value),
            Some(rest) => path::get(&value, rest).cloned(),
        }
    }

    // ─── Writes ─────────────────────────────────────────────────────────

    /// Write `key` and propagate. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// See [`set_datum`](Self::set_datum).
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.set_datum(key, &value.into(), false)
    }

    /// Strict-patch `value` onto `key`.
    ///
    /// Nested containers are patched in place so existing observers of the
    /// nested container keep working. Bound properties write through to the
    /// binding source. With `silent`, dependents are invalidated but nobody
    /// is notified.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnknownKey`], [`ReactiveError::ReadonlyComputed`],
    /// [`ReactiveError::ReadonlyBinding`], [`ReactiveError::Disposed`].
    pub fn set_datum(&self, key: &str, value: &Value, silent: bool) -> Result<bool> {
        if self.is_disposed() {
            return Err(ReactiveError::Disposed);
        }
        let changed = match self.slot(key) {
            None => return Err(ReactiveError::unknown(key)),
            Some(Slot::Computed(_)) => {
                return Err(ReactiveError::ReadonlyComputed {
                    key: key.to_owned(),
                });
            }
            // The source resolves and forwards back to this consumer.
            Some(Slot::Bound(binding)) => return binding.write(value, silent),
            // Nested containers bubble their own changes up to this key.
            Some(Slot::Datum(Datum::Object(child))) => {
                let changed = child.set_data(value, silent);
                if changed && silent {
                    self.invalidate_dependents(key);
                }
                return Ok(changed);
            }
            Some(Slot::Datum(Datum::Array(child))) => {
                let changed = child.replace(value, silent);
                if changed && silent {
                    self.invalidate_dependents(key);
                }
                return Ok(changed);
            }
            Some(Slot::Datum(Datum::Value(_))) => {
                let mut s = self.inner.borrow_mut();
                let patched = s.data.get_mut(key).is_some_and(|slot| match slot {
                    Datum::Value(current) => patch(current, value),
                    _ => false,
                });
                patched
            }
        };
        if changed {
            if silent {
                self.invalidate_dependents(key);
            } else {
                self.resolve(key);
            }
        }
        Ok(changed)
    }

    /// Patch several properties from a mapping. Unknown and computed names
    /// are dropped, as is anything that is not a mapping. Returns whether
    /// anything changed.
    pub fn set_data(&self, map: &Value, silent: bool) -> bool {
        let Some(entries) = map.as_map() else {
            debug!(kind = map.kind().name(), "set_data expects a map; dropped");
            return false;
        };
        let mut changed = false;
        for (key, value) in entries {
            match self.set_datum(key, value, silent) {
                Ok(c) => changed |= c,
                Err(err) => debug!(key = %key, error = %err, "set_data entry dropped"),
            }
        }
        changed
    }

    /// Strict-patch the value at a dotted path.
    ///
    /// A missing path logs a warning and reports no change.
    ///
    /// # Errors
    ///
    /// As for [`set_datum`](Self::set_datum) on the first segment.
    pub fn set_path(&self, path: &str, value: &Value) -> Result<bool> {
        let (head, rest) = path::split_first(path);
        let Some(rest) = rest else {
            return self.set_datum(head, value, false);
        };
        let changed = match self.slot(head) {
            None => return Err(ReactiveError::unknown(head)),
            Some(Slot::Computed(_)) => {
                return Err(ReactiveError::ReadonlyComputed {
                    key: head.to_owned(),
                });
            }
            Some(Slot::Bound(binding)) => {
                let mut current = binding.read()?;
                if !path::set(&mut current, rest, value) {
                    return Ok(self.missing_path(path));
                }
                return binding.write(&current, false);
            }
            Some(Slot::Datum(Datum::Object(child))) => return child.set_path(rest, value),
            Some(Slot::Datum(Datum::Array(child))) => return child.set_path(rest, value),
            Some(Slot::Datum(Datum::Value(_))) => {
                let mut s = self.inner.borrow_mut();
                let Some(Datum::Value(current)) = s.data.get_mut(head) else {
                    return Ok(false);
                };
                if path::get(current, rest).is_none() {
                    drop(s);
                    return Ok(self.missing_path(path));
                }
                path::set(current, rest, value)
            }
        };
        if changed {
            self.resolve(head);
        }
        Ok(changed)
    }

    /// Remove the entry at a dotted path inside a property value. Top-level
    /// properties cannot be removed. A missing path logs a warning and
    /// returns `false`.
    pub fn remove_path(&self, path: &str) -> bool {
        let (head, rest) = path::split_first(path);
        let Some(rest) = rest else {
            warn!(path, "declared properties cannot be removed");
            return false;
        };
        let removed = match self.slot(head) {
            Some(Slot::Datum(Datum::Object(child))) => return child.remove_path(rest),
            Some(Slot::Datum(Datum::Array(child))) => return child.remove_path(rest),
            Some(Slot::Datum(Datum::Value(_))) => {
                let mut s = self.inner.borrow_mut();
                let removed = match s.data.get_mut(head) {
                    Some(Datum::Value(current)) => path::remove(current, rest).is_some(),
                    _ => false,
                };
                removed
            }
            _ => false,
        };
        if removed {
            self.resolve(head);
        } else {
            self.missing_path(path);
        }
        removed
    }

    fn missing_path(&self, path: &str) -> bool {
        warn!(path, "path does not exist; ignored");
        false
    }

    // ─── Propagation ────────────────────────────────────────────────────

    /// Propagate a change of `key`. Called after a write changed storage,
    /// when a nested child changed, or when a binding source changed.
    pub(crate) fn resolve(&self, key: &str) {
        if let Ok(mut s) = self.inner.try_borrow_mut() {
            let swept = s.observers.sweep_inactive();
            if swept > 0 {
                trace!(swept, "swept released observers");
            }
        }
        let (blueprint, affected) = {
            let s = self.inner.borrow();
            if s.disposed {
                return;
            }
            (s.blueprint.clone(), s.graph.closure(key))
        };
        let affected: AHashMap<&str, &Rc<ComputedProperty>> =
            affected.iter().map(|c| (c.name(), c)).collect();

        let mut changed: Vec<&str> = vec![key];
        let mut changed_set: AHashSet<&str> = AHashSet::from_iter([key]);
        for name in blueprint.install_order() {
            let Some(computed) = affected.get(name.as_str()) else {
                continue;
            };
            if !computed.deps().iter().any(|d| changed_set.contains(d.as_str())) {
                continue;
            }
            computed.invalidate();
            computed.value(&Scope::live(self));
            if computed.has_changed() {
                changed.push(name);
                changed_set.insert(name);
            }
        }
        trace!(key, changed = ?changed, "resolved");

        let mut calls = Vec::new();
        for name in &changed {
            let observers: Vec<Rc<Observer>> = self.inner.borrow().observers.keyed(name).to_vec();
            if observers.is_empty() {
                continue;
            }
            let Some(slot) = self.slot(name) else {
                continue;
            };
            let value = self.read_slot(slot);
            calls.extend(observers.into_iter().map(|o| (o, value.clone())));
        }
        for (observer, value) in calls {
            scheduler::enqueue(Lane::Key, &observer, Payload::Value(value));
        }

        let public = changed.iter().any(|name| !is_private(name));
        let (wildcards, exposed, parent) = {
            let s = self.inner.borrow();
            let exposed: Vec<Binding> = changed
                .iter()
                .filter_map(|name| s.exposed.get(*name).cloned())
                .collect();
            (s.observers.wildcard().to_vec(), exposed, s.parent.clone())
        };
        if public && !wildcards.is_empty() {
            let view = self.project(Projection::Public);
            for observer in &wildcards {
                scheduler::enqueue(Lane::Wildcard, observer, Payload::Value(view.clone()));
            }
        }
        for binding in exposed {
            binding.propagate();
        }
        if public {
            if let Some(parent) = parent {
                parent.bubble();
            }
        }
        scheduler::request_flush();
    }

    /// Mark everything downstream of `key` stale, here and across bindings,
    /// without notifying.
    pub(crate) fn invalidate_dependents(&self, key: &str) {
        let (closure, exposed) = {
            let s = self.inner.borrow();
            let closure = s.graph.closure(key);
            let mut exposed: Vec<Binding> = s.exposed.get(key).cloned().into_iter().collect();
            exposed.extend(closure.iter().filter_map(|c| s.exposed.get(c.name()).cloned()));
            (closure, exposed)
        };
        for computed in &closure {
            computed.invalidate();
        }
        for binding in exposed {
            binding.invalidate_consumers();
        }
    }

    // ─── Observers ──────────────────────────────────────────────────────

    /// Observe `key`, or every public change with [`WILDCARD`].
    ///
    /// Unless `options.silent`, one call with the current value is enqueued
    /// immediately. With `options.cancelable` a [`Subscription`] is
    /// returned; otherwise the observer lives as long as the container.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnknownKey`], [`ReactiveError::Disposed`].
    pub fn observe(
        &self,
        key: &str,
        callback: impl Fn(&Value) + 'static,
        options: ObserveOptions,
    ) -> Result<Option<Subscription>> {
        if self.is_disposed() {
            return Err(ReactiveError::Disposed);
        }
        let wildcard = key == WILDCARD;
        if !wildcard && !self.contains(key) {
            return Err(ReactiveError::unknown(key));
        }
        let observer = Rc::new(Observer::value(Rc::new(callback), &options));
        self.inner.borrow_mut().observers.add(key, Rc::clone(&observer));

        if !options.silent {
            let (lane, value) = if wildcard {
                (Lane::Wildcard, self.project(Projection::Public))
            } else {
                (Lane::Key, self.get(key).unwrap_or_default())
            };
            scheduler::enqueue(lane, &observer, Payload::Value(value));
            scheduler::request_flush();
        }

        if !options.cancelable {
            return Ok(None);
        }
        let id = observer.id();
        let weak_observer = Rc::downgrade(&observer);
        let weak_state = self.downgrade();
        let key = key.to_owned();
        Ok(Some(Subscription::new(id, move || {
            if let Some(observer) = weak_observer.upgrade() {
                observer.deactivate();
            }
            if let Some(state) = weak_state.upgrade() {
                match state.try_borrow_mut() {
                    Ok(mut s) => {
                        s.observers.remove(&key, id);
                    }
                    Err(_) => trace!(key, id = id.raw(), "observer busy; swept on next resolve"),
                }
            }
        })))
    }

    /// Unregister an observer. Unknown registrations log a warning.
    pub fn unobserve(&self, key: &str, id: ObserverId) -> bool {
        let removed = self.inner.borrow_mut().observers.remove(key, id);
        if !removed {
            warn!(key, id = id.raw(), "unobserve: no such observer");
        }
        removed
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    // ─── Bindings ───────────────────────────────────────────────────────

    /// Forwarding handle for `key`, created on first use and reused after.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnknownKey`]; [`ReactiveError::PrivateBinding`] for
    /// a private key that is not computed; [`ReactiveError::ChainedBinding`]
    /// when `key` itself forwards through a binding.
    pub fn bind(&self, key: &str) -> Result<Binding> {
        let mut s = self.inner.borrow_mut();
        if s.disposed {
            return Err(ReactiveError::Disposed);
        }
        if let Some(existing) = s.exposed.get(key) {
            return Ok(existing.clone());
        }
        if s.bound.contains_key(key) {
            return Err(ReactiveError::ChainedBinding {
                key: key.to_owned(),
            });
        }
        let computed = s.computed.contains_key(key);
        if !computed && !s.data.contains_key(key) {
            return Err(ReactiveError::unknown(key));
        }
        if is_private(key) && !computed {
            return Err(ReactiveError::PrivateBinding {
                key: key.to_owned(),
            });
        }
        let binding = Binding::new(&self.inner, key, computed);
        s.exposed.insert(key.to_owned(), binding.clone());
        Ok(binding)
    }

    /// Forward `key` on this container through `binding`. The local value
    /// of `key`, if any, is discarded in favour of the source.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::SelfBinding`], [`ReactiveError::DuplicateConnection`],
    /// [`ReactiveError::ReadonlyComputed`], [`ReactiveError::ChainedBinding`],
    /// [`ReactiveError::DetachedBinding`].
    pub fn connect(&self, key: &str, binding: &Binding) -> Result<()> {
        binding.connect(self, key)?;
        self.resolve(key);
        Ok(())
    }

    /// Consumer-side checks and registration, called by [`Binding::connect`].
    pub(crate) fn accept_binding(&self, key: &str, binding: &Binding) -> Result<()> {
        let displaced = {
            let mut s = self.inner.borrow_mut();
            if s.disposed {
                return Err(ReactiveError::Disposed);
            }
            if s.computed.contains_key(key) {
                return Err(ReactiveError::ReadonlyComputed {
                    key: key.to_owned(),
                });
            }
            if s.bound.contains_key(key) {
                return Err(ReactiveError::DuplicateConnection {
                    key: key.to_owned(),
                });
            }
            if s.exposed.contains_key(key) {
                return Err(ReactiveError::ChainedBinding {
                    key: key.to_owned(),
                });
            }
            s.bound.insert(key.to_owned(), binding.clone());
            s.data.remove(key)
        };
        if let Some(old) = displaced {
            if old.parent().is_some_and(|link| link.is(&Datum::Object(self.clone()))) {
                old.set_parent(None);
            }
        }
        self.invalidate_dependents(key);
        Ok(())
    }

    /// Stop forwarding `key`. The property keeps no local value and reads
    /// as unknown until reconnected.
    pub fn disconnect(&self, key: &str) -> bool {
        let binding = self.inner.borrow_mut().bound.remove(key);
        match binding {
            Some(binding) => {
                binding.disconnect(self);
                true
            }
            None => {
                warn!(key, "disconnect: property is not bound");
                false
            }
        }
    }

    // ─── Ownership ──────────────────────────────────────────────────────

    pub(crate) fn parent(&self) -> Option<ParentLink> {
        self.inner.borrow().parent.clone()
    }

    pub(crate) fn set_parent(&self, link: Option<ParentLink>) {
        self.inner.borrow_mut().parent = link;
    }

    /// Whether this container is currently held by another container.
    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.inner.borrow().parent.is_some()
    }

    /// Place a nested container into the plain-data slot `key`.
    ///
    /// The child must not already be owned: call [`detach`](Self::detach)
    /// on its current owner first. Any container previously in the slot is
    /// released.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnknownKey`], [`ReactiveError::AlreadyOwned`],
    /// [`ReactiveError::CyclicOwnership`], [`ReactiveError::Disposed`].
    pub fn adopt(&self, key: &str, child: impl Into<Datum>) -> Result<()> {
        let child = child.into();
        if self.is_disposed() {
            return Err(ReactiveError::Disposed);
        }
        if !matches!(self.slot(key), Some(Slot::Datum(_))) {
            return Err(ReactiveError::unknown(key));
        }
        if child.parent().is_some() {
            return Err(ReactiveError::AlreadyOwned {
                key: key.to_owned(),
            });
        }
        if child.would_cycle(&Datum::Object(self.clone())) {
            return Err(ReactiveError::CyclicOwnership {
                key: key.to_owned(),
            });
        }
        child.set_parent(Some(ParentLink::object(&self.inner, key)));
        let previous = self.inner.borrow_mut().data.insert(key.to_owned(), child);
        if let Some(previous) = previous {
            previous.set_parent(None);
        }
        self.resolve(key);
        Ok(())
    }

    /// Take the nested container out of `key`, leaving the slot holding the
    /// container's writable snapshot. Returns `None` when the slot holds
    /// plain data.
    pub fn detach(&self, key: &str) -> Option<Datum> {
        let child = {
            let mut s = self.inner.borrow_mut();
            let slot = s.data.get_mut(key)?;
            if !slot.is_container() {
                return None;
            }
            let snapshot = Datum::Value(slot.project(Projection::Writable));
            std::mem::replace(slot, snapshot)
        };
        child.set_parent(None);
        self.resolve(key);
        Some(child)
    }

    /// Release observers, disconnect from every binding, detach from the
    /// parent, and dispose owned children. Idempotent.
    pub fn dispose(&self) {
        let (bound, exposed, children) = {
            let mut s = self.inner.borrow_mut();
            if s.disposed {
                return;
            }
            s.disposed = true;
            s.observers.clear();
            s.parent = None;
            let bound: Vec<Binding> = s.bound.drain().map(|(_, b)| b).collect();
            let exposed: Vec<Binding> = s.exposed.drain().map(|(_, b)| b).collect();
            let children: Vec<Datum> = s.data.values().filter(|d| d.is_container()).cloned().collect();
            (bound, exposed, children)
        };
        for binding in bound {
            binding.disconnect(self);
        }
        for binding in exposed {
            binding.disconnect_all();
        }
        for child in children {
            child.dispose();
        }
        debug!("object disposed");
    }
}

impl Lookup for Object {
    fn lookup(&self, key: &str) -> Option<Value> {
        let slot = self.slot(key)?;
        Some(self.read_slot(slot))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(s) => f
                .debug_struct("Object")
                .field("keys", &s.data.keys().collect::<Vec<_>>())
                .field("computed", &s.blueprint.install_order())
                .field("observers", &s.observers.len())
                .field("disposed", &s.disposed)
                .finish(),
            Err(_) => f.write_str("Object(<borrowed>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
