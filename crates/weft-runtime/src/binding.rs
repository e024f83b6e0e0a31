//! Cross-container property forwarding.
//!
//! A [`Binding`] makes one container's property the single source of truth
//! for a property exposed on other containers. Consumers read and write
//! through the source; source changes are forwarded to every connected
//! consumer by re-running its resolve for the consumer key.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;
use weft_core::Value;

use crate::error::{ReactiveError, Result};
use crate::object::{Object, ObjectState};

struct Consumer {
    object: Weak<RefCell<ObjectState>>,
    key: String,
}

struct BindingInner {
    source: Weak<RefCell<ObjectState>>,
    key: String,
    readonly: bool,
    consumers: RefCell<Vec<Consumer>>,
}

/// Forwarding handle: "this property, sourced from that container".
///
/// Obtained from [`Object::bind`]; clones share the same consumer set.
#[derive(Clone)]
pub struct Binding {
    inner: Rc<BindingInner>,
}

impl Binding {
    pub(crate) fn new(source: &Rc<RefCell<ObjectState>>, key: &str, readonly: bool) -> Self {
        Self {
            inner: Rc::new(BindingInner {
                source: Rc::downgrade(source),
                key: key.to_owned(),
                readonly,
                consumers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Source property name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Readonly iff the source property is computed.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.inner.readonly
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.inner
            .consumers
            .borrow()
            .iter()
            .filter(|c| c.object.strong_count() > 0)
            .count()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn source(&self) -> Result<Object> {
        self.inner
            .source
            .upgrade()
            .map(Object::from_inner)
            .ok_or_else(|| ReactiveError::DetachedBinding {
                key: self.inner.key.clone(),
            })
    }

    /// Read the source property.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::DetachedBinding`] when the source has been dropped.
    pub fn read(&self) -> Result<Value> {
        self.source()?.get(&self.inner.key)
    }

    /// Write the source property.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::ReadonlyBinding`] for a computed source, plus any
    /// error of the source write.
    pub fn write(&self, value: &Value, silent: bool) -> Result<bool> {
        if self.inner.readonly {
            return Err(ReactiveError::ReadonlyBinding {
                key: self.inner.key.clone(),
            });
        }
        self.source()?.set_datum(&self.inner.key, value, silent)
    }

    /// Register `consumer.key` as forwarding through this binding.
    pub(crate) fn connect(&self, consumer: &Object, key: &str) -> Result<()> {
        let source = self.source()?;
        if source.ptr_eq(consumer) {
            return Err(ReactiveError::SelfBinding {
                key: key.to_owned(),
            });
        }
        let already = self
            .inner
            .consumers
            .borrow()
            .iter()
            .any(|c| c.key == key && c.object.upgrade().is_some_and(|o| Object::from_inner(o).ptr_eq(consumer)));
        if already {
            return Err(ReactiveError::DuplicateConnection {
                key: key.to_owned(),
            });
        }
        consumer.accept_binding(key, self)?;
        let mut consumers = self.inner.consumers.borrow_mut();
        consumers.retain(|c| c.object.strong_count() > 0);
        consumers.push(Consumer {
            object: consumer.downgrade(),
            key: key.to_owned(),
        });
        trace!(source = %self.inner.key, consumer = key, "binding connected");
        Ok(())
    }

    pub(crate) fn disconnect(&self, consumer: &Object) {
        self.inner.consumers.borrow_mut().retain(|c| {
            c.object
                .upgrade()
                .is_some_and(|o| !Object::from_inner(o).ptr_eq(consumer))
        });
    }

    pub(crate) fn disconnect_all(&self) {
        self.inner.consumers.borrow_mut().clear();
    }

    fn live_consumers(&self) -> Vec<(Object, String)> {
        self.inner
            .consumers
            .borrow()
            .iter()
            .filter_map(|c| {
                c.object
                    .upgrade()
                    .map(|o| (Object::from_inner(o), c.key.clone()))
            })
            .collect()
    }

    /// Re-run resolve on every consumer.
    pub(crate) fn propagate(&self) {
        for (consumer, key) in self.live_consumers() {
            consumer.resolve(&key);
        }
    }

    /// Mark consumer dependents stale without notifying.
    pub(crate) fn invalidate_consumers(&self) {
        for (consumer, key) in self.live_consumers() {
            consumer.invalidate_dependents(&key);
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.inner.key)
            .field("readonly", &self.inner.readonly)
            .field("consumers", &self.consumer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::Blueprint;
    use crate::observer::ObserveOptions;
    use crate::scheduler;
    use std::cell::Cell;

    fn source() -> Object {
        let bp = Blueprint::builder()
            .data("title", "hello")
            .computed("shout", |s, _| Ok(Value::from(s.text("title")?.to_uppercase())))
            .build()
            .expect("source blueprint");
        Object::new(&bp).expect("source")
    }

    fn consumer(binding: &Binding) -> Object {
        let bp = Blueprint::builder()
            .bound("title", binding)
            .computed("excited", |s, _| Ok(Value::from(format!("{}!", s.text("title")?))))
            .build()
            .expect("consumer blueprint");
        Object::new(&bp).expect("consumer")
    }

    #[test]
    fn binding_own_container_is_rejected() {
        scheduler::reset();
        let src = source();
        let binding = src.bind("title").expect("bind");
        assert_eq!(
            binding.connect(&src, "title"),
            Err(ReactiveError::SelfBinding { key: "title".into() })
        );
        assert_eq!(binding.consumer_count(), 0);
    }

    #[test]
    fn second_connection_of_same_key_is_rejected() {
        scheduler::reset();
        let src = source();
        let binding = src.bind("title").expect("bind");
        let target = Object::from_value(&Value::map([("label", Value::Null)])).expect("target");
        binding.connect(&target, "label").expect("first connect");
        assert_eq!(
            binding.connect(&target, "label"),
            Err(ReactiveError::DuplicateConnection { key: "label".into() })
        );
        assert_eq!(binding.consumer_count(), 1);
    }

    #[test]
    fn silent_write_reaches_consumers_without_notifying() {
        scheduler::reset();
        let src = source();
        let binding = src.bind("title").expect("bind");
        let dst = consumer(&binding);
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        dst.observe("excited", move |_| c.set(c.get() + 1), ObserveOptions::new().silent())
            .expect("observe");

        assert_eq!(binding.write(&Value::from("quiet"), true), Ok(true));
        scheduler::tick().expect("flush");
        assert_eq!(calls.get(), 0);
        assert_eq!(binding.read(), Ok(Value::from("quiet")));
        assert_eq!(dst.get("excited"), Ok(Value::from("quiet!")));

        assert_eq!(binding.write(&Value::from("loud"), false), Ok(true));
        scheduler::tick().expect("flush");
        assert_eq!(calls.get(), 1);
        assert_eq!(dst.get("excited"), Ok(Value::from("loud!")));
    }

    #[test]
    fn computed_source_is_readonly() {
        scheduler::reset();
        let src = source();
        let binding = src.bind("shout").expect("bind");
        assert!(binding.is_readonly());
        assert_eq!(binding.read(), Ok(Value::from("HELLO")));
        assert_eq!(
            binding.write(&Value::from("x"), false),
            Err(ReactiveError::ReadonlyBinding { key: "shout".into() })
        );
    }

    #[test]
    fn dropped_source_detaches() {
        scheduler::reset();
        let binding = source().bind("title").expect("bind");
        assert_eq!(
            binding.read(),
            Err(ReactiveError::DetachedBinding { key: "title".into() })
        );
    }
}
