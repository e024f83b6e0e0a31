//! Observer registrations, options, and unsubscribe handles.
//!
//! Observers never run synchronously with a write. A write enqueues the
//! observer together with the value it should see into the
//! [propagation queue](crate::scheduler); the queue coalesces repeated
//! enqueues of the same observer so each one fires at most once per flush,
//! with the latest value.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use weft_core::Value;

use crate::datum::Datum;

/// Key under which an observer sees every public change of a container.
pub const WILDCARD: &str = "*";

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Options accepted by `observe`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    /// Fire at most once every `n` frames; suppressed calls are carried to a
    /// later frame so the final value is still delivered.
    pub throttle: Option<u64>,
    /// Deliver on the frame after the one that would normally flush it.
    pub defer: bool,
    /// Return a [`Subscription`] that unregisters the observer on drop.
    pub cancelable: bool,
    /// Skip the initial call with the current value.
    pub silent: bool,
}

impl ObserveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_throttle(mut self, ticks: u64) -> Self {
        self.throttle = Some(ticks);
        self
    }

    #[must_use]
    pub fn deferred(mut self) -> Self {
        self.defer = true;
        self
    }

    #[must_use]
    pub fn cancelable(mut self) -> Self {
        self.cancelable = true;
        self
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Frame-counter based rate limiter.
#[derive(Debug)]
pub struct Throttle {
    ticks: u64,
    last: Cell<Option<u64>>,
}

impl Throttle {
    #[must_use]
    pub fn new(ticks: u64) -> Self {
        Self {
            ticks,
            last: Cell::new(None),
        }
    }

    /// Whether a call may pass on `frame`. Passing records the frame.
    pub fn ready(&self, frame: u64) -> bool {
        match self.last.get() {
            Some(last) if frame.saturating_sub(last) < self.ticks => false,
            _ => {
                self.last.set(Some(frame));
                true
            }
        }
    }
}

pub(crate) enum Callback {
    Value(Rc<dyn Fn(&Value)>),
    Structure(Rc<dyn Fn(&[Datum])>),
}

/// What an enqueued observer will be called with.
pub(crate) enum Payload {
    Value(Value),
    Items(Vec<Datum>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Fired,
    Throttled,
    Skipped,
}

pub(crate) struct Observer {
    id: ObserverId,
    callback: Callback,
    throttle: Option<Throttle>,
    defer: bool,
    active: Cell<bool>,
    /// Structural observers are no-ops until a shape change arms them for
    /// exactly one delivery. Value observers are always armed.
    armed: Cell<bool>,
}

impl Observer {
    pub(crate) fn value(callback: Rc<dyn Fn(&Value)>, options: &ObserveOptions) -> Self {
        Self {
            id: ObserverId::next(),
            callback: Callback::Value(callback),
            throttle: options.throttle.map(Throttle::new),
            defer: options.defer,
            active: Cell::new(true),
            armed: Cell::new(true),
        }
    }

    pub(crate) fn structural(callback: Rc<dyn Fn(&[Datum])>) -> Self {
        Self {
            id: ObserverId::next(),
            callback: Callback::Structure(callback),
            throttle: None,
            defer: false,
            active: Cell::new(true),
            armed: Cell::new(false),
        }
    }

    pub(crate) fn id(&self) -> ObserverId {
        self.id
    }

    pub(crate) fn is_deferred(&self) -> bool {
        self.defer
    }

    pub(crate) fn deactivate(&self) {
        self.active.set(false);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn arm(&self) {
        self.armed.set(true);
    }

    pub(crate) fn fire(&self, payload: &Payload, frame: u64) -> Delivery {
        if !self.active.get() || !self.armed.get() {
            return Delivery::Skipped;
        }
        if let Some(throttle) = &self.throttle {
            if !throttle.ready(frame) {
                return Delivery::Throttled;
            }
        }
        match (&self.callback, payload) {
            (Callback::Value(cb), Payload::Value(value)) => cb(value),
            (Callback::Structure(cb), Payload::Items(items)) => {
                self.armed.set(false);
                cb(items);
            }
            _ => return Delivery::Skipped,
        }
        Delivery::Fired
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .field("armed", &self.armed.get())
            .field("defer", &self.defer)
            .finish()
    }
}

/// Per-container observer lists: one per key plus the wildcard list.
#[derive(Debug, Default)]
pub(crate) struct ObserverIndex {
    keyed: AHashMap<String, Vec<Rc<Observer>>>,
    wildcard: Vec<Rc<Observer>>,
}

impl ObserverIndex {
    pub(crate) fn add(&mut self, key: &str, observer: Rc<Observer>) {
        if key == WILDCARD {
            self.wildcard.push(observer);
        } else {
            self.keyed.entry(key.to_owned()).or_default().push(observer);
        }
    }

    pub(crate) fn remove(&mut self, key: &str, id: ObserverId) -> bool {
        let list = if key == WILDCARD {
            Some(&mut self.wildcard)
        } else {
            self.keyed.get_mut(key)
        };
        let Some(list) = list else {
            return false;
        };
        let Some(pos) = list.iter().position(|o| o.id() == id) else {
            return false;
        };
        list.remove(pos).deactivate();
        true
    }

    /// Drop observers deactivated by a subscription that could not reach the
    /// index at release time. Returns how many were dropped.
    pub(crate) fn sweep_inactive(&mut self) -> usize {
        let before = self.len();
        self.wildcard.retain(|o| o.is_active());
        self.keyed.retain(|_, list| {
            list.retain(|o| o.is_active());
            !list.is_empty()
        });
        before - self.len()
    }

    pub(crate) fn keyed(&self, key: &str) -> &[Rc<Observer>] {
        self.keyed.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn wildcard(&self) -> &[Rc<Observer>] {
        &self.wildcard
    }

    pub(crate) fn len(&self) -> usize {
        self.wildcard.len() + self.keyed.values().map(Vec::len).sum::<usize>()
    }

    pub(crate) fn clear(&mut self) {
        for observer in self.wildcard.drain(..) {
            observer.deactivate();
        }
        for (_, list) in self.keyed.drain() {
            for observer in list {
                observer.deactivate();
            }
        }
    }
}

/// Handle returned by a cancelable `observe`.
///
/// Dropping the subscription unregisters the observer; calls already queued
/// for it are discarded.
pub struct Subscription {
    id: ObserverId,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(id: ObserverId, release: impl FnOnce() + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Unregister now instead of on drop.
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recording() -> (Rc<RefCell<Vec<Value>>>, Rc<dyn Fn(&Value)>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let cb: Rc<dyn Fn(&Value)> = Rc::new(move |v: &Value| sink.borrow_mut().push(v.clone()));
        (seen, cb)
    }

    #[test]
    fn throttle_gates_by_frame_distance() {
        let t = Throttle::new(3);
        assert!(t.ready(10));
        assert!(!t.ready(11));
        assert!(!t.ready(12));
        assert!(t.ready(13));
    }

    #[test]
    fn inactive_observer_is_skipped() {
        let (seen, cb) = recording();
        let obs = Observer::value(cb, &ObserveOptions::default());
        obs.deactivate();
        assert_eq!(obs.fire(&Payload::Value(Value::from(1)), 1), Delivery::Skipped);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn structural_observer_fires_once_per_arm() {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let obs = Observer::structural(Rc::new(move |_items: &[Datum]| c.set(c.get() + 1)));
        let payload = Payload::Items(Vec::new());

        assert_eq!(obs.fire(&payload, 1), Delivery::Skipped);
        obs.arm();
        assert_eq!(obs.fire(&payload, 1), Delivery::Fired);
        assert_eq!(obs.fire(&payload, 1), Delivery::Skipped);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn index_add_remove() {
        let (_seen, cb) = recording();
        let mut index = ObserverIndex::default();
        let obs = Rc::new(Observer::value(cb, &ObserveOptions::default()));
        let id = obs.id();
        index.add("a", Rc::clone(&obs));
        assert_eq!(index.keyed("a").len(), 1);
        assert!(index.remove("a", id));
        assert!(!index.remove("a", id));
        assert!(!index.remove("missing", id));
        assert_eq!(index.len(), 0);
        assert_eq!(
            obs.fire(&Payload::Value(Value::Null), 0),
            Delivery::Skipped,
            "removed observer must not fire"
        );
    }

    #[test]
    fn options_builder() {
        let opts = ObserveOptions::new().with_throttle(2).cancelable().silent();
        assert_eq!(opts.throttle, Some(2));
        assert!(opts.cancelable && opts.silent && !opts.defer);
    }

    #[test]
    fn subscription_releases_once() {
        let released = Rc::new(Cell::new(0));
        let r = Rc::clone(&released);
        let sub = Subscription::new(ObserverId::next(), move || r.set(r.get() + 1));
        sub.unsubscribe();
        assert_eq!(released.get(), 1);
    }
}
