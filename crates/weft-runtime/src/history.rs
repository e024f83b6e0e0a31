//! Linear undo/redo history recorded from flushed changes.
//!
//! [`History::track`] observes one property (or every public change) and
//! records one entry per flush in which it changed. `undo`/`redo` move a
//! cursor and write the recorded value back through the ordinary write path;
//! the observer sees the replayed value equal to the entry under the cursor
//! and does not record it again.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;
use weft_core::Value;

use crate::error::{ReactiveError, Result};
use crate::object::{Object, ObjectState};
use crate::observer::{ObserveOptions, Subscription, WILDCARD};

/// Default bound on recorded entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Options for [`History::track`].
#[derive(Clone)]
pub struct TrackOptions {
    /// Oldest entries are dropped beyond this count (minimum 1).
    pub max_entries: usize,
    /// Called with every newly recorded entry.
    pub on_track: Option<Rc<dyn Fn(&Value)>>,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            on_track: None,
        }
    }
}

impl TrackOptions {
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    #[must_use]
    pub fn on_track(mut self, callback: impl Fn(&Value) + 'static) -> Self {
        self.on_track = Some(Rc::new(callback));
        self
    }
}

impl fmt::Debug for TrackOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackOptions")
            .field("max_entries", &self.max_entries)
            .field("on_track", &self.on_track.is_some())
            .finish()
    }
}

struct Timeline {
    entries: Vec<Value>,
    cursor: usize,
    max_entries: usize,
}

impl Timeline {
    /// Record `value` unless it equals the entry under the cursor. Returns
    /// whether it was recorded.
    fn record(&mut self, value: Value) -> bool {
        if self.entries.get(self.cursor) == Some(&value) {
            return false;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(value);
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
        self.cursor = self.entries.len() - 1;
        true
    }
}

/// Undo/redo recorder over one container.
pub struct History {
    target: Weak<RefCell<ObjectState>>,
    key: Option<String>,
    timeline: Rc<RefCell<Timeline>>,
    _subscription: Option<Subscription>,
}

impl History {
    /// Start recording `key` on `object`, or its writable snapshot when
    /// `key` is `None`. The current value is the first entry.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnknownKey`], [`ReactiveError::Disposed`].
    pub fn track(object: &Object, key: Option<&str>, options: TrackOptions) -> Result<Self> {
        let initial = match key {
            Some(key) => object.get(key)?,
            None => object.snapshot(),
        };
        let timeline = Rc::new(RefCell::new(Timeline {
            entries: vec![initial],
            cursor: 0,
            max_entries: options.max_entries.max(1),
        }));

        let recorder = Rc::downgrade(&timeline);
        let target = object.downgrade();
        let whole = key.is_none();
        let on_track = options.on_track;
        let subscription = object.observe(
            key.unwrap_or(WILDCARD),
            move |value| {
                let entry = if whole {
                    match target.upgrade() {
                        Some(state) => Object::from_inner(state).snapshot(),
                        None => return,
                    }
                } else {
                    value.clone()
                };
                let Some(timeline) = recorder.upgrade() else {
                    return;
                };
                let recorded = timeline.borrow_mut().record(entry.clone());
                if recorded {
                    trace!(entries = timeline.borrow().entries.len(), "history entry recorded");
                    if let Some(callback) = &on_track {
                        callback(&entry);
                    }
                }
            },
            ObserveOptions::new().silent().cancelable(),
        )?;

        Ok(Self {
            target: object.downgrade(),
            key: key.map(str::to_owned),
            timeline,
            _subscription: subscription,
        })
    }

    fn apply(&self, value: &Value) -> Result<()> {
        let object = self
            .target
            .upgrade()
            .map(Object::from_inner)
            .ok_or(ReactiveError::Disposed)?;
        match &self.key {
            Some(key) => {
                object.set_datum(key, value, false)?;
            }
            None => {
                object.set_data(value, false);
            }
        }
        Ok(())
    }

    fn step(&self, forward: bool) -> Result<bool> {
        let entry = {
            let mut t = self.timeline.borrow_mut();
            let next = if forward {
                if t.cursor + 1 >= t.entries.len() {
                    return Ok(false);
                }
                t.cursor + 1
            } else {
                if t.cursor == 0 {
                    return Ok(false);
                }
                t.cursor - 1
            };
            t.cursor = next;
            t.entries[next].clone()
        };
        self.apply(&entry)?;
        Ok(true)
    }

    /// Step back one entry. Returns `false` at the oldest entry.
    ///
    /// # Errors
    ///
    /// Errors of the replayed write.
    pub fn undo(&self) -> Result<bool> {
        self.step(false)
    }

    /// Step forward one entry. Returns `false` at the newest entry.
    ///
    /// # Errors
    ///
    /// Errors of the replayed write.
    pub fn redo(&self) -> Result<bool> {
        self.step(true)
    }

    /// Return to the first recorded entry and clear the history after it.
    ///
    /// # Errors
    ///
    /// Errors of the replayed write.
    pub fn restore(&self) -> Result<bool> {
        let first = {
            let mut t = self.timeline.borrow_mut();
            t.entries.truncate(1);
            t.cursor = 0;
            t.entries.first().cloned()
        };
        match first {
            Some(first) => {
                self.apply(&first)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.timeline.borrow().cursor > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        let t = self.timeline.borrow();
        t.cursor + 1 < t.entries.len()
    }

    /// Number of recorded entries, the initial one included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timeline.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timeline.borrow().entries.is_empty()
    }

    /// Recorded entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<Value> {
        self.timeline.borrow().entries.clone()
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.timeline.borrow();
        f.debug_struct("History")
            .field("key", &self.key)
            .field("entries", &t.entries.len())
            .field("cursor", &t.cursor)
            .finish()
    }
}
