#![forbid(unsafe_code)]

//! Propagation queue: coalesces observer calls from a synchronous burst of
//! writes into one flush per UI frame.
//!
//! # Design
//!
//! The queue is a thread-local singleton (execution is single-threaded and
//! callbacks are `!Send`). Writes enqueue `(observer, value)` pairs and call
//! [`request_flush`]; the host's frame loop calls [`tick`] once per visible
//! frame.
//!
//! During a tick the live buffers are swapped for empty ones before any
//! callback runs. Callbacks that write again therefore populate the fresh
//! buffers, and the tick keeps draining (same frame number and timestamp)
//! until no work is left.
//!
//! # Invariants
//!
//! 1. [`request_flush`] is idempotent while a flush is scheduled or running.
//! 2. An observer fires at most once per drain pass, with the latest value
//!    enqueued for it.
//! 3. Key observers of a pass run before wildcard observers of that pass.
//! 4. Deferred and throttled calls are carried into a later frame, never
//!    dropped.
//!
//! # Failure Modes
//!
//! - **Runaway re-entrancy**: an observer that keeps re-triggering itself
//!   would drain forever. The tick stops after
//!   [`SchedulerConfig::max_passes`] passes, discards the pending work, and
//!   returns [`FlushError::Runaway`].

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use thiserror::Error;
use tracing::{debug, error, trace};
use web_time::Instant;
use weft_core::Value;

use crate::clock::FrameClock;
use crate::observer::{Delivery, Observer, ObserverId, Payload, Throttle};

/// Default ceiling on drain passes within one frame.
pub const DEFAULT_MAX_PASSES: usize = 64;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum drain passes per frame before the flush is declared runaway.
    pub max_passes: usize,
    /// Source of frame timestamps.
    pub clock: FrameClock,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            clock: FrameClock::Real,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: FrameClock) -> Self {
        self.clock = clock;
        self
    }
}

/// Error returned by [`tick`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlushError {
    #[error("flush did not quiesce after {passes} passes")]
    Runaway { passes: usize },
}

/// Summary of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number (1-based, monotonically increasing).
    pub frame: u64,
    /// Drain passes needed to quiesce.
    pub passes: usize,
    /// Callbacks actually invoked.
    pub calls: usize,
    /// Timestamp shared by every pass of this frame.
    pub timestamp: Instant,
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Frames that ran.
    pub frames: u64,
    /// Times an idle scheduler transitioned to "flush scheduled".
    pub schedules: u64,
    /// Callbacks invoked over the scheduler's lifetime.
    pub calls: u64,
    /// Calls currently waiting (live buffers plus carried-over calls).
    pub pending: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lane {
    Key,
    Wildcard,
}

struct Pending {
    observer: Rc<Observer>,
    payload: Payload,
    lane: Lane,
    due: u64,
}

/// Insertion-ordered buffer keyed by observer, replacing the payload on
/// repeated pushes.
#[derive(Default)]
struct Buffer {
    entries: Vec<Pending>,
    index: AHashMap<ObserverId, usize>,
}

impl Buffer {
    fn push(&mut self, pending: Pending) {
        let id = pending.observer.id();
        match self.index.get(&id) {
            Some(&i) => {
                let slot = &mut self.entries[i];
                slot.payload = pending.payload;
                slot.due = slot.due.max(pending.due);
            }
            None => {
                self.index.insert(id, self.entries.len());
                self.entries.push(pending);
            }
        }
    }

    fn take(&mut self) -> Vec<Pending> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Queue {
    config: SchedulerConfig,
    key_calls: Buffer,
    wildcard_calls: Buffer,
    carried: Buffer,
    scheduled: bool,
    running: bool,
    frame: u64,
    timestamp: Option<Instant>,
    stats: SchedulerStats,
    requester: Option<Rc<dyn Fn()>>,
}

impl Queue {
    fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            key_calls: Buffer::default(),
            wildcard_calls: Buffer::default(),
            carried: Buffer::default(),
            scheduled: false,
            running: false,
            frame: 0,
            timestamp: None,
            stats: SchedulerStats::default(),
            requester: None,
        }
    }

    /// First frame on which a newly enqueued call may run.
    fn earliest_frame(&self, deferred: bool) -> u64 {
        let upcoming = if self.running { self.frame } else { self.frame + 1 };
        if deferred { upcoming + 1 } else { upcoming }
    }

    fn pending(&self) -> usize {
        self.key_calls.len() + self.wildcard_calls.len() + self.carried.len()
    }

    /// Move carried calls that are due on `frame` back into the lane they
    /// were enqueued on.
    fn promote_carried(&mut self, frame: u64) {
        for pending in self.carried.take() {
            match pending.lane {
                _ if pending.due > frame => self.carried.push(pending),
                Lane::Key => self.key_calls.push(pending),
                Lane::Wildcard => self.wildcard_calls.push(pending),
            }
        }
    }

    fn swap_buffers(&mut self) -> Vec<Pending> {
        let mut batch = self.key_calls.take();
        batch.extend(self.wildcard_calls.take());
        batch
    }

    /// Transition to "scheduled". Returns the host hook to notify when the
    /// scheduler was idle.
    fn schedule(&mut self) -> Option<Rc<dyn Fn()>> {
        if self.scheduled || self.running {
            return None;
        }
        self.scheduled = true;
        self.stats.schedules += 1;
        self.requester.clone()
    }
}

thread_local! {
    static QUEUE: RefCell<Queue> = RefCell::new(Queue::new(SchedulerConfig::default()));
}

/// Replace the scheduler configuration. Pending work is kept.
pub fn configure(config: SchedulerConfig) {
    QUEUE.with(|q| q.borrow_mut().config = config);
}

/// Discard all pending work, counters, and the frame requester, and restore
/// the default configuration.
pub fn reset() {
    QUEUE.with(|q| *q.borrow_mut() = Queue::new(SchedulerConfig::default()));
}

/// Install the hook called whenever an idle scheduler gets work, typically
/// used to request an animation frame from the host.
pub fn set_frame_requester(requester: impl Fn() + 'static) {
    QUEUE.with(|q| q.borrow_mut().requester = Some(Rc::new(requester)));
}

/// Schedule a flush on the next [`tick`]. Idempotent while scheduled.
pub fn request_flush() {
    let hook = QUEUE.with(|q| q.borrow_mut().schedule());
    if let Some(hook) = hook {
        hook();
    }
}

#[must_use]
pub fn is_scheduled() -> bool {
    QUEUE.with(|q| q.borrow().scheduled)
}

/// Number of the most recent (or currently running) frame.
#[must_use]
pub fn current_frame() -> u64 {
    QUEUE.with(|q| q.borrow().frame)
}

/// Timestamp of the most recent (or currently running) frame.
#[must_use]
pub fn frame_timestamp() -> Option<Instant> {
    QUEUE.with(|q| q.borrow().timestamp)
}

#[must_use]
pub fn stats() -> SchedulerStats {
    QUEUE.with(|q| {
        let q = q.borrow();
        SchedulerStats {
            pending: q.pending(),
            ..q.stats
        }
    })
}

/// Wrap `callback` so it runs at most once every `ticks` frames.
pub fn throttle(ticks: u64, callback: impl Fn(&Value) + 'static) -> impl Fn(&Value) {
    let gate = Throttle::new(ticks);
    move |value: &Value| {
        if gate.ready(current_frame()) {
            callback(value);
        }
    }
}

pub(crate) fn enqueue(lane: Lane, observer: &Rc<Observer>, payload: Payload) {
    QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        let deferred = observer.is_deferred();
        let pending = Pending {
            observer: Rc::clone(observer),
            payload,
            lane,
            due: q.earliest_frame(deferred),
        };
        if deferred {
            q.carried.push(pending);
        } else if lane == Lane::Key {
            q.key_calls.push(pending);
        } else {
            q.wildcard_calls.push(pending);
        }
    });
}

/// Run one frame: drain every queued call, including calls enqueued by the
/// callbacks themselves.
///
/// Returns `Ok(None)` when no flush was scheduled.
///
/// # Errors
///
/// Returns [`FlushError::Runaway`] when the frame does not quiesce within the
/// configured number of passes. The remaining work is discarded.
pub fn tick() -> Result<Option<FrameReport>, FlushError> {
    let start = QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        if !q.scheduled || q.running {
            return None;
        }
        q.scheduled = false;
        q.running = true;
        q.frame += 1;
        q.stats.frames += 1;
        let timestamp = q.config.clock.now();
        q.timestamp = Some(timestamp);
        let frame = q.frame;
        q.promote_carried(frame);
        Some((frame, timestamp, q.config.max_passes))
    });
    let Some((frame, timestamp, max_passes)) = start else {
        return Ok(None);
    };

    let mut passes = 0;
    let mut calls = 0;
    loop {
        let batch = QUEUE.with(|q| q.borrow_mut().swap_buffers());
        if batch.is_empty() {
            break;
        }
        passes += 1;
        if passes > max_passes {
            QUEUE.with(|q| {
                let mut q = q.borrow_mut();
                q.swap_buffers();
                q.running = false;
            });
            error!(frame, max_passes, "flush did not quiesce; pending calls dropped");
            return Err(FlushError::Runaway { passes: max_passes });
        }
        trace!(frame, pass = passes, calls = batch.len(), "drain pass");
        for pending in batch {
            match pending.observer.fire(&pending.payload, frame) {
                Delivery::Fired => calls += 1,
                Delivery::Throttled => QUEUE.with(|q| {
                    q.borrow_mut().carried.push(Pending {
                        due: frame + 1,
                        ..pending
                    });
                }),
                Delivery::Skipped => {}
            }
        }
    }

    let hook = QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        q.running = false;
        q.stats.calls += calls as u64;
        if q.carried.is_empty() { None } else { q.schedule() }
    });
    if let Some(hook) = hook {
        hook();
    }
    debug!(frame, passes, calls, "frame flushed");
    Ok(Some(FrameReport {
        frame,
        passes,
        calls,
        timestamp,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::LabClock;
    use crate::observer::ObserveOptions;
    use std::cell::{Cell, RefCell};
    use tracing_test::traced_test;

    fn recorder(options: ObserveOptions) -> (Rc<Observer>, Rc<RefCell<Vec<Value>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let cb: Rc<dyn Fn(&Value)> = Rc::new(move |v: &Value| sink.borrow_mut().push(v.clone()));
        (Rc::new(Observer::value(cb, &options)), seen)
    }

    #[test]
    fn request_flush_is_idempotent() {
        reset();
        request_flush();
        request_flush();
        request_flush();
        assert!(is_scheduled());
        assert_eq!(stats().schedules, 1);
    }

    #[test]
    fn tick_without_schedule_is_noop() {
        reset();
        assert_eq!(tick(), Ok(None));
        assert_eq!(current_frame(), 0);
    }

    #[test]
    fn coalesces_to_latest_value() {
        reset();
        let (obs, seen) = recorder(ObserveOptions::default());
        for i in 0..5 {
            enqueue(Lane::Key, &obs, Payload::Value(Value::from(i)));
        }
        request_flush();
        let report = tick().expect("flush").expect("scheduled");
        assert_eq!(report.calls, 1);
        assert_eq!(*seen.borrow(), vec![Value::from(4)]);
    }

    #[test]
    fn key_lane_runs_before_wildcard_lane() {
        reset();
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = Rc::clone(&order);
        let o2 = Rc::clone(&order);
        let wildcard = Rc::new(Observer::value(
            Rc::new(move |_: &Value| o1.borrow_mut().push("wildcard")),
            &ObserveOptions::default(),
        ));
        let keyed = Rc::new(Observer::value(
            Rc::new(move |_: &Value| o2.borrow_mut().push("key")),
            &ObserveOptions::default(),
        ));
        enqueue(Lane::Wildcard, &wildcard, Payload::Value(Value::Null));
        enqueue(Lane::Key, &keyed, Payload::Value(Value::Null));
        request_flush();
        tick().expect("flush");
        assert_eq!(*order.borrow(), vec!["key", "wildcard"]);
    }

    #[test]
    fn reentrant_enqueue_drains_in_same_frame() {
        reset();
        let (second, seen) = recorder(ObserveOptions::default());
        let second_clone = Rc::clone(&second);
        let first = Rc::new(Observer::value(
            Rc::new(move |v: &Value| {
                enqueue(Lane::Key, &second_clone, Payload::Value(v.clone()));
                request_flush();
            }),
            &ObserveOptions::default(),
        ));
        enqueue(Lane::Key, &first, Payload::Value(Value::from("hop")));
        request_flush();
        let report = tick().expect("flush").expect("scheduled");
        assert_eq!(report.passes, 2);
        assert_eq!(report.calls, 2);
        assert_eq!(*seen.borrow(), vec![Value::from("hop")]);
        assert!(!is_scheduled(), "re-entrant request must not schedule a new frame");
    }

    #[traced_test]
    #[test]
    fn runaway_flush_is_capped() {
        reset();
        configure(SchedulerConfig::default().with_max_passes(8));
        let slot: Rc<RefCell<Option<Rc<Observer>>>> = Rc::new(RefCell::new(None));
        let slot_clone = Rc::clone(&slot);
        let looping = Rc::new(Observer::value(
            Rc::new(move |_: &Value| {
                if let Some(me) = slot_clone.borrow().as_ref() {
                    enqueue(Lane::Key, me, Payload::Value(Value::Null));
                }
            }),
            &ObserveOptions::default(),
        ));
        *slot.borrow_mut() = Some(Rc::clone(&looping));
        enqueue(Lane::Key, &looping, Payload::Value(Value::Null));
        request_flush();
        assert_eq!(tick(), Err(FlushError::Runaway { passes: 8 }));
        assert_eq!(stats().pending, 0);
        assert!(logs_contain("flush did not quiesce"));
        slot.borrow_mut().take();
    }

    #[test]
    fn deferred_call_waits_one_frame() {
        reset();
        let (obs, seen) = recorder(ObserveOptions::new().deferred());
        enqueue(Lane::Key, &obs, Payload::Value(Value::from(1)));
        request_flush();
        tick().expect("flush");
        assert!(seen.borrow().is_empty());
        assert!(is_scheduled(), "carried work schedules the next frame");
        tick().expect("flush");
        assert_eq!(*seen.borrow(), vec![Value::from(1)]);
    }

    #[test]
    fn throttled_call_is_carried_not_dropped() {
        reset();
        let (obs, seen) = recorder(ObserveOptions::new().with_throttle(2));
        enqueue(Lane::Key, &obs, Payload::Value(Value::from(1)));
        request_flush();
        tick().expect("frame 1");
        enqueue(Lane::Key, &obs, Payload::Value(Value::from(2)));
        request_flush();
        tick().expect("frame 2");
        assert_eq!(*seen.borrow(), vec![Value::from(1)]);
        tick().expect("frame 3");
        assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn carried_wildcard_stays_behind_key_observers() {
        reset();
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = Rc::clone(&order);
        let o2 = Rc::clone(&order);
        let wildcard = Rc::new(Observer::value(
            Rc::new(move |_: &Value| o1.borrow_mut().push("wildcard")),
            &ObserveOptions::new().deferred(),
        ));
        let keyed = Rc::new(Observer::value(
            Rc::new(move |_: &Value| o2.borrow_mut().push("key")),
            &ObserveOptions::default(),
        ));
        enqueue(Lane::Wildcard, &wildcard, Payload::Value(Value::Null));
        request_flush();
        tick().expect("frame 1");
        assert!(order.borrow().is_empty());

        enqueue(Lane::Key, &keyed, Payload::Value(Value::Null));
        request_flush();
        tick().expect("frame 2");
        assert_eq!(*order.borrow(), vec!["key", "wildcard"]);
    }

    #[test]
    fn frame_requester_called_once_per_schedule() {
        reset();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        set_frame_requester(move || c.set(c.get() + 1));
        request_flush();
        request_flush();
        assert_eq!(calls.get(), 1);
        tick().expect("flush");
        request_flush();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn lab_clock_timestamps_frames() {
        reset();
        let lab = LabClock::new();
        configure(SchedulerConfig::default().with_clock(FrameClock::Lab(lab.clone())));
        request_flush();
        let report = tick().expect("flush").expect("scheduled");
        assert_eq!(report.timestamp, lab.now());
        assert_eq!(frame_timestamp(), Some(lab.now()));
    }

    #[test]
    fn throttle_helper_uses_frame_counter() {
        reset();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let throttled = throttle(2, move |_| h.set(h.get() + 1));
        throttled(&Value::Null);
        throttled(&Value::Null);
        assert_eq!(hits.get(), 1);
        request_flush();
        tick().expect("frame 1");
        request_flush();
        tick().expect("frame 2");
        throttled(&Value::Null);
        assert_eq!(hits.get(), 2);
    }
}
