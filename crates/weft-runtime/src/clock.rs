//! Frame time source for the scheduler.
//!
//! Every drain pass of a frame shares the timestamp taken when the frame
//! starts. Production frames read `web_time::Instant::now()`; tests install a
//! [`LabClock`] and step it between ticks so frame timestamps are exact.

use std::cell::Cell;
use std::rc::Rc;

use web_time::{Duration, Instant};

/// Where frame timestamps come from.
#[derive(Debug, Clone, Default)]
pub enum FrameClock {
    #[default]
    Real,
    Lab(LabClock),
}

impl FrameClock {
    /// Timestamp for a frame starting now.
    #[must_use]
    pub fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(clock) => clock.now(),
        }
    }
}

/// Frame clock that only moves when stepped.
///
/// Clones share one offset, so a test can keep a handle while the scheduler
/// owns another. Like the rest of the engine it stays on one thread.
#[derive(Debug, Clone)]
pub struct LabClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl LabClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move time forward by `delta` before the next frame.
    pub fn advance(&self, delta: Duration) {
        self.offset.set(self.offset.get().saturating_add(delta));
    }

    /// Step one frame interval at the given rate, e.g. `step_frame(60)`.
    pub fn step_frame(&self, fps: u32) {
        self.advance(Duration::from_secs(1) / fps.max(1));
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    /// Total time stepped since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}
