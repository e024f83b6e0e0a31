#![forbid(unsafe_code)]

//! Runtime: reactive containers and the propagation machinery.
//!
//! # Key Components
//!
//! - [`Blueprint`] - immutable container description; building it installs
//!   computed properties and rejects cycles.
//! - [`Object`] / [`Array`] - reactive mapping and sequence containers.
//! - [`ComputedProperty`] - per-instance memoized derivation.
//! - [`Binding`] - forwards a property to its single source of truth.
//! - [`scheduler`] - frame-batched propagation queue.
//! - [`History`] - undo/redo recorder built on `observe`.
//!
//! Execution is single-threaded: containers are `!Send` and the scheduler is
//! a thread-local singleton with [`scheduler::configure`] and
//! [`scheduler::reset`] hooks.

pub mod array;
pub mod binding;
pub mod blueprint;
pub mod clock;
pub mod computed;
pub mod datum;
pub mod error;
pub mod graph;
pub mod history;
pub mod object;
pub mod observer;
pub mod scheduler;

pub use array::Array;
pub use binding::Binding;
pub use blueprint::{Blueprint, BlueprintBuilder, Field};
pub use clock::{FrameClock, LabClock};
pub use computed::{ComputedDef, ComputedProperty, DeriveError, Derivation, Scope};
pub use datum::Datum;
pub use error::{ReactiveError, Result};
pub use graph::DependencyGraph;
pub use history::{History, TrackOptions};
pub use object::Object;
pub use observer::{ObserveOptions, ObserverId, Subscription, Throttle, WILDCARD};
pub use scheduler::{FlushError, FrameReport, SchedulerConfig, SchedulerStats};
pub use weft_core::Value;
