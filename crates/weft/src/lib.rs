#![forbid(unsafe_code)]

//! weft public facade crate.
//!
//! Reactive containers from `weft-runtime`, keyed list reconciliation from
//! `weft-render`, and [`mount_list`] tying an [`Array`](weft_runtime::Array)
//! to a rendered list.

pub mod list;

pub use list::{ListMount, mount_list};

pub use weft_core as core;
pub use weft_render as render;
pub use weft_runtime as runtime;

pub mod prelude {
    pub use crate::list::{ListMount, mount_list};
    pub use weft_core::{Value, patch};
    pub use weft_render::{Host, ListRenderer, ReconcileStats, VecHost, reconcile, render_list};
    pub use weft_runtime::{
        Array, Binding, Blueprint, Datum, History, Object, ObserveOptions, ReactiveError,
        Subscription, TrackOptions, WILDCARD, scheduler,
    };

    pub use weft_core as core;
    pub use weft_render as render;
    pub use weft_runtime as runtime;
}
