#![forbid(unsafe_code)]

//! Render: keyed-sequence reconciliation against a host-owned node list.
//!
//! # Key Components
//!
//! - [`reconcile`] / [`reconcile_by_key`] - insert/move/remove script; the
//!   LIS pass keeps moves at `reused - |LIS|` for whatever the end checks
//!   leave over.
//! - [`render_list`] / [`ListRenderer`] - clear-all, append-all, or reconcile.
//! - [`Host`] - the ordered structure being patched; [`VecHost`] for tests.

pub mod host;
pub mod lis;
pub mod list;
pub mod reconcile;

pub use host::{Host, HostOp, VecHost};
pub use lis::longest_increasing_subsequence;
pub use list::{ListRenderer, render_list};
pub use reconcile::{ReconcileError, ReconcileStats, Reconciled, reconcile, reconcile_by_key};
