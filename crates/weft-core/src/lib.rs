#![forbid(unsafe_code)]

//! Core: the value model shared by every weft container.
//!
//! - [`Value`]: tagged variant over primitives, sequences, and mappings.
//! - [`patch`](patch::patch): strict, shape-preserving merge of external data
//!   onto existing storage.
//! - [`path`]: dotted-path access into nested mappings and sequences.
//!
//! Property names starting with [`PRIVATE_PREFIX`] are private: they are
//! never exposed to bindings, wildcard observers, or snapshots.

pub mod patch;
pub mod path;
pub mod value;

pub use patch::patch;
pub use value::{Kind, Shape, Value};

/// Name prefix marking a property as private.
pub const PRIVATE_PREFIX: char = '_';

/// Whether `key` names a private property.
#[inline]
#[must_use]
pub fn is_private(key: &str) -> bool {
    key.starts_with(PRIVATE_PREFIX)
}
