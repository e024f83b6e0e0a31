//! Error types for declaration and write failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Fatal declaration-time and write-time errors.
///
/// Strict-patch type mismatches are deliberately *not* represented here: they
/// are dropped and reported as "no change".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error("circular computed dependency: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("computed property `{computed}` reads undeclared property `{key}`")]
    UnknownDependency { computed: String, key: String },

    #[error("unknown property `{key}`")]
    UnknownKey { key: String },

    #[error("property `{key}` is declared more than once")]
    DuplicateKey { key: String },

    #[error("computed property `{key}` is read-only")]
    ReadonlyComputed { key: String },

    #[error("binding for `{key}` is read-only (its source is computed)")]
    ReadonlyBinding { key: String },

    #[error("private property `{key}` cannot be bound")]
    PrivateBinding { key: String },

    #[error("property `{key}` cannot be bound to its own container")]
    SelfBinding { key: String },

    #[error("consumer property `{key}` is already connected")]
    DuplicateConnection { key: String },

    #[error("property `{key}` already forwards through a binding and cannot be re-bound")]
    ChainedBinding { key: String },

    #[error("source of the binding for `{key}` has been dropped")]
    DetachedBinding { key: String },

    #[error("container for `{key}` already has an owner; detach it first")]
    AlreadyOwned { key: String },

    #[error("placing a container under `{key}` would make it its own ancestor")]
    CyclicOwnership { key: String },

    #[error("index {index} out of bounds (length {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("container has been disposed")]
    Disposed,
}

impl ReactiveError {
    pub(crate) fn unknown(key: &str) -> Self {
        Self::UnknownKey {
            key: key.to_owned(),
        }
    }
}
