//! Error types for the Trellis core.
//!
//! Most of the runtime deliberately does not fail: missing stores, keys and
//! props resolve to empty values and malformed markup is patched as best it
//! can be. The errors below cover the few places where a caller has to make
//! a decision (construction, registration, persistence).

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the Trellis core.
#[derive(Debug, Error)]
pub enum Error {
    /// A component was constructed with an empty template.
    #[error("component `{component}` has an empty template")]
    MissingTemplate { component: String },

    /// A component was initialised without a store and no `app/default`
    /// store is registered.
    #[error("no store provided and no default store found for component `{component}`")]
    NoStore { component: String },

    /// A store with the same module and name is already registered.
    #[error("store `{module}.{name}` is already registered")]
    DuplicateStore { module: String, name: String },

    /// A component constructor with the same name is already registered.
    #[error("component `{name}` is already registered")]
    DuplicateComponent { name: String },

    /// No component constructor is registered under this name.
    #[error("unknown component `{name}`")]
    UnknownComponent { name: String },

    /// The component id does not belong to a mounted component.
    #[error("component `{id}` is not mounted")]
    ComponentNotMounted { id: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encode error: {0}")]
    SnapshotEncode(#[from] rmp_serde::encode::Error),

    #[error("snapshot decode error: {0}")]
    SnapshotDecode(#[from] rmp_serde::decode::Error),
}
