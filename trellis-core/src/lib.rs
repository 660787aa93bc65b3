//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis component framework.
//! It implements:
//!
//! - A reactive key-value store with computed keys, watchers and history
//! - Fine-grained signals and effects
//! - A directive template renderer
//! - A live document tree with keyed reconciliation and event bindings
//!
//! The crate is designed to be used as a native Rust library and, with the
//! `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! - `store`: stores, computed keys, watchers, persistence, the store manager
//! - `reactive`: signals and effects with automatic dependency tracking
//! - `template`: directive lexer, parser and renderer
//! - `component`: components, their identity and the constructor registry
//! - `dom`: document tree, markup parser, reconciler, events and bindings
//! - `app`: the UI context that ties the above together
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::app::App;
//! use trellis_core::component::HtmlComponent;
//! use trellis_core::config::AppConfig;
//! use trellis_core::store::StoreOptions;
//!
//! let mut app = App::new(AppConfig::default());
//! let store = app.stores().create_store("default", StoreOptions::new())?;
//! store.set("count", 1);
//!
//! let counter = HtmlComponent::new(
//!     "Counter",
//!     "<root><p>@store:app.default.count</p></root>",
//!     Default::default(),
//! )?;
//! app.mount(counter.into_ref())?;
//!
//! store.set("count", 2);
//! app.flush();
//! // The span bound to `count` now reads "2".
//! ```

pub mod app;
pub mod component;
pub mod config;
pub mod dom;
pub mod error;
pub mod reactive;
pub mod store;
pub mod template;
pub mod value;

#[cfg(feature = "python")]
mod python;

pub use error::{Error, Result};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition.
///
/// This function is called by Python when importing the module.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyStore>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
