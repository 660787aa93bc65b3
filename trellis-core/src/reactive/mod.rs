//! Signals and effects for state that lives outside a store.
//!
//! A [`Signal`] is a shared cell. An [`Effect`] is a closure that runs at
//! construction and again whenever a cell it read on its previous run is
//! written; it may hand back a [`Cleanup`] that fires before the next run
//! and on stop. Reads are captured through a per-thread stack of executing
//! effects ([`ReactiveContext`]), so threads never observe each other's
//! tracking and nested effects hand control back to their parent.

mod context;
mod effect;
mod signal;
mod subscriber;

pub use context::ReactiveContext;
pub use effect::{Cleanup, Effect};
pub use signal::Signal;
pub use subscriber::SubscriberId;
