//! Live Document and Reconciliation
//!
//! Components render to markup; this module keeps a live [`Document`] in
//! step with that markup without rebuilding it.
//!
//! # Pipeline
//!
//! ```text
//! markup --parse--> Vec<VNode> --patch_children--> Document
//!                                                     |
//!                              attach_bindings <------+
//! ```
//!
//! - [`parse`] turns markup into a detached [`VNode`] forest. It never fails.
//! - [`patch_children`] diffs the forest against the live children of a node,
//!   matching keyed children by `data-key` so reordering a list moves nodes
//!   instead of recreating them.
//! - [`attach_bindings`] wires `data-on-<event>` attributes to handlers from
//!   the [`HandlerRegistry`].
//!
//! [`DomStats`] counts every structural operation, which is how tests assert
//! that a patch touched only what changed.

mod bindings;
mod events;
mod node;
mod parse;
mod reconcile;
mod serialize;

pub use bindings::{attach_bindings, compile as compile_bindings, Binding, BindingRegistry};
pub use events::{DispatchOutcome, Event, Handler, HandlerRegistry, Listener, Modifiers};
pub use node::{Document, DomStats, Element, Node, NodeId, NodeKind};
pub use parse::{parse, VNode};
pub use reconcile::{instantiate, patch_attributes, patch_children, patch_node};
pub use serialize::{inner_html, outer_html, vnode_to_html};
