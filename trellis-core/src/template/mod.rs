//! Template Directives
//!
//! Component templates are HTML with `@` directives:
//!
//! | Directive | Output |
//! |-----------|--------|
//! | `@store:module.store.key` | `<span data-store="...">value</span>`, updated in place |
//! | `@store:module.store.key:w` | left in an attribute for two-way binding |
//! | `@signal:name` | `<span data-signal="...">value</span>` for a component signal |
//! | `@signal:name:w` | left in an attribute for two-way binding |
//! | `@prop:name.field` | the prop or loop alias |
//! | `@include:name` | a declared dependency |
//! | `@include:Name:{k:"v"}` | a registered component built from inline props |
//! | `@for:a,b in expr` ... `@endfor` | one copy per item, range or map entry |
//! | `@foreach:expr as a` ... `@endforeach` | same, single alias |
//! | `@if:` / `@else-if:` / `@else` / `@endif` | a `data-condition` block |
//! | `@slot:dep.name` ... `@endslot` | nothing; fills `name` (or `default`) in dependency `dep` |
//! | `@slot:name` ... `@endslot` | the markup provided for `name`, else the body |
//! | `@on:click:handler`, `@click.once:handler` | `data-on-click` attributes |
//!
//! Conditions compare `store:module.store.key`, `signal:name` or
//! `prop:path` against a quoted literal.
//!
//! # How Rendering Works
//!
//! The [`lexer`] splits the template into text and directive tokens, the
//! [`parser`] builds a tree with nested blocks, and the renderer walks the
//! tree against the component's props, the stores and the loop scope.
//! Directives that cannot be resolved are written back verbatim.

mod condition;
mod constructors;
pub mod lexer;
pub mod parser;
mod render;

pub use condition::{Condition, Operand};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{parse, Branch, Conditional, Loop, Node, Slot};
pub use render::{ConditionBlock, RenderContext};

pub(crate) use render::render;
