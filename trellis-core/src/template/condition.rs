//! `@if` condition expressions.
//!
//! A condition is a single equality, `lhs == "literal"`, where `lhs` is
//! `store:module.store.key`, `signal:name` or `prop:name[.field]`. The
//! current value is compared against the literal by its text form. Anything
//! else evaluates to false.

use crate::store::StoreManager;
use crate::value::Value;

/// Left-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Store { module: String, store: String, key: String },
    /// A signal the component was built with.
    Signal(String),
    Prop(String),
}

/// A parsed `@if:` / `@else-if:` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    operand: Option<Operand>,
    expected: String,
}

impl Condition {
    /// Parse the trimmed directive line, with or without its `@if:` or
    /// `@else-if:` prefix.
    pub fn parse(line: &str) -> Self {
        let body = line
            .strip_prefix("@if:")
            .or_else(|| line.strip_prefix("@else-if:"))
            .unwrap_or(line);

        let parts: Vec<&str> = body.split("==").collect();
        let [lhs, rhs] = parts.as_slice() else {
            tracing::debug!(condition = line, "condition is not a single `==` comparison");
            return Self { operand: None, expected: String::new() };
        };

        let lhs = lhs.trim();
        let expected = rhs.replace('"', "").trim().to_string();
        let operand = if let Some(path) = lhs.strip_prefix("store:") {
            match path.split('.').collect::<Vec<_>>().as_slice() {
                [module, store, key] => Some(Operand::Store {
                    module: module.to_string(),
                    store: store.to_string(),
                    key: key.to_string(),
                }),
                _ => None,
            }
        } else if let Some(name) = lhs.strip_prefix("signal:") {
            Some(Operand::Signal(name.to_string()))
        } else {
            lhs.strip_prefix("prop:").map(|name| Operand::Prop(name.to_string()))
        };

        if operand.is_none() {
            tracing::debug!(condition = line, "unsupported condition operand");
        }
        Self { operand, expected }
    }

    pub fn operand(&self) -> Option<&Operand> {
        self.operand.as_ref()
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// The store key this condition reads, if any.
    pub fn store_dependency(&self) -> Option<(&str, &str, &str)> {
        match &self.operand {
            Some(Operand::Store { module, store, key }) => Some((module, store, key)),
            _ => None,
        }
    }

    /// The signal this condition reads, if any.
    pub fn signal_dependency(&self) -> Option<&str> {
        match &self.operand {
            Some(Operand::Signal(name)) => Some(name),
            _ => None,
        }
    }

    /// Evaluate against the registered stores, a prop lookup and a signal
    /// lookup. Missing stores, props and signals compare false.
    pub fn evaluate<P, S>(&self, stores: &StoreManager, prop: P, signal: S) -> bool
    where
        P: Fn(&str) -> Option<Value>,
        S: Fn(&str) -> Option<Value>,
    {
        let actual = match &self.operand {
            Some(Operand::Store { module, store, key }) => match stores.get_store(module, store) {
                Some(store) => store.get(key),
                None => {
                    tracing::debug!(%module, %store, "condition store not found");
                    return false;
                }
            },
            Some(Operand::Signal(name)) => match signal(name) {
                Some(value) => value,
                None => {
                    tracing::debug!(signal = %name, "condition signal not found");
                    return false;
                }
            },
            Some(Operand::Prop(path)) => match prop(path) {
                Some(value) => value,
                None => return false,
            },
            None => return false,
        };
        let result = actual.to_string() == self.expected;
        tracing::debug!(actual = %actual, expected = %self.expected, result, "evaluated condition");
        result
    }
}
