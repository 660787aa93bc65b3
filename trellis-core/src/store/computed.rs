//! Computed store values.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::value::{Value, ValueMap};

type ComputeFn = Box<dyn Fn(&ValueMap) -> Value + Send + Sync>;

/// A store key derived from other keys.
///
/// The compute function receives a map holding exactly the declared
/// dependencies (missing keys are `Null`). It must be pure: the store decides
/// when to call it by comparing dependency values against the last snapshot.
///
/// # Example
///
/// ```rust,ignore
/// store.register_computed(Computed::new("double", ["count"], |deps| {
///     Value::from(deps["count"].as_i64().unwrap_or(0) * 2)
/// }));
/// ```
pub struct Computed {
    key: String,
    deps: SmallVec<[String; 4]>,
    compute: ComputeFn,

    /// Dependency values seen by the last evaluation.
    memo: Mutex<Option<Vec<Value>>>,

    evaluations: AtomicUsize,
}

impl Computed {
    pub fn new<K, I, D, F>(key: K, deps: I, compute: F) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = D>,
        D: Into<String>,
        F: Fn(&ValueMap) -> Value + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            deps: deps.into_iter().map(Into::into).collect(),
            compute: Box::new(compute),
            memo: Mutex::new(None),
            evaluations: AtomicUsize::new(0),
        }
    }

    /// The key this computed writes to.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn depends_on(&self, key: &str) -> bool {
        self.deps.iter().any(|d| d == key)
    }

    /// How many times the compute function has run.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    /// Collect the current dependency values from the store state.
    pub(crate) fn inputs(&self, state: &ValueMap) -> ValueMap {
        self.deps
            .iter()
            .map(|d| (d.clone(), state.get(d).cloned().unwrap_or_default()))
            .collect()
    }

    /// Evaluate unconditionally and seed the memo.
    pub(crate) fn evaluate(&self, inputs: &ValueMap) -> Value {
        let mut memo = self.memo.lock();
        let value = self.run(inputs);
        *memo = Some(inputs.values().cloned().collect());
        value
    }

    /// Evaluate only if the inputs differ from the memo.
    pub(crate) fn reevaluate(&self, inputs: &ValueMap) -> Option<Value> {
        let mut memo = self.memo.lock();
        let snapshot: Vec<Value> = inputs.values().cloned().collect();
        if memo.as_ref() == Some(&snapshot) {
            return None;
        }
        let value = self.run(inputs);
        *memo = Some(snapshot);
        Some(value)
    }

    fn run(&self, inputs: &ValueMap) -> Value {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        (self.compute)(inputs)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("key", &self.key)
            .field("deps", &self.deps)
            .field("evaluations", &self.evaluation_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum() -> Computed {
        Computed::new("sum", ["a", "b"], |deps| {
            let a = deps["a"].as_i64().unwrap_or(0);
            let b = deps["b"].as_i64().unwrap_or(0);
            Value::from(a + b)
        })
    }

    #[test]
    fn inputs_default_missing_keys_to_null() {
        let computed = sum();
        let mut state = ValueMap::new();
        state.insert("a".into(), Value::from(1));
        let inputs = computed.inputs(&state);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs["b"], Value::Null);
    }

    #[test]
    fn reevaluate_skips_identical_inputs() {
        let computed = sum();
        let mut state = ValueMap::new();
        state.insert("a".into(), Value::from(1));
        state.insert("b".into(), Value::from(2));

        assert_eq!(computed.evaluate(&computed.inputs(&state)), Value::from(3));
        assert_eq!(computed.reevaluate(&computed.inputs(&state)), None);
        assert_eq!(computed.evaluation_count(), 1);

        state.insert("b".into(), Value::from(5));
        assert_eq!(computed.reevaluate(&computed.inputs(&state)), Some(Value::from(6)));
        assert_eq!(computed.evaluation_count(), 2);
    }
}
