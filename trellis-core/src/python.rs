//! Python bindings for the store.
//!
//! Only scalar values cross the boundary: `None`, `bool`, `int`, `float` and
//! `str`. Lists and maps are readable as JSON through `snapshot_json`.

use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;

use crate::store::{Store, StoreOptions};
use crate::value::Value;

/// Python-exposed store.
#[pyclass(name = "Store")]
pub struct PyStore {
    inner: Store,
}

#[pymethods]
impl PyStore {
    #[new]
    #[pyo3(signature = (name, module = None))]
    fn new(name: &str, module: Option<&str>) -> Self {
        let mut options = StoreOptions::new();
        if let Some(module) = module {
            options = options.module(module);
        }
        Self { inner: Store::new(name, options) }
    }

    /// Current value of `key`; `None` when missing.
    fn get(&self, py: Python<'_>, key: &str) -> PyObject {
        match self.inner.get(key) {
            Value::Null | Value::Component(_) => py.None(),
            Value::Bool(b) => b.into_py(py),
            Value::Int(n) => n.into_py(py),
            Value::Float(x) => x.into_py(py),
            Value::String(s) => s.into_py(py),
            other => other.to_json().to_string().into_py(py),
        }
    }

    fn set(&self, key: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let value = if value.is_none() {
            Value::Null
        } else if let Ok(b) = value.extract::<bool>() {
            Value::Bool(b)
        } else if let Ok(n) = value.extract::<i64>() {
            Value::Int(n)
        } else if let Ok(x) = value.extract::<f64>() {
            Value::Float(x)
        } else if let Ok(s) = value.extract::<String>() {
            Value::String(s)
        } else {
            return Err(PyTypeError::new_err("store values must be None, bool, int, float or str"));
        };
        self.inner.set(key, value);
        Ok(())
    }

    /// The whole state as a JSON object.
    fn snapshot_json(&self) -> PyResult<String> {
        let json = Value::Map(self.inner.snapshot()).to_json();
        serde_json::to_string(&json).map_err(|err| PyValueError::new_err(err.to_string()))
    }

    #[getter]
    fn name(&self) -> String {
        self.inner.name().to_string()
    }

    #[getter]
    fn module(&self) -> String {
        self.inner.module().to_string()
    }

    fn __repr__(&self) -> String {
        format!("Store(module={}, name={})", self.inner.module(), self.inner.name())
    }
}
