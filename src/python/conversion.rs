//! Conversions between Python objects and volaug inputs.
//!
//! Augmentation parameters arrive as a Python dict and are turned into the
//! JSON mapping the configuration normalizer expects. Volumes arrive as numpy
//! arrays.

use ndarray::Array4;
use numpy::{IntoPyArray, PyArray4};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PyString, PyTuple};
use serde_json::{Map, Number, Value};

/// Convert a Python parameter value into JSON.
///
/// Accepts `None`, bools, ints, floats (including numpy scalars), strings,
/// dicts with string keys, lists and tuples.
pub fn py_to_json(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::Null);
    }
    // bool first: Python bools are also ints
    if let Ok(b) = obj.downcast::<PyBool>() {
        return Ok(Value::Bool(b.is_true()));
    }
    if let Ok(s) = obj.downcast::<PyString>() {
        return Ok(Value::String(s.to_cow()?.into_owned()));
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        return dict_to_json(dict);
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        return list.iter().map(|item| py_to_json(&item)).collect();
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        return tuple.iter().map(|item| py_to_json(&item)).collect();
    }
    if let Ok(i) = obj.extract::<i64>() {
        return Ok(Value::from(i));
    }
    if let Ok(f) = obj.extract::<f64>() {
        return Number::from_f64(f).map(Value::Number).ok_or_else(|| {
            PyValueError::new_err(format!("parameter value must be finite (got {})", f))
        });
    }
    Err(PyValueError::new_err(format!(
        "unsupported parameter value of type {}",
        obj.get_type().name()?
    )))
}

/// Convert a parameter dict into a JSON object.
pub fn dict_to_json(dict: &Bound<'_, PyDict>) -> PyResult<Value> {
    let mut map = Map::new();
    for (key, value) in dict.iter() {
        let key: String = key
            .extract()
            .map_err(|_| PyValueError::new_err("parameter names must be strings"))?;
        map.insert(key, py_to_json(&value)?);
    }
    Ok(Value::Object(map))
}

/// Move an owned volume into a numpy array without copying.
pub fn volume_to_numpy<T: numpy::Element>(
    py: Python<'_>,
    volume: Array4<T>,
) -> Bound<'_, PyArray4<T>> {
    volume.into_pyarray(py)
}
