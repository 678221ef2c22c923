//! `Augmentor` class for Python bindings.
//!
//! Mirrors the Python calling convention: `augmentor(img)` returns the image,
//! `augmentor(img, labels)` returns `(img, labels)`.

use ndarray::ArrayView4;
use numpy::{PyArray4, PyArrayMethods, PyReadonlyArray4, PyUntypedArrayMethods};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyTuple};

use super::conversion::{dict_to_json, volume_to_numpy};
use super::validation::{to_py_err, validate_volume_shape};
use crate::pipeline::{Augmented, Augmentor as RustAugmentor};
use crate::volume::Intensity;

/// Configurable augmentation of volumetric training examples.
///
/// Args:
///     params: Dict mapping augmentation names to ``True``/``False`` or to
///         ``{"enabled": bool, ...parameters}``. Flat keys such as
///         ``elastic_n`` are also accepted.
///     seed: Optional random seed; fixes the output of every call.
///
/// Example:
///     >>> aug = volaug.Augmentor({"rotate90": True, "noise": {"enabled": True, "sigma": 0.05}})
///     >>> img, labels = aug(img, [labels])
#[pyclass(name = "Augmentor", frozen)]
#[derive(Debug)]
pub struct PyAugmentor {
    inner: RustAugmentor,
}

#[pymethods]
impl PyAugmentor {
    #[new]
    #[pyo3(signature = (params, seed=None))]
    fn new(params: &Bound<'_, PyDict>, seed: Option<u64>) -> PyResult<Self> {
        let raw = dict_to_json(params)?;
        let mut inner = RustAugmentor::from_value(&raw).map_err(|e| to_py_err(e, "Augmentor"))?;
        if let Some(seed) = seed {
            inner = inner.with_seed(seed);
        }
        Ok(Self { inner })
    }

    /// Names of the enabled augmentations, in the order they run.
    #[getter]
    fn enabled(&self) -> Vec<&'static str> {
        self.inner
            .config()
            .stages()
            .iter()
            .map(|stage| stage.name())
            .collect()
    }

    /// Augment an image and optional label volumes.
    ///
    /// Args:
    ///     img: 4D array (z, y, x, channel) of float32, float64, uint8 or uint16
    ///     labels: list of 4D int64 arrays on the same spatial grid
    ///     seed: Optional seed overriding the instance seed for this call
    ///
    /// Returns:
    ///     float32 image, or (image, labels) when labels were given
    #[pyo3(signature = (img, labels=None, seed=None))]
    fn augment(
        &self,
        py: Python<'_>,
        img: &Bound<'_, PyAny>,
        labels: Option<Vec<PyReadonlyArray4<'_, i64>>>,
        seed: Option<u64>,
    ) -> PyResult<PyObject> {
        let labels = labels.unwrap_or_default();
        for label in &labels {
            validate_volume_shape(label.shape(), "label")?;
        }
        let label_views: Vec<ArrayView4<'_, i64>> =
            labels.iter().map(|label| label.as_array()).collect();
        let seed = seed.or(self.inner.seed());

        let result = if let Ok(arr) = img.downcast::<PyArray4<f32>>() {
            self.run(py, &arr.readonly(), &label_views, seed)
        } else if let Ok(arr) = img.downcast::<PyArray4<f64>>() {
            self.run(py, &arr.readonly(), &label_views, seed)
        } else if let Ok(arr) = img.downcast::<PyArray4<u8>>() {
            self.run(py, &arr.readonly(), &label_views, seed)
        } else if let Ok(arr) = img.downcast::<PyArray4<u16>>() {
            self.run(py, &arr.readonly(), &label_views, seed)
        } else {
            return Err(PyValueError::new_err(
                "img must be a 4D numpy array of float32, float64, uint8 or uint16",
            ));
        }?;

        match result {
            Augmented::Image(image) => Ok(volume_to_numpy(py, image).into_any().unbind()),
            Augmented::Example { image, labels } => {
                let image = volume_to_numpy(py, image).into_any();
                let labels = PyList::new(
                    py,
                    labels.into_iter().map(|label| volume_to_numpy(py, label)),
                )?;
                let pair = PyTuple::new(py, [image, labels.into_any()])?;
                Ok(pair.into_any().unbind())
            }
        }
    }

    #[pyo3(signature = (img, labels=None, seed=None))]
    fn __call__(
        &self,
        py: Python<'_>,
        img: &Bound<'_, PyAny>,
        labels: Option<Vec<PyReadonlyArray4<'_, i64>>>,
        seed: Option<u64>,
    ) -> PyResult<PyObject> {
        self.augment(py, img, labels, seed)
    }

    fn __repr__(&self) -> String {
        format!(
            "Augmentor(enabled={:?}, seed={:?})",
            self.enabled(),
            self.inner.seed()
        )
    }
}

impl PyAugmentor {
    /// Run the pipeline with the GIL released.
    fn run<A>(
        &self,
        py: Python<'_>,
        img: &PyReadonlyArray4<'_, A>,
        labels: &[ArrayView4<'_, i64>],
        seed: Option<u64>,
    ) -> PyResult<Augmented<i64>>
    where
        A: Intensity + numpy::Element,
    {
        validate_volume_shape(img.shape(), "img")?;
        let image = img.as_array();
        py.allow_threads(|| self.inner.augment_seeded(image, labels, seed))
            .map_err(|e| to_py_err(e, "augment"))
    }
}
