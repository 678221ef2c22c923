//! Validation helpers for Python boundary.
//!
//! Maps volaug errors onto Python exception types and checks inputs that
//! only exist on the Python side.

use crate::error::Error as VolaugError;
use pyo3::exceptions::{PyMemoryError, PyNotImplementedError, PyValueError};

/// Convert a volaug Error to the appropriate Python exception.
pub fn to_py_err(e: VolaugError, context: &str) -> pyo3::PyErr {
    match &e {
        VolaugError::UnimplementedFeature(feature) => PyNotImplementedError::new_err(format!(
            "{}: augmentation `{}` is not implemented",
            context, feature
        )),
        VolaugError::MemoryAllocation(msg) => {
            PyMemoryError::new_err(format!("{}: {}", context, msg))
        }
        VolaugError::Configuration(_)
        | VolaugError::ShapeMismatch { .. }
        | VolaugError::InvalidDimensions(_)
        | VolaugError::NonContiguousArray(_) => {
            PyValueError::new_err(format!("{}: {}", context, e))
        }
    }
}

/// Validate that an array is a 4D `(z, y, x, channel)` volume.
pub fn validate_volume_shape(shape: &[usize], name: &str) -> pyo3::PyResult<()> {
    if shape.len() != 4 {
        return Err(PyValueError::new_err(format!(
            "{} must have 4 dimensions (z, y, x, channel), got {}",
            name,
            shape.len()
        )));
    }
    for (i, &dim) in shape.iter().enumerate() {
        if dim == 0 {
            return Err(PyValueError::new_err(format!(
                "{} dimension {} cannot be 0",
                name, i
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_volume_shape() {
        assert!(validate_volume_shape(&[4, 32, 32, 1], "image").is_ok());
        assert!(validate_volume_shape(&[32, 32, 1], "image").is_err());
        assert!(validate_volume_shape(&[4, 0, 32, 1], "image").is_err());
    }
}
