//! Error types for augmentation.
//!
//! Configuration problems are reported before any array is touched; geometry
//! problems are reported by the stage that hits them.

use thiserror::Error;

/// Main error type for volaug operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An enabled augmentation is missing a parameter or has one out of range.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An augmentation flag selects a feature that is not implemented.
    #[error("unimplemented augmentation: {0}")]
    UnimplementedFeature(String),

    /// A label volume does not cover the same spatial grid as the image.
    #[error("shape mismatch: expected spatial shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A volume is empty or too small for the requested geometry.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// An operation needed a contiguous buffer and did not get one.
    #[error("non-contiguous array: {0}")]
    NonContiguousArray(String),

    /// An output array could not be assembled from its buffer.
    #[error("memory allocation failed: {0}")]
    MemoryAllocation(String),
}

/// Result type for volaug operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an unimplemented-feature error.
    pub fn unimplemented(feature: impl Into<String>) -> Self {
        Self::UnimplementedFeature(feature.into())
    }

    /// Create an invalid-dimensions error.
    pub fn invalid_dimensions(msg: impl Into<String>) -> Self {
        Self::InvalidDimensions(msg.into())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::MemoryAllocation(format!("Failed to create output array: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::configuration("box: missing field `r`");
        assert_eq!(
            err.to_string(),
            "invalid configuration: box: missing field `r`"
        );
    }

    #[test]
    fn test_unimplemented_is_distinct() {
        let err = Error::unimplemented("grey");
        assert!(matches!(err, Error::UnimplementedFeature(_)));
        assert!(!matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = Error::ShapeMismatch {
            expected: vec![4, 32, 32],
            actual: vec![4, 16, 32],
        };
        let msg = err.to_string();
        assert!(msg.contains("[4, 32, 32]"));
        assert!(msg.contains("[4, 16, 32]"));
    }
}
