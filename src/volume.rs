//! Volume element types and shape helpers.
//!
//! Volumes are 4D arrays laid out as `(z, y, x, channel)`. Images are worked
//! on as `f32`; label volumes keep whatever integer type the caller uses.

use ndarray::{Array4, ArrayBase, ArrayView4, Data, Ix4};

use crate::error::{Error, Result};

/// Element types accepted as image intensities.
///
/// Every image is converted to `f32` when it enters the pipeline.
pub trait Intensity: Copy + Send + Sync {
    fn to_f32(self) -> f32;
}

macro_rules! impl_intensity {
    ($($ty:ty),*) => {
        $(
            impl Intensity for $ty {
                #[inline]
                #[allow(clippy::cast_lossless, clippy::cast_precision_loss)]
                fn to_f32(self) -> f32 {
                    self as f32
                }
            }
        )*
    };
}

impl_intensity!(u8, i8, u16, i16, u32, i32, f32, f64);

/// Element types accepted as label identifiers.
///
/// Labels are only ever copied, never blended. `Default` is the background
/// value written where a constant fill policy applies.
pub trait Label: Copy + Default + Send + Sync {}

impl<T: Copy + Default + Send + Sync> Label for T {}

/// Spatial `(z, y, x)` extent of a volume.
#[inline]
pub fn spatial_shape<S: Data>(volume: &ArrayBase<S, Ix4>) -> [usize; 3] {
    let (z, y, x, _) = volume.dim();
    [z, y, x]
}

/// Copy an image into an owned `f32` volume.
pub fn to_f32_image<A: Intensity>(image: ArrayView4<'_, A>) -> Array4<f32> {
    image.mapv(Intensity::to_f32)
}

/// Return the array in standard (C) layout, reusing the buffer when it already is.
pub fn into_standard_layout<T: Clone>(volume: Array4<T>) -> Array4<T> {
    if volume.is_standard_layout() {
        volume
    } else {
        volume.as_standard_layout().into_owned()
    }
}

/// Reject volumes with an empty axis.
pub fn ensure_non_empty<S: Data>(volume: &ArrayBase<S, Ix4>, what: &str) -> Result<()> {
    if volume.shape().contains(&0) {
        return Err(Error::invalid_dimensions(format!(
            "{} must not have an empty axis (got shape {:?})",
            what,
            volume.shape()
        )));
    }
    Ok(())
}

/// Check that every label volume covers the image's spatial grid.
pub fn ensure_matching_labels<S, T>(
    image: &ArrayBase<S, Ix4>,
    labels: &[ArrayBase<T, Ix4>],
) -> Result<()>
where
    S: Data,
    T: Data,
{
    let expected = spatial_shape(image);
    for label in labels {
        let actual = spatial_shape(label);
        if actual != expected {
            return Err(Error::ShapeMismatch {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
    }
    Ok(())
}
