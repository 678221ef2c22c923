//! Elastic (non-rigid) warping.

use ndarray::Array4;
use tracing::trace;

use super::field::DisplacementField;
use super::resample::{resample_example, FillPolicy};
use crate::error::{Error, Result};
use crate::volume::{spatial_shape, Label};

/// Warp an image and its labels through an existing displacement field.
///
/// The output keeps the input extent; sources that fall outside the volume
/// are resolved by `policy`.
pub fn warp_example<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    field: &DisplacementField,
    policy: FillPolicy,
) -> Result<(Array4<f32>, Vec<Array4<L>>)> {
    let shape = spatial_shape(image);
    if field.shape() != shape {
        return Err(Error::ShapeMismatch {
            expected: shape.to_vec(),
            actual: field.shape().to_vec(),
        });
    }
    if field.is_identity() {
        return Ok((image.clone(), labels.to_vec()));
    }
    resample_example(image.view(), labels, shape, field, policy)
}

/// Randomly warp an image and its labels with a smooth displacement field.
///
/// # Arguments
///
/// * `image` - Input image `(z, y, x, channel)`
/// * `labels` - Label volumes on the same spatial grid
/// * `n` - Number of random control impulses per axis
/// * `max_sigma` - Upper bound for the smoothing sigma, in voxels
/// * `policy` - Boundary handling shared by image and labels
/// * `seed` - Optional random seed for reproducibility
#[must_use = "this function returns a new example and does not modify the original"]
pub fn elastic_warp<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    n: usize,
    max_sigma: f64,
    policy: FillPolicy,
    seed: Option<u64>,
) -> Result<(Array4<f32>, Vec<Array4<L>>)> {
    let field = DisplacementField::generate(spatial_shape(image), n, max_sigma, seed)?;
    trace!(
        n,
        max_sigma,
        max_displacement = field.max_magnitude(),
        "elastic warp"
    );
    warp_example(image, labels, &field, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn ramp() -> Array4<f32> {
        Array4::from_shape_fn((3, 20, 20, 1), |(z, y, x, _)| (z * 400 + y * 20 + x) as f32)
    }

    fn two_class_labels() -> Array4<u8> {
        Array4::from_shape_fn((3, 20, 20, 1), |(_, _, x, _)| if x < 10 { 1 } else { 2 })
    }

    #[test]
    fn test_identity_field_leaves_content_unchanged() {
        let img = ramp();
        let labels = vec![two_class_labels()];
        for sigma in [0.0, 1.0, 25.0] {
            let (out_img, out_labels) =
                elastic_warp(&img, &labels, 0, sigma, FillPolicy::Clamp, Some(3)).unwrap();
            assert_eq!(out_img, img);
            assert_eq!(out_labels, labels);
        }
    }

    #[test]
    fn test_warp_is_reproducible() {
        let img = ramp();
        let labels = vec![two_class_labels()];
        let a = elastic_warp(&img, &labels, 6, 4.0, FillPolicy::Clamp, Some(11)).unwrap();
        let b = elastic_warp(&img, &labels, 6, 4.0, FillPolicy::Clamp, Some(11)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.0, img);
    }

    #[test]
    fn test_warp_preserves_shape_and_label_set() {
        let img = ramp();
        let labels = vec![two_class_labels()];
        let (out_img, out_labels) =
            elastic_warp(&img, &labels, 8, 3.0, FillPolicy::Constant(0.0), Some(5)).unwrap();

        assert_eq!(out_img.dim(), img.dim());
        assert_eq!(out_labels[0].dim(), labels[0].dim());
        let allowed: BTreeSet<u8> = [0, 1, 2].into_iter().collect();
        assert!(out_labels[0].iter().all(|v| allowed.contains(v)));
    }

    #[test]
    fn test_constant_fill_agrees_between_image_and_labels() {
        let img = Array4::<f32>::ones((2, 16, 16, 1));
        let labels = vec![Array4::<u8>::ones((2, 16, 16, 1))];
        let mut filled = 0;
        for seed in 0..8 {
            let (out_img, out_labels) =
                elastic_warp(&img, &labels, 8, 3.0, FillPolicy::Constant(0.0), Some(seed))
                    .unwrap();
            for (&v, &l) in out_img.iter().zip(out_labels[0].iter()) {
                assert_eq!(v < 0.5, l == 0, "seed {}", seed);
                if l == 0 {
                    filled += 1;
                }
            }
        }
        assert!(filled > 0);
    }

    #[test]
    fn test_field_shape_must_match() {
        let img = ramp();
        let field = DisplacementField::identity([3, 10, 20]);
        let result = warp_example::<u8>(&img, &[], &field, FillPolicy::Clamp);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }
}
