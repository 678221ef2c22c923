//! Rigid and scaling transforms applied jointly to an image and its labels.
//!
//! All of them except [`flip`] express themselves as an inverse coordinate
//! mapping and go through [`resample`](super::resample).

use ndarray::{Array4, Axis};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::get_rng;
use super::resample::{resample_example, resample_image, resample_labels, FillPolicy};
use crate::error::{Error, Result};
use crate::volume::{into_standard_layout, spatial_shape, Label};

/// An image together with its label volumes.
pub type ExamplePair<L> = (Array4<f32>, Vec<Array4<L>>);

/// Flip the image and labels along the given spatial axes (0=z, 1=y, 2=x).
pub fn flip<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    axes: &[usize],
) -> Result<ExamplePair<L>> {
    if let Some(&axis) = axes.iter().find(|&&a| a >= 3) {
        return Err(Error::invalid_dimensions(format!(
            "flip axis {} out of range (must be 0, 1, or 2)",
            axis
        )));
    }

    fn flipped<T: Clone>(volume: &Array4<T>, axes: &[usize]) -> Array4<T> {
        let mut view = volume.view();
        for &axis in axes {
            view.invert_axis(Axis(axis));
        }
        into_standard_layout(view.to_owned())
    }

    Ok((
        flipped(image, axes),
        labels.iter().map(|label| flipped(label, axes)).collect(),
    ))
}

/// Flip each spatial axis independently with probability one half.
#[must_use = "this function returns a new example and does not modify the original"]
pub fn random_flip<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    seed: Option<u64>,
) -> Result<ExamplePair<L>> {
    let mut rng = get_rng(seed);
    let axes: Vec<usize> = (0..3).filter(|_| rng.gen::<f32>() < 0.5).collect();
    trace!(?axes, "flip");

    if axes.is_empty() {
        return Ok((image.clone(), labels.to_vec()));
    }
    flip(image, labels, &axes)
}

/// Rotate every z-slice by `angle` degrees about the in-plane centre.
///
/// The output keeps the input extent; corners that rotate in from outside
/// the volume are resolved by `policy`.
#[allow(clippy::cast_precision_loss)]
pub fn rotate<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    angle: f64,
    policy: FillPolicy,
) -> Result<ExamplePair<L>> {
    if !angle.is_finite() {
        return Err(Error::configuration(format!(
            "rotate: angle must be finite (got {})",
            angle
        )));
    }
    let [d, h, w] = spatial_shape(image);
    let (sin, cos) = angle.to_radians().sin_cos();
    let cy = (h as f64 - 1.0) / 2.0;
    let cx = (w as f64 - 1.0) / 2.0;

    let map = move |[z, y, x]: [usize; 3]| {
        let dy = y as f64 - cy;
        let dx = x as f64 - cx;
        [
            z as f64,
            cy + cos * dy - sin * dx,
            cx + sin * dy + cos * dx,
        ]
    };
    resample_example(image.view(), labels, [d, h, w], &map, policy)
}

/// Rotate by an angle drawn uniformly from `[-max_angle, max_angle]` degrees.
#[must_use = "this function returns a new example and does not modify the original"]
pub fn random_rotate<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    max_angle: f64,
    policy: FillPolicy,
    seed: Option<u64>,
) -> Result<ExamplePair<L>> {
    let mut rng = get_rng(seed);
    let angle = if max_angle > 0.0 {
        rng.gen_range(-max_angle..=max_angle)
    } else {
        0.0
    };
    trace!(angle, "rotate");
    rotate(image, labels, angle, policy)
}

/// Rotate the (y, x) plane by `k` quarter turns, following numpy's `rot90`.
///
/// Odd `k` swaps height and width; depth and channels are untouched.
#[allow(clippy::cast_precision_loss)]
pub fn rotate90<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    k: usize,
    policy: FillPolicy,
) -> Result<ExamplePair<L>> {
    let k = k % 4;
    if k == 0 {
        return Ok((image.clone(), labels.to_vec()));
    }

    let [d, h, w] = spatial_shape(image);
    let out_shape = if k % 2 == 1 { [d, w, h] } else { [d, h, w] };
    let y_max = (h - 1) as f64;
    let x_max = (w - 1) as f64;

    let map = move |[z, i, j]: [usize; 3]| {
        let (i, j) = (i as f64, j as f64);
        let (y, x) = match k {
            1 => (j, x_max - i),
            2 => (y_max - i, x_max - j),
            _ => (y_max - j, i),
        };
        [z as f64, y, x]
    };
    resample_example(image.view(), labels, out_shape, &map, policy)
}

/// Rotate by 0, 90, 180 or 270 degrees, chosen uniformly.
#[must_use = "this function returns a new example and does not modify the original"]
pub fn random_rotate90<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    policy: FillPolicy,
    seed: Option<u64>,
) -> Result<ExamplePair<L>> {
    let mut rng = get_rng(seed);
    let k: usize = rng.gen_range(0..4);
    trace!(k, "rotate90");
    rotate90(image, labels, k, policy)
}

/// Rescale the (y, x) plane by per-axis factors `[fy, fx]`.
///
/// Output extent along each axis is `max(1, round(extent * f))`. Corners are
/// aligned, so every output voxel maps inside the source volume.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn rescale<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    factors: [f64; 2],
    policy: FillPolicy,
) -> Result<ExamplePair<L>> {
    if factors.iter().any(|f| !f.is_finite() || *f <= 0.0) {
        return Err(Error::configuration(format!(
            "rescale: factors must be finite and positive (got {:?})",
            factors
        )));
    }

    let [d, h, w] = spatial_shape(image);
    let out_h = ((h as f64 * factors[0]).round() as usize).max(1);
    let out_w = ((w as f64 * factors[1]).round() as usize).max(1);

    let step = |src: usize, dst: usize| {
        if dst > 1 {
            (src as f64 - 1.0) / (dst as f64 - 1.0)
        } else {
            0.0
        }
    };
    let (step_y, step_x) = (step(h, out_h), step(w, out_w));
    let (mid_y, mid_x) = ((h as f64 - 1.0) / 2.0, (w as f64 - 1.0) / 2.0);

    let map = move |[z, y, x]: [usize; 3]| {
        let sy = if out_h > 1 { y as f64 * step_y } else { mid_y };
        let sx = if out_w > 1 { x as f64 * step_x } else { mid_x };
        [z as f64, sy, sx]
    };
    resample_example(image.view(), labels, [d, out_h, out_w], &map, policy)
}

/// Rescale by a factor drawn from `[min_f, max_f]`.
///
/// With `per_axis`, y and x get independent factors; otherwise one factor is
/// shared.
#[must_use = "this function returns a new example and does not modify the original"]
pub fn random_rescale<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    min_f: f64,
    max_f: f64,
    per_axis: bool,
    policy: FillPolicy,
    seed: Option<u64>,
) -> Result<ExamplePair<L>> {
    if !(min_f > 0.0 && min_f <= max_f && max_f.is_finite()) {
        return Err(Error::configuration(format!(
            "rescale: need 0 < min <= max (got min={}, max={})",
            min_f, max_f
        )));
    }
    let mut rng = get_rng(seed);
    let fy = rng.gen_range(min_f..=max_f);
    let fx = if per_axis {
        rng.gen_range(min_f..=max_f)
    } else {
        fy
    };
    trace!(fy, fx, "rescale");
    rescale(image, labels, [fy, fx], policy)
}

/// Which slices a misalignment displaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisalignKind {
    /// Every slice from the split onward is translated.
    Translation,
    /// Only the split slice is displaced.
    Slip,
}

impl MisalignKind {
    fn shifts(self, z: usize, split: usize) -> bool {
        match self {
            Self::Translation => z >= split,
            Self::Slip => z == split,
        }
    }
}

/// Spatial shape left after cropping `delta` from every in-plane border.
fn cropped_shape([d, h, w]: [usize; 3], delta: usize) -> Result<[usize; 3]> {
    match delta.checked_mul(2) {
        Some(margin) if h > margin && w > margin => Ok([d, h - margin, w - margin]),
        _ => Err(Error::invalid_dimensions(format!(
            "misalign: delta {} too large for in-plane shape {}x{}",
            delta, h, w
        ))),
    }
}

fn offset_bound(delta: usize) -> Result<isize> {
    isize::try_from(delta).map_err(|_| {
        Error::invalid_dimensions(format!("misalign: delta {} out of range", delta))
    })
}

/// Displace slices of the stack in-plane by `offset = [dy, dx]`.
///
/// The output is cropped by `delta` on every in-plane border so that any
/// offset within `[-delta, delta]` stays inside the source; output size thus
/// depends only on the input size and `delta`. Labels follow the displaced
/// slices only when `shift_labels` is set.
#[allow(clippy::cast_precision_loss)]
pub fn misalign<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    offset: [isize; 2],
    split: usize,
    delta: usize,
    kind: MisalignKind,
    shift_labels: bool,
) -> Result<ExamplePair<L>> {
    let out_shape = cropped_shape(spatial_shape(image), delta)?;
    if offset.iter().any(|o| o.unsigned_abs() > delta) {
        return Err(Error::configuration(format!(
            "misalign: offset {:?} exceeds delta {}",
            offset, delta
        )));
    }

    let base = delta as f64;
    let (dy, dx) = (offset[0] as f64, offset[1] as f64);

    let shifted = move |[z, y, x]: [usize; 3]| {
        let (oy, ox) = if kind.shifts(z, split) { (dy, dx) } else { (0.0, 0.0) };
        [z as f64, y as f64 + base + oy, x as f64 + base + ox]
    };
    let fixed = move |[z, y, x]: [usize; 3]| [z as f64, y as f64 + base, x as f64 + base];

    // Every source coordinate is in bounds, so the policy never applies.
    let policy = FillPolicy::Clamp;
    let image = resample_image(image.view(), out_shape, &shifted, policy)?;
    let labels = labels
        .iter()
        .map(|label| {
            if shift_labels {
                resample_labels(label.view(), out_shape, &shifted, policy)
            } else {
                resample_labels(label.view(), out_shape, &fixed, policy)
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((image, labels))
}

/// With probability `prob`, misalign the stack at a random slice by a random
/// offset bounded by `delta`. The crop is applied either way.
#[must_use = "this function returns a new example and does not modify the original"]
#[allow(clippy::too_many_arguments)]
pub fn random_misalign<L: Label>(
    image: &Array4<f32>,
    labels: &[Array4<L>],
    prob: f64,
    delta: usize,
    kind: MisalignKind,
    shift_labels: bool,
    seed: Option<u64>,
) -> Result<ExamplePair<L>> {
    if !(0.0..=1.0).contains(&prob) {
        return Err(Error::configuration(format!(
            "misalign: probability must be between 0.0 and 1.0 (got {})",
            prob
        )));
    }
    let [d, _, _] = cropped_shape(spatial_shape(image), delta)?;
    let bound = offset_bound(delta)?;
    let mut rng = get_rng(seed);

    let (offset, split) = if rng.gen_bool(prob) {
        let offset = [
            rng.gen_range(-bound..=bound),
            rng.gen_range(-bound..=bound),
        ];
        let split = if d > 1 { rng.gen_range(1..d) } else { 0 };
        (offset, split)
    } else {
        ([0, 0], d)
    };
    trace!(?offset, split, ?kind, "misalign");
    misalign(image, labels, offset, split, delta, kind, shift_labels)
}
