//! Pixelwise filters.
//!
//! These only modify image intensities: they take an image, return an image
//! of the same shape, and never see the labels.

use std::f64::consts::TAU;

use ndarray::{s, Array4, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::trace;

use super::field::{gaussian_kernel, smooth_axis};
use super::get_rng;
use crate::error::{Error, Result};
use crate::volume::{into_standard_layout, spatial_shape};

/// Add random Gaussian noise with standard deviation `sigma`.
///
/// Large volumes are processed in parallel chunks, each with its own seed
/// derived from `seed`, so the result does not depend on thread count.
///
/// # Example
///
/// ```
/// use ndarray::Array4;
///
/// let img = Array4::<f32>::zeros((2, 8, 8, 1));
/// let noisy = volaug::transforms::gaussian_noise(img, 0.05, Some(1)).unwrap();
/// assert_eq!(noisy.dim(), (2, 8, 8, 1));
/// ```
#[allow(clippy::cast_possible_truncation)]
pub fn gaussian_noise(image: Array4<f32>, sigma: f64, seed: Option<u64>) -> Result<Array4<f32>> {
    const CHUNK_SIZE: usize = 8192;

    let std = sigma as f32;
    let base_seed = seed.unwrap_or_else(rand::random);

    let mut image = into_standard_layout(image);
    let slice = image.as_slice_memory_order_mut().ok_or_else(|| {
        Error::NonContiguousArray("Array must be contiguous for noise operation".to_string())
    })?;

    slice
        .par_chunks_mut(CHUNK_SIZE)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let chunk_seed = base_seed.wrapping_add(chunk_idx as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(chunk_seed);
            for v in chunk.iter_mut() {
                let u1: f32 = rng.gen::<f32>().max(1e-10);
                let u2: f32 = rng.gen();
                let noise =
                    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos() * std;
                *v += noise;
            }
        });

    Ok(image)
}

/// Blur z-slices in-plane.
///
/// Each slice is blurred with probability `prob`, using a sigma drawn from
/// `[0, sigma]`.
#[allow(clippy::cast_possible_truncation)]
pub fn blur(mut image: Array4<f32>, sigma: f64, prob: f64, seed: Option<u64>) -> Array4<f32> {
    let [_, h, w] = spatial_shape(&image);
    let mut rng = get_rng(seed);
    let sigmas: Vec<Option<f64>> = (0..image.dim().0)
        .map(|_| rng.gen_bool(prob).then(|| rng.gen_range(0.0..=sigma)))
        .collect();
    trace!(?sigmas, "blur");

    for (mut slice, slice_sigma) in image.outer_iter_mut().zip(sigmas) {
        let Some(slice_sigma) = slice_sigma else {
            continue;
        };
        let kernel = gaussian_kernel(slice_sigma, h.max(w));
        let mut plane = slice.mapv(f64::from);
        let mut view = plane.view_mut();
        smooth_axis(&mut view, Axis(0), &kernel);
        smooth_axis(&mut view, Axis(1), &kernel);
        slice.zip_mut_with(&plane, |out, &v| *out = v as f32);
    }
    image
}

/// Blank whole z-slices, each with probability `prob`.
pub fn missing_section(mut image: Array4<f32>, prob: f64, seed: Option<u64>) -> Array4<f32> {
    let mut rng = get_rng(seed);
    for mut slice in image.outer_iter_mut() {
        if rng.gen_bool(prob) {
            slice.fill(0.0);
        }
    }
    image
}

/// Blank a disc of `radius` at a random centre, in each z-slice with
/// probability `prob`.
#[allow(clippy::cast_precision_loss)]
pub fn circle(mut image: Array4<f32>, prob: f64, radius: f64, seed: Option<u64>) -> Array4<f32> {
    let [_, h, w] = spatial_shape(&image);
    let mut rng = get_rng(seed);
    let r2 = radius * radius;

    for mut slice in image.outer_iter_mut() {
        if !rng.gen_bool(prob) {
            continue;
        }
        let cy = rng.gen_range(0..h) as f64;
        let cx = rng.gen_range(0..w) as f64;
        for ((y, x, _), v) in slice.indexed_iter_mut() {
            let (dy, dx) = (y as f64 - cy, x as f64 - cx);
            if dy * dy + dx * dx <= r2 {
                *v = 0.0;
            }
        }
    }
    image
}

/// Add a plane wave `a * sin(f * (x cos(phi) + y sin(phi)) + psi)` with random
/// direction `phi` and phase `psi`, identical across slices and channels.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn sin(mut image: Array4<f32>, a: f64, f: f64, seed: Option<u64>) -> Array4<f32> {
    let mut rng = get_rng(seed);
    let phi = rng.gen_range(0.0..TAU);
    let psi = rng.gen_range(0.0..TAU);
    let (sin_phi, cos_phi) = phi.sin_cos();
    trace!(phi, psi, "sin");

    for ((_, y, x, _), v) in image.indexed_iter_mut() {
        let t = f * (x as f64 * cos_phi + y as f64 * sin_phi) + psi;
        *v += (a * t.sin()) as f32;
    }
    image
}

/// Fill `n` random boxes with `fill`.
///
/// Each box spans `min(z, depth)` slices and a `(2r + 1)` square in-plane. Its
/// centre is chosen so the square lies fully inside the slice when it fits;
/// otherwise it is clipped.
#[allow(clippy::cast_possible_truncation)]
pub fn box_occlude(
    mut image: Array4<f32>,
    n: usize,
    r: usize,
    z: usize,
    fill: f64,
    seed: Option<u64>,
) -> Array4<f32> {
    let [d, h, w] = spatial_shape(&image);
    let mut rng = get_rng(seed);
    let depth = z.min(d);
    let fill = fill as f32;

    for _ in 0..n {
        if depth == 0 {
            break;
        }
        let z0 = rng.gen_range(0..=d - depth);
        let (y0, y1) = box_span(&mut rng, h, r);
        let (x0, x1) = box_span(&mut rng, w, r);
        trace!(z0, y0, x0, "box");
        image
            .slice_mut(s![z0..z0 + depth, y0..y1, x0..x1, ..])
            .fill(fill);
    }
    image
}

/// Half-open in-plane range of a box with half-width `r` along one axis.
fn box_span<R: Rng>(rng: &mut R, extent: usize, r: usize) -> (usize, usize) {
    if r.saturating_mul(2).saturating_add(1) <= extent {
        let c = rng.gen_range(r..extent - r);
        (c - r, c + r + 1)
    } else {
        let c = rng.gen_range(0..extent);
        (c.saturating_sub(r), c.saturating_add(r).saturating_add(1).min(extent))
    }
}
