//! Geometric resampling shared by every shape-changing transform.
//!
//! A transform describes itself as an inverse mapping from output voxel to
//! source coordinate. The boundary decision for that coordinate is made once,
//! here, so images and labels always agree on which voxels are filled.
//! Images are then interpolated trilinearly; labels are looked up by nearest
//! neighbour and never blended.

use ndarray::{Array4, ArrayView4};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::volume::{spatial_shape, Label};

/// Tolerance for treating a coordinate on the volume edge as in bounds.
const BOUNDARY_EPS: f64 = 1e-6;

/// How source coordinates outside the volume are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FillPolicy {
    /// Clamp the coordinate to the nearest edge voxel.
    #[default]
    Clamp,
    /// Write a constant: the given value for images, `L::default()` for labels.
    Constant(f32),
}

/// Inverse mapping from an output voxel `(z, y, x)` to a source coordinate.
pub trait CoordinateMap: Sync {
    fn source(&self, out: [usize; 3]) -> [f64; 3];
}

impl<F> CoordinateMap for F
where
    F: Fn([usize; 3]) -> [f64; 3] + Sync,
{
    #[inline]
    fn source(&self, out: [usize; 3]) -> [f64; 3] {
        self(out)
    }
}

/// Resolve a source coordinate against the volume extent.
///
/// Returns `None` when the voxel must take the constant fill value.
#[inline]
fn resolve(coord: [f64; 3], extent: [usize; 3], policy: FillPolicy) -> Option<[f64; 3]> {
    let mut resolved = coord;
    for axis in 0..3 {
        #[allow(clippy::cast_precision_loss)]
        let hi = (extent[axis] - 1) as f64;
        let c = coord[axis];
        let inside = c >= -BOUNDARY_EPS && c <= hi + BOUNDARY_EPS;
        if !inside && matches!(policy, FillPolicy::Constant(_)) {
            return None;
        }
        resolved[axis] = if c.is_nan() { 0.0 } else { c.clamp(0.0, hi) };
    }
    Some(resolved)
}

/// Trilinear lookup of every channel at an in-bounds coordinate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample_trilinear(volume: &ArrayView4<'_, f32>, coord: [f64; 3], out: &mut [f32]) {
    let [d, h, w] = spatial_shape(volume);
    let extent = [d, h, w];

    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut frac = [0f64; 3];
    for axis in 0..3 {
        let floor = coord[axis].floor();
        lo[axis] = floor as usize;
        hi[axis] = (lo[axis] + 1).min(extent[axis] - 1);
        frac[axis] = coord[axis] - floor;
    }

    for (ch, value) in out.iter_mut().enumerate() {
        let mut acc = 0f64;
        for corner in 0..8 {
            let mut weight = 1f64;
            let mut idx = [0usize; 3];
            for axis in 0..3 {
                if corner & (1 << axis) == 0 {
                    weight *= 1.0 - frac[axis];
                    idx[axis] = lo[axis];
                } else {
                    weight *= frac[axis];
                    idx[axis] = hi[axis];
                }
            }
            // Zero weights are skipped so integer coordinates reproduce
            // the source value exactly.
            if weight == 0.0 {
                continue;
            }
            acc += weight * f64::from(volume[[idx[0], idx[1], idx[2], ch]]);
        }
        *value = acc as f32;
    }
}

/// Nearest-neighbour lookup of every channel at an in-bounds coordinate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample_nearest<L: Copy>(volume: &ArrayView4<'_, L>, coord: [f64; 3], out: &mut [L]) {
    let [d, h, w] = spatial_shape(volume);
    let z = (coord[0].round() as usize).min(d - 1);
    let y = (coord[1].round() as usize).min(h - 1);
    let x = (coord[2].round() as usize).min(w - 1);
    for (ch, value) in out.iter_mut().enumerate() {
        *value = volume[[z, y, x, ch]];
    }
}

/// Core resampling loop, parallel over output z-slices.
fn resample_with<T, M, S>(
    volume: ArrayView4<'_, T>,
    out_shape: [usize; 3],
    map: &M,
    policy: FillPolicy,
    fill: T,
    sample: S,
) -> Result<Array4<T>>
where
    T: Copy + Send + Sync,
    M: CoordinateMap + ?Sized,
    S: Fn(&ArrayView4<'_, T>, [f64; 3], &mut [T]) + Sync,
{
    if volume.is_empty() {
        return Err(Error::invalid_dimensions(format!(
            "cannot resample an empty volume (shape {:?})",
            volume.shape()
        )));
    }
    if out_shape.contains(&0) {
        return Err(Error::invalid_dimensions(format!(
            "resampled shape must be non-empty (got {:?})",
            out_shape
        )));
    }

    let extent = spatial_shape(&volume);
    let channels = volume.dim().3;
    let [d, h, w] = out_shape;
    let (slice_len, total) = h
        .checked_mul(w)
        .and_then(|n| n.checked_mul(channels))
        .and_then(|slice| Some((slice, slice.checked_mul(d)?)))
        .ok_or_else(|| {
            Error::invalid_dimensions(format!(
                "resampled shape {:?} with {} channels is too large",
                out_shape, channels
            ))
        })?;

    let mut output = Vec::new();
    output.try_reserve_exact(total).map_err(|e| {
        Error::MemoryAllocation(format!(
            "Failed to allocate output for shape {:?}: {}",
            out_shape, e
        ))
    })?;
    output.resize(total, fill);
    output
        .par_chunks_mut(slice_len)
        .enumerate()
        .for_each(|(z, slice)| {
            for y in 0..h {
                for x in 0..w {
                    let start = (y * w + x) * channels;
                    let voxel = &mut slice[start..start + channels];
                    if let Some(src) = resolve(map.source([z, y, x]), extent, policy) {
                        sample(&volume, src, voxel);
                    }
                }
            }
        });

    Ok(Array4::from_shape_vec((d, h, w, channels), output)?)
}

/// Resample an image through `map`, interpolating trilinearly.
pub fn resample_image<M>(
    image: ArrayView4<'_, f32>,
    out_shape: [usize; 3],
    map: &M,
    policy: FillPolicy,
) -> Result<Array4<f32>>
where
    M: CoordinateMap + ?Sized,
{
    let fill = match policy {
        FillPolicy::Clamp => 0.0,
        FillPolicy::Constant(value) => value,
    };
    resample_with(image, out_shape, map, policy, fill, sample_trilinear)
}

/// Resample a label volume through `map`, by nearest neighbour only.
pub fn resample_labels<L, M>(
    labels: ArrayView4<'_, L>,
    out_shape: [usize; 3],
    map: &M,
    policy: FillPolicy,
) -> Result<Array4<L>>
where
    L: Label,
    M: CoordinateMap + ?Sized,
{
    resample_with(labels, out_shape, map, policy, L::default(), sample_nearest)
}

/// Resample an image and all its label volumes through the same mapping.
pub fn resample_example<L, M>(
    image: ArrayView4<'_, f32>,
    labels: &[Array4<L>],
    out_shape: [usize; 3],
    map: &M,
    policy: FillPolicy,
) -> Result<(Array4<f32>, Vec<Array4<L>>)>
where
    L: Label,
    M: CoordinateMap + ?Sized,
{
    let image = resample_image(image, out_shape, map, policy)?;
    let labels = labels
        .iter()
        .map(|label| resample_labels(label.view(), out_shape, map, policy))
        .collect::<Result<Vec<_>>>()?;
    Ok((image, labels))
}
