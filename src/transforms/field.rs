//! Smooth random displacement fields.

use ndarray::{Array4, ArrayViewMut, Axis, Dimension};
use rand::Rng;
use tracing::trace;

use super::get_rng;
use super::resample::CoordinateMap;
use crate::error::{Error, Result};

/// Largest displacement, in voxels, of any point of a generated field.
pub const MAX_DISPLACEMENT: f64 = 2.0;

/// Normalized 1D Gaussian kernel with radius `ceil(3 * sigma)`, capped at
/// `max_radius`.
///
/// Taps further than the longest lane from its centre only ever read the
/// clamped edge value, so `max_radius` is the longest lane the kernel is
/// applied to.
pub(crate) fn gaussian_kernel(sigma: f64, max_radius: usize) -> Vec<f64> {
    if sigma <= 0.0 || !sigma.is_finite() {
        return vec![1.0];
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let radius = ((3.0 * sigma).ceil() as usize).min(max_radius);
    let denom = 2.0 * sigma * sigma;

    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let d = i as f64 - radius as f64;
            (-d * d / denom).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Convolve every lane along `axis` with `kernel`, clamping at the edges.
pub(crate) fn smooth_axis<D: Dimension>(
    data: &mut ArrayViewMut<'_, f64, D>,
    axis: Axis,
    kernel: &[f64],
) {
    if kernel.len() <= 1 {
        return;
    }
    #[allow(clippy::cast_possible_wrap)]
    let radius = (kernel.len() / 2) as isize;
    let mut lane_buf = Vec::new();

    for mut lane in data.lanes_mut(axis) {
        lane_buf.clear();
        lane_buf.extend(lane.iter().copied());
        #[allow(clippy::cast_possible_wrap)]
        let last = lane_buf.len() as isize - 1;

        for (i, out) in lane.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (k, &weight) in kernel.iter().enumerate() {
                #[allow(clippy::cast_possible_wrap)]
                let j = (i as isize + k as isize - radius).clamp(0, last);
                #[allow(clippy::cast_sign_loss)]
                let src = lane_buf[j as usize];
                acc += weight * src;
            }
            *out = acc;
        }
    }
}

/// A per-voxel `(dz, dy, dx)` offset over a spatial grid.
///
/// Used as an inverse mapping: output voxel `p` reads from `p + offset(p)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    offsets: Array4<f64>,
}

impl DisplacementField {
    /// The zero field over `shape`.
    pub fn identity(shape: [usize; 3]) -> Self {
        Self {
            offsets: Array4::zeros((shape[0], shape[1], shape[2], 3)),
        }
    }

    /// Build a field from explicit `(z, y, x, 3)` offsets.
    pub fn from_offsets(offsets: Array4<f64>) -> Result<Self> {
        if offsets.dim().3 != 3 {
            return Err(Error::invalid_dimensions(format!(
                "displacement offsets need 3 components, got {}",
                offsets.dim().3
            )));
        }
        Ok(Self { offsets })
    }

    /// Generate a smooth random field.
    ///
    /// For each spatial axis, `n` unit-bounded impulses are dropped at random
    /// voxels and smoothed with a Gaussian whose sigma is drawn from
    /// `[0, max_sigma]`. The result is scaled so the largest displacement
    /// magnitude is exactly [`MAX_DISPLACEMENT`] voxels.
    ///
    /// `n == 0` or `max_sigma == 0` yields the identity field. Without a seed
    /// the field is not reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use volaug::transforms::DisplacementField;
    ///
    /// let field = DisplacementField::generate([4, 32, 32], 8, 4.0, Some(7)).unwrap();
    /// assert!(field.max_magnitude() <= volaug::transforms::MAX_DISPLACEMENT + 1e-9);
    /// ```
    pub fn generate(
        shape: [usize; 3],
        n: usize,
        max_sigma: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        if shape.contains(&0) {
            return Err(Error::invalid_dimensions(format!(
                "displacement field shape must be non-empty (got {:?})",
                shape
            )));
        }
        if !max_sigma.is_finite() || max_sigma < 0.0 {
            return Err(Error::configuration(format!(
                "elastic_warp: sigma must be finite and non-negative (got {})",
                max_sigma
            )));
        }
        if n == 0 || max_sigma == 0.0 {
            return Ok(Self::identity(shape));
        }

        let mut rng = get_rng(seed);
        let sigma = rng.gen_range(0.0..=max_sigma);
        let kernel = gaussian_kernel(sigma, shape.iter().copied().max().unwrap_or(0));

        let mut offsets = Array4::<f64>::zeros((shape[0], shape[1], shape[2], 3));
        for component in 0..3 {
            let mut grid = offsets.index_axis_mut(Axis(3), component);
            for _ in 0..n {
                let p = [
                    rng.gen_range(0..shape[0]),
                    rng.gen_range(0..shape[1]),
                    rng.gen_range(0..shape[2]),
                ];
                grid[p] += rng.gen_range(-1.0..=1.0);
            }
            for axis in 0..3 {
                smooth_axis(&mut grid, Axis(axis), &kernel);
            }
        }

        let mut field = Self { offsets };
        let peak = field.max_magnitude();
        trace!(n, sigma, peak, "generated displacement field");
        if peak <= f64::EPSILON {
            return Ok(Self::identity(shape));
        }
        let scale = MAX_DISPLACEMENT / peak;
        field.offsets.mapv_inplace(|v| v * scale);
        Ok(field)
    }

    /// Spatial `(z, y, x)` extent the field covers.
    pub fn shape(&self) -> [usize; 3] {
        let (z, y, x, _) = self.offsets.dim();
        [z, y, x]
    }

    /// Offset at an output voxel.
    #[inline]
    pub fn offset(&self, p: [usize; 3]) -> [f64; 3] {
        [
            self.offsets[[p[0], p[1], p[2], 0]],
            self.offsets[[p[0], p[1], p[2], 1]],
            self.offsets[[p[0], p[1], p[2], 2]],
        ]
    }

    /// Largest Euclidean displacement over the grid.
    pub fn max_magnitude(&self) -> f64 {
        self.magnitudes().fold(0.0, f64::max)
    }

    /// Whether every offset is zero.
    pub fn is_identity(&self) -> bool {
        self.offsets.iter().all(|&v| v == 0.0)
    }

    fn magnitudes(&self) -> impl Iterator<Item = f64> + '_ {
        self.offsets
            .lanes(Axis(3))
            .into_iter()
            .map(|v| v.iter().map(|c| c * c).sum::<f64>().sqrt())
    }
}

impl CoordinateMap for DisplacementField {
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    fn source(&self, out: [usize; 3]) -> [f64; 3] {
        let offset = self.offset(out);
        [
            out[0] as f64 + offset[0],
            out[1] as f64 + offset[1],
            out[2] as f64 + offset[2],
        ]
    }
}
