//! The augmentation pipeline.
//!
//! An [`Augmentor`] owns a normalized configuration and applies its enabled
//! stages, in canonical order, to a private copy of each example it is given.

use ndarray::{Array4, ArrayView4};
use rand::Rng;
use serde_json::Value;
use tracing::debug;

use crate::config::{AugmentConfig, Stage};
use crate::error::{Error, Result};
use crate::transforms::{
    self, elastic_warp, filters, random_flip, random_misalign, random_rescale, random_rotate,
    random_rotate90, FillPolicy,
};
use crate::volume::{
    ensure_matching_labels, ensure_non_empty, into_standard_layout, spatial_shape, to_f32_image,
    Intensity, Label,
};

/// Result of one augmentation call.
///
/// Mirrors what the caller supplied: an image alone, or an image with labels.
#[derive(Debug, Clone, PartialEq)]
pub enum Augmented<L> {
    Image(Array4<f32>),
    Example {
        image: Array4<f32>,
        labels: Vec<Array4<L>>,
    },
}

impl<L> Augmented<L> {
    pub fn image(&self) -> &Array4<f32> {
        match self {
            Self::Image(image) | Self::Example { image, .. } => image,
        }
    }

    /// Augmented labels; empty when none were supplied.
    pub fn labels(&self) -> &[Array4<L>] {
        match self {
            Self::Image(_) => &[],
            Self::Example { labels, .. } => labels,
        }
    }

    pub fn into_image(self) -> Array4<f32> {
        match self {
            Self::Image(image) | Self::Example { image, .. } => image,
        }
    }

    pub fn into_parts(self) -> (Array4<f32>, Vec<Array4<L>>) {
        match self {
            Self::Image(image) => (image, Vec::new()),
            Self::Example { image, labels } => (image, labels),
        }
    }
}

/// Applies a fixed sequence of augmentations to training examples.
///
/// The configuration cannot change after construction, so one instance can
/// be shared between threads.
///
/// # Example
///
/// ```
/// use ndarray::Array4;
/// use serde_json::json;
/// use volaug::Augmentor;
///
/// let augmentor = Augmentor::from_value(&json!({ "rotate90": true, "flip": true }))
///     .unwrap()
///     .with_seed(7);
///
/// let image = Array4::<u8>::zeros((4, 32, 32, 1));
/// let labels = Array4::<u32>::zeros((4, 32, 32, 1));
/// let (image, labels) = augmentor
///     .augment(image.view(), &[labels.view()])
///     .unwrap()
///     .into_parts();
/// assert_eq!(image.dim().0, 4);
/// assert_eq!(labels.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Augmentor {
    config: AugmentConfig,
    fill_policy: FillPolicy,
    seed: Option<u64>,
}

impl Augmentor {
    pub fn new(config: AugmentConfig) -> Self {
        let names: Vec<&str> = config.stages().iter().map(Stage::name).collect();
        debug!(stages = ?names, "augmentor configured");
        Self {
            config,
            fill_policy: FillPolicy::default(),
            seed: None,
        }
    }

    /// Normalize a raw configuration mapping and build an augmentor from it.
    pub fn from_value(raw: &Value) -> Result<Self> {
        Ok(Self::new(AugmentConfig::normalize(raw)?))
    }

    /// Pin the random seed so every call is reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set how shape-changing stages resolve out-of-volume samples.
    #[must_use]
    pub fn with_fill_policy(mut self, policy: FillPolicy) -> Self {
        self.fill_policy = policy;
        self
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    pub fn fill_policy(&self) -> FillPolicy {
        self.fill_policy
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Augment an image and its labels.
    ///
    /// Inputs are copied on entry and never modified. Returns
    /// [`Augmented::Image`] when `labels` is empty and [`Augmented::Example`]
    /// otherwise. The output image is always `f32`.
    pub fn augment<A, L>(
        &self,
        image: ArrayView4<'_, A>,
        labels: &[ArrayView4<'_, L>],
    ) -> Result<Augmented<L>>
    where
        A: Intensity,
        L: Label,
    {
        self.augment_seeded(image, labels, self.seed)
    }

    /// Augment an image alone.
    pub fn augment_image<A: Intensity>(&self, image: ArrayView4<'_, A>) -> Result<Array4<f32>> {
        Ok(self.augment::<A, u8>(image, &[])?.into_image())
    }

    /// Like [`augment`](Self::augment), with an explicit seed for this call.
    pub fn augment_seeded<A, L>(
        &self,
        image: ArrayView4<'_, A>,
        labels: &[ArrayView4<'_, L>],
        seed: Option<u64>,
    ) -> Result<Augmented<L>>
    where
        A: Intensity,
        L: Label,
    {
        ensure_non_empty(&image, "image")?;
        ensure_matching_labels(&image, labels)?;
        for label in labels {
            ensure_non_empty(label, "label volume")?;
        }

        let mut image = to_f32_image(image);
        let mut work: Vec<Array4<L>> = labels.iter().map(|label| label.to_owned()).collect();
        let mut rng = transforms::get_rng(seed);

        for stage in self.config.stages() {
            let stage_seed: u64 = rng.gen();
            let before = spatial_shape(&image);
            (image, work) = self.apply_stage(stage, image, work, stage_seed)?;
            debug!(
                stage = stage.name(),
                ?before,
                after = ?spatial_shape(&image),
                "applied stage"
            );
            debug_assert!(ensure_matching_labels(&image, &work).is_ok());
        }

        let image = into_standard_layout(image);
        if labels.is_empty() {
            Ok(Augmented::Image(image))
        } else {
            Ok(Augmented::Example {
                image,
                labels: work,
            })
        }
    }

    fn apply_stage<L: Label>(
        &self,
        stage: &Stage,
        image: Array4<f32>,
        labels: Vec<Array4<L>>,
        seed: u64,
    ) -> Result<(Array4<f32>, Vec<Array4<L>>)> {
        let policy = self.fill_policy;
        let seed = Some(seed);
        match stage {
            Stage::ElasticWarp(p) => elastic_warp(&image, &labels, p.n, p.sigma, policy, seed),
            Stage::Flip => random_flip(&image, &labels, seed),
            Stage::Rotate(p) => random_rotate(&image, &labels, p.max_angle, policy, seed),
            Stage::Rotate90 => random_rotate90(&image, &labels, policy, seed),
            Stage::Blur(p) => Ok((filters::blur(image, p.sigma, p.prob, seed), labels)),
            Stage::Misalign(p) => random_misalign(
                &image,
                &labels,
                p.prob,
                p.delta,
                p.kind,
                p.label_shift,
                seed,
            ),
            Stage::MissingSection(p) => Ok((filters::missing_section(image, p.prob, seed), labels)),
            Stage::Rescale(p) => {
                random_rescale(&image, &labels, p.min, p.max, p.per_axis, policy, seed)
            }
            Stage::Circle(p) => Ok((filters::circle(image, p.prob, p.radius, seed), labels)),
            Stage::Grey => Err(Error::unimplemented("grey")),
            Stage::Noise(p) => Ok((filters::gaussian_noise(image, p.sigma, seed)?, labels)),
            Stage::Sin(p) => Ok((filters::sin(image, p.a, p.f, seed), labels)),
            Stage::Box(p) => Ok((
                filters::box_occlude(image, p.n, p.r, p.z, p.fill, seed),
                labels,
            )),
        }
    }
}
