//! # volaug
//!
//! On-the-fly augmentation of volumetric training examples for segmentation.
//!
//! An example is an image volume `(z, y, x, channel)` plus any number of label
//! volumes on the same spatial grid. An [`Augmentor`] applies a configured
//! sequence of geometric and intensity transforms to it; geometric stages
//! move image and labels together, so correspondence survives every shape
//! change.
//!
//! ```
//! use ndarray::Array4;
//! use serde_json::json;
//! use volaug::{Augmentor, FillPolicy};
//!
//! let augmentor = Augmentor::from_value(&json!({
//!     "elastic_warp": { "enabled": true, "n": 6, "sigma": 3.0 },
//!     "rotate90": true,
//!     "noise": { "enabled": true, "sigma": 0.02 },
//! }))
//! .unwrap()
//! .with_fill_policy(FillPolicy::Clamp)
//! .with_seed(42);
//!
//! let image = Array4::<f32>::zeros((4, 32, 32, 1));
//! let image = augmentor.augment_image(image.view()).unwrap();
//! assert_eq!(image.dim().0, 4);
//! ```

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod transforms;
pub mod volume;

#[cfg(feature = "python")]
pub mod python;

pub use config::{AugmentConfig, Stage, StageKind, AUGMENTATIONS};
pub use error::{Error, Result};
pub use pipeline::{Augmented, Augmentor};
pub use transforms::{DisplacementField, FillPolicy};
pub use volume::{Intensity, Label};
