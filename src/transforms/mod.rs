//! Augmentation transforms.
//!
//! Shape-changing transforms ([`elastic`], [`geometric`]) all resample through
//! [`resample`], so images and labels share one boundary policy. Pixelwise
//! [`filters`] touch image intensities only.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub mod elastic;
pub mod field;
pub mod filters;
pub mod geometric;
pub mod resample;

pub use elastic::{elastic_warp, warp_example};
pub use field::{DisplacementField, MAX_DISPLACEMENT};
pub use filters::{blur, box_occlude, circle, gaussian_noise, missing_section, sin};
pub use geometric::{
    flip, misalign, random_flip, random_misalign, random_rescale, random_rotate, random_rotate90,
    rescale, rotate, rotate90, ExamplePair, MisalignKind,
};
pub use resample::{
    resample_example, resample_image, resample_labels, CoordinateMap, FillPolicy,
};

/// Random number generator with optional seeding for reproducibility.
#[allow(clippy::option_if_let_else)] // match is clearer than map_or_else here
pub(crate) fn get_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}
