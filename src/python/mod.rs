//! Python bindings for volaug.

pub mod augmentation;
pub mod conversion;
pub mod module;
pub mod validation;
