//! Python module definition.

use pyo3::prelude::*;

use super::augmentation;

#[pymodule]
fn _volaug(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<augmentation::PyAugmentor>()?;
    m.add("AUGMENTATIONS", crate::config::AUGMENTATIONS.to_vec())?;
    Ok(())
}
