//! Error types for optical system construction and diffraction

use thiserror::Error;

/// Errors raised while planning grids, transforming fields or persisting results
#[derive(Error, Debug)]
pub enum OpticsError {
    /// The aperture footprint at the shortest wavelength does not fit in the shared grid
    #[error(
        "aperture needs {aperture_cells} grid cells at wavelength {wavelength:e} m \
         but the shared grid only has {grid_cells}; relax the field of view or angular coarseness"
    )]
    ApertureExceedsGrid {
        wavelength: f64,
        aperture_cells: usize,
        grid_cells: usize,
    },

    /// A scalar configuration value is zero, negative, non-finite or out of range
    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("at least one wavelength is required")]
    NoWavelengths,

    /// An array handed to the optics does not match the planned aperture footprint
    #[error("array shape {actual:?} does not match expected shape {expected:?}")]
    FieldShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("wavelength index {index} out of range for {count} wavelengths")]
    UnknownWavelength { index: usize, count: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OpticsError {
    pub(crate) fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        OpticsError::FieldShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
