//! Spectral power bookkeeping between the aperture and image planes
//!
//! Not used to compute fluxes, but exposes the two power integrals needed to
//! verify that the diffraction transform conserves energy.

use ndarray::ArrayView2;
use num_complex::Complex64;

/// Spectral power entering the aperture, in W/m.
///
/// `Σ |E|² · (extent · λ)²`, where `(extent · λ)²` is the physical area of one
/// aperture cell at this wavelength.
pub fn incident_spectral_power(
    field: ArrayView2<'_, Complex64>,
    normalized_cell_extent: f64,
    wavelength: f64,
) -> f64 {
    let cell_area = (normalized_cell_extent * wavelength).powi(2);
    field.iter().map(|e| e.norm_sqr()).sum::<f64>() * cell_area
}

/// Spectral power arriving in the image plane, in W/m.
///
/// `Σ flux · spacing²` over whatever part of the image grid is passed in.
pub fn diffracted_spectral_power(flux: ArrayView2<'_, f64>, image_cell_extent: f64) -> f64 {
    flux.sum() * image_cell_extent * image_cell_extent
}

/// Incident and diffracted spectral power at one wavelength
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerBudget {
    pub wavelength: f64,
    pub incident: f64,
    pub diffracted: f64,
}

impl PowerBudget {
    /// Fraction of the incident power missing from the image, `1 - diffracted / incident`
    pub fn relative_loss(&self) -> f64 {
        1.0 - self.diffracted / self.incident
    }

    /// Magnitude of [`Self::relative_loss`]
    pub fn relative_discrepancy(&self) -> f64 {
        self.relative_loss().abs()
    }
}
