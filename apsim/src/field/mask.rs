//! Aperture transmission masks
//!
//! A mask decides, for every aperture grid cell at every wavelength, whether
//! light passes. It receives physical coordinate meshes in metres with shape
//! `(wavelengths, y, x)`; the meshes differ per wavelength because the grid
//! is normalized by wavelength.
//!
//! Built-in shapes cover the usual telescope pupils. Any closure
//! `Fn(&Array3<f64>, &Array3<f64>) -> Array3<bool>` is also a mask.

use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};

/// Acceptance function over aperture coordinates
pub trait TransmissionMask {
    /// Return `true` where the field passes and `false` where it is blocked.
    ///
    /// The returned array must have the same shape as `x` and `y`.
    fn transmission(&self, x: &Array3<f64>, y: &Array3<f64>) -> Array3<bool>;
}

impl<F> TransmissionMask for F
where
    F: Fn(&Array3<f64>, &Array3<f64>) -> Array3<bool>,
{
    fn transmission(&self, x: &Array3<f64>, y: &Array3<f64>) -> Array3<bool> {
        self(x, y)
    }
}

fn pointwise(x: &Array3<f64>, y: &Array3<f64>, passes: impl Fn(f64, f64) -> bool) -> Array3<bool> {
    Zip::from(x).and(y).map_collect(|&x, &y| passes(x, y))
}

/// Unobstructed circular pupil
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circular {
    /// Diameter in metres
    pub diameter: f64,
}

impl TransmissionMask for Circular {
    fn transmission(&self, x: &Array3<f64>, y: &Array3<f64>) -> Array3<bool> {
        let radius = 0.5 * self.diameter;
        pointwise(x, y, |x, y| x.hypot(y) <= radius)
    }
}

/// Circular pupil with a central obstruction (secondary mirror)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annular {
    pub outer_diameter: f64,
    pub inner_diameter: f64,
}

impl TransmissionMask for Annular {
    fn transmission(&self, x: &Array3<f64>, y: &Array3<f64>) -> Array3<bool> {
        let outer = 0.5 * self.outer_diameter;
        let inner = 0.5 * self.inner_diameter;
        pointwise(x, y, |x, y| {
            let r = x.hypot(y);
            r <= outer && r >= inner
        })
    }
}

/// Annular pupil crossed by two orthogonal spider vanes along the x and y axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpiderVaned {
    pub outer_diameter: f64,
    pub inner_diameter: f64,
    /// Full width of each vane in metres
    pub vane_width: f64,
}

impl TransmissionMask for SpiderVaned {
    fn transmission(&self, x: &Array3<f64>, y: &Array3<f64>) -> Array3<bool> {
        let outer = 0.5 * self.outer_diameter;
        let inner = 0.5 * self.inner_diameter;
        let half_vane = 0.5 * self.vane_width;
        pointwise(x, y, |x, y| {
            let r = x.hypot(y);
            r <= outer && r >= inner && x.abs() >= half_vane && y.abs() >= half_vane
        })
    }
}
