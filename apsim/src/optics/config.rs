//! Optical system configuration
//!
//! Describes the physical telescope (aperture and focal length) together with
//! the imaging requirements (field of view and angular resolution) and the
//! wavelengths to simulate. Everything is in SI units: metres and radians.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

use super::error::OpticsError;
use crate::units::{Angle, AngleExt, Length, LengthExt};

/// Physical and sampling parameters of a Fraunhofer imaging system.
///
/// # Examples
///
/// ```rust
/// use apsim::optics::config::OpticalSystemConfig;
/// use apsim::units::{Angle, AngleExt, Length, LengthExt};
///
/// let config = OpticalSystemConfig::from_quantities(
///     Length::from_millimeters(150.0),
///     Length::from_millimeters(750.0), // f/5
///     Angle::from_arcseconds(10.0),
///     Angle::from_arcseconds(10.0),
///     Angle::from_arcseconds(0.1),
///     &[Length::from_nanometers(700.0)],
/// )
/// .unwrap();
/// assert!((config.min_wavelength() - 700e-9).abs() < 1e-18);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticalSystemConfig {
    /// Clear aperture diameter in metres
    pub aperture_diameter: f64,
    /// Effective focal length in metres
    pub focal_length: f64,
    /// Field of view covered by the image along x, in radians
    pub field_of_view_x: f64,
    /// Field of view covered by the image along y, in radians
    pub field_of_view_y: f64,
    /// Largest angle one image cell may subtend, in radians
    pub max_angular_coarseness: f64,
    /// Wavelengths to simulate in metres, in output order
    pub wavelengths: Vec<f64>,
}

impl OpticalSystemConfig {
    /// Create a configuration, rejecting degenerate values up front
    pub fn new(
        aperture_diameter: f64,
        focal_length: f64,
        field_of_view_x: f64,
        field_of_view_y: f64,
        max_angular_coarseness: f64,
        wavelengths: Vec<f64>,
    ) -> Result<Self, OpticsError> {
        let config = Self {
            aperture_diameter,
            focal_length,
            field_of_view_x,
            field_of_view_y,
            max_angular_coarseness,
            wavelengths,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration from typed quantities, e.g. values parsed in
    /// arcseconds and nanometres. They are stored as metres and radians.
    pub fn from_quantities(
        aperture_diameter: Length,
        focal_length: Length,
        field_of_view_x: Angle,
        field_of_view_y: Angle,
        max_angular_coarseness: Angle,
        wavelengths: &[Length],
    ) -> Result<Self, OpticsError> {
        Self::new(
            aperture_diameter.as_meters(),
            focal_length.as_meters(),
            field_of_view_x.as_radians(),
            field_of_view_y.as_radians(),
            max_angular_coarseness.as_radians(),
            wavelengths.iter().map(|w| w.as_meters()).collect(),
        )
    }

    /// Check every parameter for values that would turn into NaN or Inf downstream
    pub fn validate(&self) -> Result<(), OpticsError> {
        require_positive("aperture_diameter", self.aperture_diameter)?;
        require_positive("focal_length", self.focal_length)?;
        require_positive("max_angular_coarseness", self.max_angular_coarseness)?;
        require_field_of_view("field_of_view_x", self.field_of_view_x)?;
        require_field_of_view("field_of_view_y", self.field_of_view_y)?;

        if self.wavelengths.is_empty() {
            return Err(OpticsError::NoWavelengths);
        }
        for &wavelength in &self.wavelengths {
            require_positive("wavelength", wavelength)?;
        }
        Ok(())
    }

    /// The larger of the two fields of view; it decides the aperture grid resolution
    pub fn max_field_of_view(&self) -> f64 {
        self.field_of_view_x.max(self.field_of_view_y)
    }

    /// Shortest wavelength, which has the largest aperture in normalized units
    pub fn min_wavelength(&self) -> f64 {
        self.wavelengths.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn n_wavelengths(&self) -> usize {
        self.wavelengths.len()
    }

    /// Load a configuration from a JSON file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, OpticsError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save_to_file(&self, path: &Path) -> Result<(), OpticsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn require_positive(name: &'static str, value: f64) -> Result<(), OpticsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(OpticsError::InvalidParameter { name, value })
    }
}

// tan(fov/2) must stay finite and positive
fn require_field_of_view(name: &'static str, value: f64) -> Result<(), OpticsError> {
    if value.is_finite() && value > 0.0 && value < PI {
        Ok(())
    } else {
        Err(OpticsError::InvalidParameter { name, value })
    }
}
