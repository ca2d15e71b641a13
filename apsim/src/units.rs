//! Typed physical units at the edges of the optics code
//!
//! Angles and lengths come in from the command line and from config files in
//! arcseconds and nanometres. They are carried as `uom` quantities until they
//! reach [`crate::optics::config::OpticalSystemConfig`], which stores plain SI
//! `f64` (metres and radians) for the numerics.

use uom::si::angle::{degree, radian, second};
use uom::si::length::{meter, micrometer, millimeter, nanometer};

/// Type alias for angles with convenient methods
pub type Angle = uom::si::f64::Angle;

/// Type alias for length measurements with convenient methods
pub type Length = uom::si::f64::Length;

/// Extension trait for angle conversions used on the sky
pub trait AngleExt {
    /// Create angle from arcseconds
    fn from_arcseconds(arcsec: f64) -> Self;

    /// Get angle in arcseconds
    fn as_arcseconds(&self) -> f64;

    fn from_degrees(degrees: f64) -> Self;

    fn as_degrees(&self) -> f64;

    fn from_radians(radians: f64) -> Self;

    fn as_radians(&self) -> f64;
}

/// Extension trait for length conversions used for wavelengths and optics
pub trait LengthExt {
    /// Create length from nanometers (wavelengths)
    fn from_nanometers(nm: f64) -> Self;

    /// Get length in nanometers
    fn as_nanometers(&self) -> f64;

    fn from_micrometers(um: f64) -> Self;

    fn as_micrometers(&self) -> f64;

    /// Create length from millimeters (apertures, obstructions)
    fn from_millimeters(mm: f64) -> Self;

    fn as_millimeters(&self) -> f64;

    fn from_meters(m: f64) -> Self;

    fn as_meters(&self) -> f64;
}

impl AngleExt for Angle {
    fn from_arcseconds(arcsec: f64) -> Self {
        Angle::new::<second>(arcsec)
    }

    fn as_arcseconds(&self) -> f64 {
        self.get::<second>()
    }

    fn from_degrees(degrees: f64) -> Self {
        Angle::new::<degree>(degrees)
    }

    fn as_degrees(&self) -> f64 {
        self.get::<degree>()
    }

    fn from_radians(radians: f64) -> Self {
        Angle::new::<radian>(radians)
    }

    fn as_radians(&self) -> f64 {
        self.get::<radian>()
    }
}

impl LengthExt for Length {
    fn from_nanometers(nm: f64) -> Self {
        Length::new::<nanometer>(nm)
    }

    fn as_nanometers(&self) -> f64 {
        self.get::<nanometer>()
    }

    fn from_micrometers(um: f64) -> Self {
        Length::new::<micrometer>(um)
    }

    fn as_micrometers(&self) -> f64 {
        self.get::<micrometer>()
    }

    fn from_millimeters(mm: f64) -> Self {
        Length::new::<millimeter>(mm)
    }

    fn as_millimeters(&self) -> f64 {
        self.get::<millimeter>()
    }

    fn from_meters(m: f64) -> Self {
        Length::new::<meter>(m)
    }

    fn as_meters(&self) -> f64 {
        self.get::<meter>()
    }
}

/// Arcseconds to radians, for call sites that stay in SI `f64`
pub fn arcsec_to_rad(arcsec: f64) -> f64 {
    Angle::from_arcseconds(arcsec).as_radians()
}

/// Nanometres to metres, for call sites that stay in SI `f64`
pub fn nm_to_m(nm: f64) -> f64 {
    Length::from_nanometers(nm).as_meters()
}
