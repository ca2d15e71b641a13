//! Incident light field on the aperture grid
//!
//! Light from distant sources arrives as plane waves. On the wavelength
//! normalized aperture grid a plane wave with direction cosines `(sx, sy)` is
//! `A · exp(2πi (sx·u + sy·v))` for every wavelength, where `A` is the square
//! root of the spectral flux at that wavelength.
//!
//! The field is kept in three stages:
//!
//! - **pure**: the sum of all sources
//! - **masked**: pure field with the aperture transmission mask applied
//! - **modulated**: masked field multiplied by the current modulation, e.g. a
//!   turbulence perturbation
//!
//! Only the pure field, the mask and the modulation are stored; the later
//! stages are derived on request so replacing the modulation every frame never
//! compounds.

use log::{debug, info, warn};
use ndarray::{Array1, Array2, Array3, ArrayView1, Axis, Zip};
use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::io::archive::{read_json, write_json};
use crate::optics::error::OpticsError;

/// Which stage of the incident field to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldStage {
    Pure,
    Masked,
    #[default]
    Modulated,
}

impl fmt::Display for FieldStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldStage::Pure => "pure",
            FieldStage::Masked => "masked",
            FieldStage::Modulated => "modulated",
        };
        write!(f, "{name}")
    }
}

impl FromStr for FieldStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pure" => Ok(FieldStage::Pure),
            "masked" => Ok(FieldStage::Masked),
            "modulated" => Ok(FieldStage::Modulated),
            other => Err(format!(
                "unknown field stage '{other}', expected pure, masked or modulated"
            )),
        }
    }
}

/// A point source at infinity, described by its direction of arrival.
///
/// The polar angle is measured from the optical axis, the azimuth from the
/// x axis towards y.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub polar_angle: f64,
    pub azimuth_angle: f64,
    /// Incident spectral flux per wavelength (W/m²/m)
    pub spectral_fluxes: Vec<f64>,
}

impl PointSource {
    pub fn new(polar_angle: f64, azimuth_angle: f64, spectral_fluxes: Vec<f64>) -> Self {
        Self {
            polar_angle,
            azimuth_angle,
            spectral_fluxes,
        }
    }

    /// Source on the optical axis
    pub fn on_axis(spectral_fluxes: Vec<f64>) -> Self {
        Self::new(0.0, 0.0, spectral_fluxes)
    }

    /// Source whose image lands at the given angular image coordinates.
    ///
    /// The angles are those of [`crate::optics::grid::ImageGrid::angular_coordinates`],
    /// i.e. `atan(x_image / f)` along each axis.
    pub fn at_angular_offset(angle_x: f64, angle_y: f64, spectral_fluxes: Vec<f64>) -> Self {
        let tan_x = angle_x.tan();
        let tan_y = angle_y.tan();
        let polar_angle = tan_x.hypot(tan_y).atan();
        let azimuth_angle = tan_y.atan2(tan_x);
        Self::new(polar_angle, azimuth_angle, spectral_fluxes)
    }

    /// Direction cosines `(sx, sy)` of the arriving wave
    pub fn direction_cosines(&self) -> (f64, f64) {
        let sin_polar = self.polar_angle.sin();
        (
            sin_polar * self.azimuth_angle.cos(),
            sin_polar * self.azimuth_angle.sin(),
        )
    }

    /// Angular image coordinates `(atan(sx/sz), atan(sy/sz))` of the source
    pub fn angular_offset(&self) -> (f64, f64) {
        let (sx, sy) = self.direction_cosines();
        let sz = self.polar_angle.cos();
        (sx.atan2(sz), sy.atan2(sz))
    }

    pub fn within_field_of_view(&self, field_of_view_x: f64, field_of_view_y: f64) -> bool {
        let (angle_x, angle_y) = self.angular_offset();
        self.polar_angle < 0.5 * PI
            && angle_x.abs() <= 0.5 * field_of_view_x
            && angle_y.abs() <= 0.5 * field_of_view_y
    }
}

/// A resolved source sampled on a regular angular grid.
///
/// Every sample is added as an independent plane wave with a random phase, so
/// neighbouring samples do not interfere coherently on average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedSource {
    /// Angular x coordinates of the samples (radians)
    pub angular_x: Vec<f64>,
    /// Angular y coordinates of the samples (radians)
    pub angular_y: Vec<f64>,
    /// Spectral flux per sample, shape `(wavelengths, y, x)`
    pub spectral_fluxes: Array3<f64>,
}

/// Complex field on the cropped aperture grid, one slice per wavelength
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentLightField {
    normalized_x_coordinates: Array1<f64>,
    normalized_y_coordinates: Array1<f64>,
    wavelengths: Vec<f64>,
    pure: Array3<Complex64>,
    transmission: Option<Array3<bool>>,
    modulation: Option<Array3<Complex64>>,
}

impl IncidentLightField {
    /// Create an empty (all zero) field on the given normalized coordinates
    pub fn new(
        normalized_x_coordinates: Array1<f64>,
        normalized_y_coordinates: Array1<f64>,
        wavelengths: Vec<f64>,
    ) -> Self {
        let shape = (
            wavelengths.len(),
            normalized_y_coordinates.len(),
            normalized_x_coordinates.len(),
        );
        Self {
            normalized_x_coordinates,
            normalized_y_coordinates,
            wavelengths,
            pure: Array3::zeros(shape),
            transmission: None,
            modulation: None,
        }
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn normalized_x_coordinates(&self) -> &Array1<f64> {
        &self.normalized_x_coordinates
    }

    pub fn normalized_y_coordinates(&self) -> &Array1<f64> {
        &self.normalized_y_coordinates
    }

    /// Shape `(wavelengths, y, x)` of every field array
    pub fn shape(&self) -> (usize, usize, usize) {
        self.pure.dim()
    }

    pub fn transmission_mask(&self) -> Option<&Array3<bool>> {
        self.transmission.as_ref()
    }

    pub fn modulation(&self) -> Option<&Array3<Complex64>> {
        self.modulation.as_ref()
    }

    /// Field values at the requested stage
    pub fn get(&self, stage: FieldStage) -> Array3<Complex64> {
        match stage {
            FieldStage::Pure => self.pure.clone(),
            FieldStage::Masked => self.masked(),
            FieldStage::Modulated => {
                let mut field = self.masked();
                if let Some(modulation) = &self.modulation {
                    field *= modulation;
                }
                field
            }
        }
    }

    fn masked(&self) -> Array3<Complex64> {
        let mut field = self.pure.clone();
        if let Some(transmission) = &self.transmission {
            Zip::from(&mut field)
                .and(transmission)
                .for_each(|value, &passes| {
                    if !passes {
                        *value = Complex64::new(0.0, 0.0);
                    }
                });
        }
        field
    }

    /// Overwrite the pure field
    pub fn set(&mut self, values: Array3<Complex64>) -> Result<(), OpticsError> {
        self.check_shape(values.shape())?;
        self.pure = values;
        Ok(())
    }

    /// Replace the modulation applied on top of the masked field
    pub fn modulate(&mut self, modulation: Array3<Complex64>) -> Result<(), OpticsError> {
        self.check_shape(modulation.shape())?;
        self.modulation = Some(modulation);
        Ok(())
    }

    pub fn clear_modulation(&mut self) {
        self.modulation = None;
    }

    /// Replace the transmission mask; `false` cells are zeroed from the masked stage on
    pub fn apply_transmission_mask(&mut self, transmission: Array3<bool>) -> Result<(), OpticsError> {
        self.check_shape(transmission.shape())?;
        let open = transmission.iter().filter(|&&passes| passes).count();
        debug!(
            "Transmission mask passes {open} of {} aperture cells",
            transmission.len()
        );
        self.transmission = Some(transmission);
        Ok(())
    }

    /// Check that every stored array lives on the given wavelengths and
    /// normalized aperture coordinates.
    ///
    /// Catches fields deserialized from archives written for another grid
    /// before any stage is derived from them.
    pub fn check_grid(
        &self,
        wavelengths: &[f64],
        normalized_x_coordinates: ArrayView1<f64>,
        normalized_y_coordinates: ArrayView1<f64>,
    ) -> Result<(), OpticsError> {
        check_values(
            "wavelength",
            ArrayView1::from(wavelengths),
            ArrayView1::from(self.wavelengths.as_slice()),
        )?;
        check_values(
            "normalized_x_coordinates",
            normalized_x_coordinates,
            self.normalized_x_coordinates.view(),
        )?;
        check_values(
            "normalized_y_coordinates",
            normalized_y_coordinates,
            self.normalized_y_coordinates.view(),
        )?;

        let expected = [
            wavelengths.len(),
            normalized_y_coordinates.len(),
            normalized_x_coordinates.len(),
        ];
        let stored = [
            Some(self.pure.shape()),
            self.transmission.as_ref().map(|t| t.shape()),
            self.modulation.as_ref().map(|m| m.shape()),
        ];
        for shape in stored.into_iter().flatten() {
            if shape != expected {
                return Err(OpticsError::shape_mismatch(&expected, shape));
            }
        }
        Ok(())
    }

    /// Write the raw field arrays to `path` as JSON, gzip compressed if
    /// `compressed` is set
    pub fn save(&self, path: &Path, compressed: bool) -> Result<(), OpticsError> {
        write_json(self, path, compressed)?;
        info!(
            "Saved light field {:?} to {} ({})",
            self.shape(),
            path.display(),
            if compressed { "gzip" } else { "plain" }
        );
        Ok(())
    }

    /// Read a field written by [`IncidentLightField::save`], compressed or not.
    ///
    /// The arrays are checked against the stored coordinates and wavelengths.
    pub fn load(path: &Path) -> Result<Self, OpticsError> {
        let field: Self = read_json(path)?;
        field.check_grid(
            &field.wavelengths,
            field.normalized_x_coordinates.view(),
            field.normalized_y_coordinates.view(),
        )?;
        info!("Loaded light field {:?} from {}", field.shape(), path.display());
        Ok(field)
    }

    /// Add point sources inside the field of view.
    ///
    /// Sources outside the field of view are skipped, since their light would
    /// alias back into the image. Returns the number of sources added.
    pub fn add_point_sources(
        &mut self,
        sources: &[PointSource],
        field_of_view_x: f64,
        field_of_view_y: f64,
    ) -> Result<usize, OpticsError> {
        let mut added = 0;
        for source in sources {
            let amplitudes = self.amplitudes(&source.spectral_fluxes)?;
            if !source.within_field_of_view(field_of_view_x, field_of_view_y) {
                continue;
            }
            self.add_plane_wave(source.direction_cosines(), &amplitudes, 0.0);
            added += 1;
        }

        if added < sources.len() {
            warn!(
                "Skipped {} of {} point sources outside the field of view",
                sources.len() - added,
                sources.len()
            );
        }
        Ok(added)
    }

    /// Add an extended source, one randomly phased plane wave per sample.
    ///
    /// Returns the number of samples added.
    pub fn add_extended_source<R: Rng + ?Sized>(
        &mut self,
        source: &ExtendedSource,
        field_of_view_x: f64,
        field_of_view_y: f64,
        rng: &mut R,
    ) -> Result<usize, OpticsError> {
        let expected = [
            self.wavelengths.len(),
            source.angular_y.len(),
            source.angular_x.len(),
        ];
        if source.spectral_fluxes.shape() != expected {
            return Err(OpticsError::shape_mismatch(
                &expected,
                source.spectral_fluxes.shape(),
            ));
        }

        let mut added = 0;
        for (iy, &angle_y) in source.angular_y.iter().enumerate() {
            for (ix, &angle_x) in source.angular_x.iter().enumerate() {
                let fluxes: Vec<f64> = source
                    .spectral_fluxes
                    .index_axis(Axis(1), iy)
                    .index_axis(Axis(1), ix)
                    .to_vec();
                let sample = PointSource::at_angular_offset(angle_x, angle_y, fluxes);
                let amplitudes = self.amplitudes(&sample.spectral_fluxes)?;

                if amplitudes.iter().all(|&a| a == 0.0)
                    || !sample.within_field_of_view(field_of_view_x, field_of_view_y)
                {
                    continue;
                }

                let phase = rng.gen_range(0.0..TAU);
                self.add_plane_wave(sample.direction_cosines(), &amplitudes, phase);
                added += 1;
            }
        }

        debug!("Added {added} extended source samples");
        Ok(added)
    }

    fn amplitudes(&self, spectral_fluxes: &[f64]) -> Result<Vec<f64>, OpticsError> {
        if spectral_fluxes.len() != self.wavelengths.len() {
            return Err(OpticsError::shape_mismatch(
                &[self.wavelengths.len()],
                &[spectral_fluxes.len()],
            ));
        }
        spectral_fluxes
            .iter()
            .map(|&flux| {
                if flux.is_finite() && flux >= 0.0 {
                    Ok(flux.sqrt())
                } else {
                    Err(OpticsError::InvalidParameter {
                        name: "spectral_flux",
                        value: flux,
                    })
                }
            })
            .collect()
    }

    fn add_plane_wave(&mut self, (sx, sy): (f64, f64), amplitudes: &[f64], phase: f64) {
        let x = &self.normalized_x_coordinates;
        let y = &self.normalized_y_coordinates;
        let wave = Array2::from_shape_fn((y.len(), x.len()), |(iy, ix)| {
            Complex64::from_polar(1.0, TAU * (sx * x[ix] + sy * y[iy]) + phase)
        });

        for (mut slice, &amplitude) in self.pure.axis_iter_mut(Axis(0)).zip(amplitudes) {
            Zip::from(&mut slice)
                .and(&wave)
                .for_each(|value, &w| *value += w * amplitude);
        }
    }

    fn check_shape(&self, actual: &[usize]) -> Result<(), OpticsError> {
        if actual != self.pure.shape() {
            return Err(OpticsError::shape_mismatch(self.pure.shape(), actual));
        }
        Ok(())
    }
}

// Same length, and values equal up to rounding relative to the largest one
fn check_values(
    name: &'static str,
    expected: ArrayView1<f64>,
    stored: ArrayView1<f64>,
) -> Result<(), OpticsError> {
    if expected.len() != stored.len() {
        return Err(OpticsError::shape_mismatch(&[expected.len()], &[stored.len()]));
    }
    let scale = expected.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = 1e-9 * scale;
    // NaN never compares within tolerance
    match expected
        .iter()
        .zip(stored.iter())
        .find(|&(&e, &s)| !((e - s).abs() <= tolerance))
    {
        Some((_, &value)) => Err(OpticsError::InvalidParameter { name, value }),
        None => Ok(()),
    }
}
