//! Optical system facade
//!
//! [`FraunhoferOptics`] owns the configuration, the grid plan derived from it
//! and the incident light field sampled on that plan. Everything that needs
//! the geometry (mask meshes, source filtering by field of view, power
//! budgets) goes through here so the plan is computed exactly once.

use log::info;
use ndarray::{Array3, Axis};
use num_complex::Complex64;
use rand::Rng;

use super::config::OpticalSystemConfig;
use super::diffraction;
use super::energy::{diffracted_spectral_power, incident_spectral_power, PowerBudget};
use super::error::OpticsError;
use super::grid::{plan, GridPlan};
use crate::field::light_field::{ExtendedSource, FieldStage, IncidentLightField, PointSource};
use crate::field::mask::TransmissionMask;

/// A telescope imaging plane waves onto its focal plane.
#[derive(Debug, Clone)]
pub struct FraunhoferOptics {
    config: OpticalSystemConfig,
    plan: GridPlan,
    light_field: IncidentLightField,
}

impl FraunhoferOptics {
    /// Plan the grids for `config` and start with an empty incident field.
    ///
    /// # Errors
    /// Whatever [`plan`] rejects, most notably
    /// [`OpticsError::ApertureExceedsGrid`].
    pub fn new(config: OpticalSystemConfig) -> Result<Self, OpticsError> {
        let plan = plan(&config)?;
        let coordinates = plan.aperture().cropped_coordinates().to_owned();
        let light_field =
            IncidentLightField::new(coordinates.clone(), coordinates, config.wavelengths.clone());

        info!(
            "Optical system D={:.3} m f={:.3} m: {} wavelengths, {} grid cells, {} aperture cells",
            config.aperture_diameter,
            config.focal_length,
            config.n_wavelengths(),
            plan.aperture().n_grid_cells,
            plan.aperture().footprint.n_cells,
        );

        Ok(Self {
            config,
            plan,
            light_field,
        })
    }

    /// Rebuild an optical system around an existing light field, e.g. one
    /// restored from an archive.
    ///
    /// # Errors
    /// [`OpticsError::FieldShapeMismatch`] if the pure field, the transmission
    /// mask or the modulation do not have the planned field shape, and
    /// [`OpticsError::InvalidParameter`] if the stored wavelengths or
    /// normalized coordinates differ from the replayed plan.
    pub fn with_light_field(
        config: OpticalSystemConfig,
        light_field: IncidentLightField,
    ) -> Result<Self, OpticsError> {
        let mut optics = Self::new(config)?;
        let coordinates = optics.plan.aperture().cropped_coordinates();
        light_field.check_grid(optics.plan.wavelengths(), coordinates, coordinates)?;
        optics.light_field = light_field;
        Ok(optics)
    }

    pub fn config(&self) -> &OpticalSystemConfig {
        &self.config
    }

    pub fn plan(&self) -> &GridPlan {
        &self.plan
    }

    pub fn light_field(&self) -> &IncidentLightField {
        &self.light_field
    }

    pub fn light_field_mut(&mut self) -> &mut IncidentLightField {
        &mut self.light_field
    }

    pub fn wavelengths(&self) -> &[f64] {
        self.plan.wavelengths()
    }

    pub fn set_incident_field_values(&mut self, values: Array3<Complex64>) -> Result<(), OpticsError> {
        self.light_field.set(values)
    }

    pub fn modulate_incident_light_field(
        &mut self,
        modulation: Array3<Complex64>,
    ) -> Result<(), OpticsError> {
        self.light_field.modulate(modulation)
    }

    /// Add point sources, dropping those outside the configured field of view
    pub fn add_point_sources(&mut self, sources: &[PointSource]) -> Result<usize, OpticsError> {
        self.light_field.add_point_sources(
            sources,
            self.config.field_of_view_x,
            self.config.field_of_view_y,
        )
    }

    pub fn add_extended_source<R: Rng + ?Sized>(
        &mut self,
        source: &ExtendedSource,
        rng: &mut R,
    ) -> Result<usize, OpticsError> {
        self.light_field.add_extended_source(
            source,
            self.config.field_of_view_x,
            self.config.field_of_view_y,
            rng,
        )
    }

    /// Physical aperture coordinates in metres, shape `(wavelengths, y, x)`.
    ///
    /// `x[w, iy, ix] = λ_w · u[ix]` and `y[w, iy, ix] = λ_w · u[iy]`.
    pub fn aperture_coordinate_meshes(&self) -> (Array3<f64>, Array3<f64>) {
        let u = self.plan.aperture().cropped_coordinates();
        let wavelengths = self.plan.wavelengths();
        let shape = self.plan.field_shape();

        let x = Array3::from_shape_fn(shape, |(w, _, ix)| wavelengths[w] * u[ix]);
        let y = Array3::from_shape_fn(shape, |(w, iy, _)| wavelengths[w] * u[iy]);
        (x, y)
    }

    /// Evaluate `mask` on the aperture meshes and install it on the light field
    pub fn apply_transmission_mask<M: TransmissionMask + ?Sized>(
        &mut self,
        mask: &M,
    ) -> Result<(), OpticsError> {
        let (x, y) = self.aperture_coordinate_meshes();
        self.light_field.apply_transmission_mask(mask.transmission(&x, &y))
    }

    /// Focal plane spectral flux inside the field of view window
    pub fn compute_image_fluxes(&self, stage: FieldStage) -> Result<Array3<f64>, OpticsError> {
        diffraction::transform(self.light_field.get(stage).view(), &self.plan)
    }

    /// Focal plane spectral flux over the whole shared grid
    pub fn compute_full_image_fluxes(&self, stage: FieldStage) -> Result<Array3<f64>, OpticsError> {
        diffraction::transform_full(self.light_field.get(stage).view(), &self.plan)
    }

    /// Incident power versus power landing inside the field of view window
    pub fn power_budget(
        &self,
        stage: FieldStage,
        wavelength_idx: usize,
    ) -> Result<PowerBudget, OpticsError> {
        let count = self.plan.n_wavelengths();
        if wavelength_idx >= count {
            return Err(OpticsError::UnknownWavelength {
                index: wavelength_idx,
                count,
            });
        }

        let field = self.light_field.get(stage);
        let fluxes = diffraction::transform(field.view(), &self.plan)?;
        let wavelength = self.plan.wavelengths()[wavelength_idx];

        let budget = PowerBudget {
            wavelength,
            incident: incident_spectral_power(
                field.index_axis(Axis(0), wavelength_idx),
                self.plan.aperture().normalized_cell_extent,
                wavelength,
            ),
            diffracted: diffracted_spectral_power(
                fluxes.index_axis(Axis(0), wavelength_idx),
                self.plan.image().cell_extent,
            ),
        };
        info!(
            "Power at {:.1} nm: incident {:.6e} W/m, diffracted {:.6e} W/m, loss {:.3e}",
            wavelength * 1e9,
            budget.incident,
            budget.diffracted,
            budget.relative_loss()
        );
        Ok(budget)
    }

    /// Index of the configured wavelength nearest to `wavelength`
    pub fn closest_wavelength_index(&self, wavelength: f64) -> usize {
        self.plan
            .wavelengths()
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(best, best_dist), (idx, &w)| {
                let dist = (w - wavelength).abs();
                if dist < best_dist {
                    (idx, dist)
                } else {
                    (best, best_dist)
                }
            })
            .0
    }

    /// Angular radius of the first Airy dark ring, `1.22 λ / D` radians
    pub fn rayleigh_limit(&self, wavelength: f64) -> f64 {
        1.22 * wavelength / self.config.aperture_diameter
    }
}
