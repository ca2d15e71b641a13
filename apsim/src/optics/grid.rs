//! Aperture and image grid planning
//!
//! The aperture grid is expressed in coordinates normalized by wavelength
//! (physical position divided by wavelength). With that choice a single grid
//! resolution produces the same angular sampling in the image plane for every
//! wavelength, so fluxes at different wavelengths can be summed cell by cell
//! without interpolation.
//!
//! # Sizing
//!
//! Two requirements pull against each other:
//!
//! - **Field of view** fixes the normalized cell extent. The image plane
//!   coordinates are Fourier conjugate to the aperture coordinates, so a cell
//!   extent of `1 / (2 tan(FOV/2))` makes the image domain span exactly
//!   `±FOV/2`. The larger of the two fields of view is used for both axes.
//! - **Angular coarseness** fixes the number of cells. The image cell angle
//!   is roughly `1 / (N · extent)`, so `N ≥ 1 / (coarseness · extent)`,
//!   rounded up to a power of two.
//!
//! The aperture itself only covers a centred block of the grid. That block is
//! sized for the shortest wavelength (largest normalized aperture) and reused
//! for every wavelength. The remaining cells are zero padding.

use log::debug;
use ndarray::{s, Array1, ArrayView1};
use std::ops::Range;

use super::config::OpticalSystemConfig;
use super::error::OpticsError;

/// Half-open index window `[start, end)` into a grid axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "index range start {start} exceeds end {end}");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Index of the cell at the middle of the window (rounded down)
    pub fn center(&self) -> usize {
        self.start + self.len() / 2
    }
}

/// Centred block of aperture grid cells that covers the physical aperture
#[derive(Debug, Clone, PartialEq)]
pub struct ApertureFootprint {
    /// Number of cells across the aperture along each axis (always even)
    pub n_cells: usize,
    /// Zero padding cells added on each side to reach the shared grid size
    pub n_pad_cells: usize,
    /// Window of the shared grid occupied by the aperture
    pub range: IndexRange,
}

/// Shared aperture grid in wavelength-normalized coordinates
#[derive(Debug, Clone)]
pub struct ApertureGrid {
    /// Extent of one cell divided by wavelength (dimensionless)
    pub normalized_cell_extent: f64,
    /// Number of cells along each axis of the full grid (a power of two)
    pub n_grid_cells: usize,
    /// Cell coordinates `(-N/2 .. N/2) · extent`
    pub normalized_coordinates: Array1<f64>,
    /// Footprint of the aperture at the shortest wavelength
    pub footprint: ApertureFootprint,
}

impl ApertureGrid {
    /// Coordinates of the cells covered by the aperture footprint
    pub fn cropped_coordinates(&self) -> ArrayView1<'_, f64> {
        self.normalized_coordinates
            .slice(s![self.footprint.range.as_range()])
    }

    /// Cells needed to cover an aperture of `diameter` at `wavelength`.
    ///
    /// Longer wavelengths need fewer cells than the shared footprint, which
    /// is sized for the shortest one.
    pub fn required_cells(&self, diameter: f64, wavelength: f64) -> usize {
        let normalized_radius = 0.5 * diameter / wavelength;
        2 * (normalized_radius / self.normalized_cell_extent).ceil() as usize
    }
}

/// Image plane grid, Fourier conjugate to the aperture grid
#[derive(Debug, Clone)]
pub struct ImageGrid {
    /// Spatial extent of one image cell in metres
    pub cell_extent: f64,
    /// Spatial coordinates of all image cells, centred on the optical axis
    pub coordinates: Array1<f64>,
    /// Angle of each cell with respect to the optical axis, in radians
    pub angular_coordinates: Array1<f64>,
    /// Cells whose angle lies within the x field of view
    pub range_x: IndexRange,
    /// Cells whose angle lies within the y field of view
    pub range_y: IndexRange,
}

impl ImageGrid {
    pub fn x_coordinates(&self) -> ArrayView1<'_, f64> {
        self.coordinates.slice(s![self.range_x.as_range()])
    }

    pub fn y_coordinates(&self) -> ArrayView1<'_, f64> {
        self.coordinates.slice(s![self.range_y.as_range()])
    }

    pub fn angular_x_coordinates(&self) -> ArrayView1<'_, f64> {
        self.angular_coordinates.slice(s![self.range_x.as_range()])
    }

    pub fn angular_y_coordinates(&self) -> ArrayView1<'_, f64> {
        self.angular_coordinates.slice(s![self.range_y.as_range()])
    }

    /// Angular extent `[x_min, x_max, y_min, y_max]` of the field of view window
    pub fn angular_extent(&self) -> [f64; 4] {
        let first = |r: &IndexRange| self.angular_coordinates[r.start];
        let last = |r: &IndexRange| self.angular_coordinates[r.end.saturating_sub(1)];
        [
            first(&self.range_x),
            last(&self.range_x),
            first(&self.range_y),
            last(&self.range_y),
        ]
    }
}

/// Per-wavelength factors converting squared Fourier magnitude into spectral flux
/// density (W/m²/m).
///
/// `scale = (λ · extent² / f)²`. Combined with the image cell area
/// `(f / (N · extent))²` this gives `λ² · extent² / N²`, which cancels the `N²`
/// from Parseval's theorem for an unnormalized forward DFT and leaves the
/// incident power `Σ|E|² · (extent · λ)²`.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxScale {
    values: Vec<f64>,
}

impl FluxScale {
    fn new(wavelengths: &[f64], normalized_cell_extent: f64, focal_length: f64) -> Self {
        let values = wavelengths
            .iter()
            .map(|&wavelength| {
                (wavelength * normalized_cell_extent * normalized_cell_extent / focal_length)
                    .powi(2)
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, wavelength_idx: usize) -> Option<f64> {
        self.values.get(wavelength_idx).copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Immutable geometry derived once from an [`OpticalSystemConfig`]
#[derive(Debug, Clone)]
pub struct GridPlan {
    wavelengths: Vec<f64>,
    aperture: ApertureGrid,
    image: ImageGrid,
    flux_scale: FluxScale,
}

impl GridPlan {
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn n_wavelengths(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn aperture(&self) -> &ApertureGrid {
        &self.aperture
    }

    pub fn image(&self) -> &ImageGrid {
        &self.image
    }

    pub fn flux_scale(&self) -> &FluxScale {
        &self.flux_scale
    }

    /// Shape `(wavelengths, y, x)` every incident field array must have
    pub fn field_shape(&self) -> (usize, usize, usize) {
        let n = self.aperture.footprint.n_cells;
        (self.wavelengths.len(), n, n)
    }

    /// Shape `(wavelengths, y, x)` of the image flux inside the field of view
    pub fn image_shape(&self) -> (usize, usize, usize) {
        (
            self.wavelengths.len(),
            self.image.range_y.len(),
            self.image.range_x.len(),
        )
    }
}

/// Derive the aperture grid, image grid and flux scales for a configuration.
///
/// # Errors
/// * [`OpticsError::InvalidParameter`] / [`OpticsError::NoWavelengths`] for
///   degenerate configuration values
/// * [`OpticsError::ApertureExceedsGrid`] when the aperture at the shortest
///   wavelength needs more cells than the grid sized by coarseness and field of
///   view provides
pub fn plan(config: &OpticalSystemConfig) -> Result<GridPlan, OpticsError> {
    config.validate()?;

    let aperture = plan_aperture_grid(config)?;
    let image = plan_image_grid(config, &aperture);
    let flux_scale = FluxScale::new(
        &config.wavelengths,
        aperture.normalized_cell_extent,
        config.focal_length,
    );

    debug!(
        "Planned {}x{} grid (aperture footprint {} cells, image window {}x{})",
        aperture.n_grid_cells,
        aperture.n_grid_cells,
        aperture.footprint.n_cells,
        image.range_x.len(),
        image.range_y.len()
    );

    Ok(GridPlan {
        wavelengths: config.wavelengths.clone(),
        aperture,
        image,
        flux_scale,
    })
}

fn plan_aperture_grid(config: &OpticalSystemConfig) -> Result<ApertureGrid, OpticsError> {
    let normalized_cell_extent = 1.0 / (2.0 * (config.max_field_of_view() / 2.0).tan());

    let raw_cells = 1.0 / (config.max_angular_coarseness * normalized_cell_extent);
    let n_grid_cells = (raw_cells.ceil() as usize)
        .max(1)
        .checked_next_power_of_two()
        .ok_or(OpticsError::InvalidParameter {
            name: "max_angular_coarseness",
            value: config.max_angular_coarseness,
        })?;

    let normalized_coordinates = centered_coordinates(n_grid_cells, normalized_cell_extent);

    let min_wavelength = config.min_wavelength();
    let max_normalized_radius = 0.5 * config.aperture_diameter / min_wavelength;
    let n_cells = 2 * (max_normalized_radius / normalized_cell_extent).ceil() as usize;

    if n_cells > n_grid_cells {
        return Err(OpticsError::ApertureExceedsGrid {
            wavelength: min_wavelength,
            aperture_cells: n_cells,
            grid_cells: n_grid_cells,
        });
    }

    let n_pad_cells = (n_grid_cells - n_cells) / 2;
    let footprint = ApertureFootprint {
        n_cells,
        n_pad_cells,
        range: IndexRange::new(n_pad_cells, n_pad_cells + n_cells),
    };

    Ok(ApertureGrid {
        normalized_cell_extent,
        n_grid_cells,
        normalized_coordinates,
        footprint,
    })
}

fn plan_image_grid(config: &OpticalSystemConfig, aperture: &ApertureGrid) -> ImageGrid {
    let n = aperture.n_grid_cells;
    let cell_extent = config.focal_length / (n as f64 * aperture.normalized_cell_extent);

    let coordinates = centered_coordinates(n, cell_extent);
    let angular_coordinates = coordinates.mapv(|x| x.atan2(config.focal_length));

    let range_x = field_of_view_range(&angular_coordinates, config.field_of_view_x);
    let range_y = field_of_view_range(&angular_coordinates, config.field_of_view_y);

    ImageGrid {
        cell_extent,
        coordinates,
        angular_coordinates,
        range_x,
        range_y,
    }
}

/// `(-N/2 .. N/2) · spacing`, matching the layout of a shifted DFT
fn centered_coordinates(n: usize, spacing: f64) -> Array1<f64> {
    let half = (n / 2) as f64;
    Array1::from_iter((0..n).map(|i| (i as f64 - half) * spacing))
}

/// First index at or above `-fov/2` up to the first index at or above `+fov/2`
fn field_of_view_range(angles: &Array1<f64>, field_of_view: f64) -> IndexRange {
    let half = 0.5 * field_of_view;
    let start = angles.iter().take_while(|&&a| a < -half).count();
    let end = angles.iter().take_while(|&&a| a < half).count();
    IndexRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::arcsec_to_rad;
    use approx::assert_relative_eq;

    fn reference_config() -> OpticalSystemConfig {
        OpticalSystemConfig::new(
            0.15,
            0.75,
            arcsec_to_rad(10.0),
            arcsec_to_rad(10.0),
            arcsec_to_rad(0.1),
            vec![700e-9],
        )
        .unwrap()
    }

    #[test]
    fn test_reference_grid_sizes() {
        let plan = plan(&reference_config()).unwrap();
        let aperture = plan.aperture();

        // extent = 1 / (2 tan 5") ≈ 20626.5, N = 2^ceil(log2(100)) = 128
        assert_relative_eq!(
            aperture.normalized_cell_extent,
            1.0 / (2.0 * arcsec_to_rad(5.0).tan()),
            epsilon = 1e-9
        );
        assert_eq!(aperture.n_grid_cells, 128);

        // 0.5 · 0.15 / 700e-9 / 20626.5 ≈ 5.19 → 6 → 12 cells
        assert_eq!(aperture.footprint.n_cells, 12);
        assert_eq!(aperture.footprint.n_pad_cells, 58);
        assert_eq!(aperture.footprint.range, IndexRange::new(58, 70));
        assert_eq!(aperture.cropped_coordinates().len(), 12);
        assert_eq!(plan.field_shape(), (1, 12, 12));
    }

    #[test]
    fn test_coordinates_are_centered() {
        let plan = plan(&reference_config()).unwrap();
        let coords = &plan.aperture().normalized_coordinates;
        let extent = plan.aperture().normalized_cell_extent;

        assert_eq!(coords.len(), 128);
        assert_relative_eq!(coords[0], -64.0 * extent);
        assert_relative_eq!(coords[64], 0.0);
        assert_relative_eq!(coords[127], 63.0 * extent);
    }

    #[test]
    fn test_grid_invariants_across_configs() {
        let wavelength_sets = [vec![400e-9], vec![400e-9, 550e-9, 700e-9], vec![1.2e-6, 900e-9]];
        for fov_arcsec in [5.0, 10.0, 30.0] {
            for coarseness_arcsec in [0.05, 0.1, 0.25] {
                for wavelengths in &wavelength_sets {
                    let config = OpticalSystemConfig::new(
                        0.1,
                        1.0,
                        arcsec_to_rad(fov_arcsec),
                        arcsec_to_rad(fov_arcsec * 0.6),
                        arcsec_to_rad(coarseness_arcsec),
                        wavelengths.clone(),
                    )
                    .unwrap();

                    let Ok(plan) = plan(&config) else {
                        continue;
                    };
                    let aperture = plan.aperture();
                    let n = aperture.n_grid_cells;

                    assert!(n.is_power_of_two());
                    assert_eq!(aperture.footprint.n_cells % 2, 0);
                    assert!(aperture.footprint.n_cells <= n);
                    for &wavelength in wavelengths {
                        assert!(aperture.required_cells(0.1, wavelength) <= aperture.footprint.n_cells);
                    }
                    assert!(plan.image().range_x.len() <= n);
                    assert!(plan.image().range_y.len() <= n);
                    assert!(plan.image().range_y.len() <= plan.image().range_x.len());
                }
            }
        }
    }

    #[test]
    fn test_aperture_exceeding_grid_is_rejected() {
        // 2 m aperture at 400 nm needs far more cells than a 0.5" coarseness allows
        let config = OpticalSystemConfig::new(
            2.0,
            10.0,
            arcsec_to_rad(10.0),
            arcsec_to_rad(10.0),
            arcsec_to_rad(0.5),
            vec![400e-9, 800e-9],
        )
        .unwrap();

        match plan(&config) {
            Err(OpticsError::ApertureExceedsGrid {
                wavelength,
                aperture_cells,
                grid_cells,
            }) => {
                assert_relative_eq!(wavelength, 400e-9);
                assert!(aperture_cells > grid_cells);
                assert_eq!(grid_cells, 32);
            }
            other => panic!("expected ApertureExceedsGrid, got {other:?}"),
        }
    }

    #[test]
    fn test_image_grid_is_fourier_conjugate() {
        let config = reference_config();
        let plan = plan(&config).unwrap();
        let image = plan.image();
        let aperture = plan.aperture();

        assert_relative_eq!(
            image.cell_extent,
            config.focal_length / (aperture.n_grid_cells as f64 * aperture.normalized_cell_extent)
        );
        // Full image domain spans ±FOV/2
        let half_span = 64.0 * image.cell_extent / config.focal_length;
        assert_relative_eq!(half_span.atan(), arcsec_to_rad(5.0), epsilon = 1e-12);
        assert_relative_eq!(image.angular_coordinates[64], 0.0);
    }

    #[test]
    fn test_field_of_view_window() {
        let config = OpticalSystemConfig::new(
            0.15,
            0.75,
            arcsec_to_rad(10.0),
            arcsec_to_rad(4.0),
            arcsec_to_rad(0.1),
            vec![700e-9],
        )
        .unwrap();
        let plan = plan(&config).unwrap();
        let image = plan.image();

        let half_y = arcsec_to_rad(2.0);
        for &angle in image.angular_y_coordinates() {
            assert!(angle >= -half_y && angle < half_y);
        }
        // Cells just outside the window are outside the field of view
        assert!(image.angular_coordinates[image.range_y.start - 1] < -half_y);
        assert!(image.angular_coordinates[image.range_y.end] >= half_y);

        // About 4/10 of the 128 cells
        let width = image.range_y.len() as f64;
        assert!((width - 51.2).abs() <= 2.0, "window width {width}");
        assert_eq!(plan.image_shape(), (1, image.range_y.len(), image.range_x.len()));
    }

    #[test]
    fn test_window_coordinates_use_their_own_axis() {
        let config = OpticalSystemConfig::new(
            0.15,
            0.75,
            arcsec_to_rad(10.0),
            arcsec_to_rad(4.0),
            arcsec_to_rad(0.1),
            vec![700e-9],
        )
        .unwrap();
        let plan = plan(&config).unwrap();
        let image = plan.image();

        assert_eq!(image.x_coordinates().len(), image.range_x.len());
        assert_eq!(image.y_coordinates().len(), image.range_y.len());
        let extent = image.angular_extent();
        assert!(extent[0] < extent[2] && extent[3] < extent[1]);
    }

    #[test]
    fn test_flux_scale_values() {
        let config = OpticalSystemConfig::new(0.15, 0.75, 1e-4, 1e-4, 1e-6, vec![400e-9, 800e-9])
            .unwrap();
        let plan = plan(&config).unwrap();
        let extent = plan.aperture().normalized_cell_extent;
        let scale = plan.flux_scale();

        assert_eq!(scale.len(), 2);
        assert_relative_eq!(
            scale.get(0).unwrap(),
            (400e-9 * extent * extent / 0.75).powi(2),
            max_relative = 1e-12
        );
        // Quadratic in wavelength
        assert_relative_eq!(
            scale.get(1).unwrap() / scale.get(0).unwrap(),
            4.0,
            max_relative = 1e-12
        );
        assert!(scale.get(2).is_none());
    }

    #[test]
    fn test_index_range_helpers() {
        let range = IndexRange::new(3, 9);
        assert_eq!(range.len(), 6);
        assert!(!range.is_empty());
        assert_eq!(range.center(), 6);
        assert_eq!(range.as_range(), 3..9);
        assert!(IndexRange::new(4, 4).is_empty());
    }
}
