//! Atmospheric phase screens
//!
//! A single frozen-flow von Kármán screen of optical path difference (OPD) is
//! generated with the FFT method: complex Gaussian white noise is shaped by the
//! square root of the phase power spectral density and inverse transformed.
//! The OPD is achromatic, so every wavelength samples the same screen at its
//! own physical aperture coordinates and converts it to phase with `2π/λ`.

use log::debug;
use ndarray::{Array1, Array2, Array3};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::optics::error::OpticsError;
use crate::optics::grid::GridPlan;

/// Something that perturbs the incident field, e.g. the atmosphere
pub trait PhaseScreen {
    /// Complex modulation with the planned field shape `(wavelengths, y, x)`
    fn perturbation_field(&self) -> Result<Array3<Complex64>, OpticsError>;

    /// Move the screen forward by `dt` seconds
    fn advance(&mut self, dt: f64);

    /// Seconds elapsed since the screen was created
    fn time(&self) -> f64;
}

/// Seeing conditions for a von Kármán screen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurbulenceConfig {
    /// Fried parameter r0 at `reference_wavelength`, at zenith (m)
    pub fried_parameter: f64,
    /// Wavelength r0 is quoted at (m)
    pub reference_wavelength: f64,
    /// Zenith angle of the line of sight (rad)
    pub zenith_angle: f64,
    /// Outer scale L0 (m)
    pub outer_scale: f64,
    /// Frozen-flow wind velocity across the aperture (m/s)
    pub wind_velocity: [f64; 2],
}

impl Default for TurbulenceConfig {
    /// Median seeing at a good site: r0 = 10 cm at 500 nm, L0 = 25 m, 10 m/s wind
    fn default() -> Self {
        Self {
            fried_parameter: 0.1,
            reference_wavelength: 500e-9,
            zenith_angle: 0.0,
            outer_scale: 25.0,
            wind_velocity: [10.0, 0.0],
        }
    }
}

impl TurbulenceConfig {
    pub fn validate(&self) -> Result<(), OpticsError> {
        let positive = [
            ("fried_parameter", self.fried_parameter),
            ("reference_wavelength", self.reference_wavelength),
            ("outer_scale", self.outer_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(OpticsError::InvalidParameter { name, value });
            }
        }
        if !(self.zenith_angle.is_finite() && self.zenith_angle.abs() < 0.5 * std::f64::consts::PI) {
            return Err(OpticsError::InvalidParameter {
                name: "zenith_angle",
                value: self.zenith_angle,
            });
        }
        for value in self.wind_velocity {
            if !value.is_finite() {
                return Err(OpticsError::InvalidParameter {
                    name: "wind_velocity",
                    value,
                });
            }
        }
        Ok(())
    }

    /// Fried parameter at `wavelength` along the line of sight,
    /// `r0 (λ/λref)^(6/5) cos(z)^(3/5)`
    pub fn fried_parameter_at(&self, wavelength: f64) -> f64 {
        self.fried_parameter
            * (wavelength / self.reference_wavelength).powf(1.2)
            * self.zenith_angle.cos().powf(0.6)
    }

    /// Atmospheric coherence time `0.314 r0 / |v|` at the reference wavelength.
    ///
    /// Infinite for a static screen.
    pub fn coherence_time(&self) -> f64 {
        let speed = self.wind_velocity[0].hypot(self.wind_velocity[1]);
        if speed == 0.0 {
            f64::INFINITY
        } else {
            0.314 * self.fried_parameter_at(self.reference_wavelength) / speed
        }
    }
}

/// Von Kármán phase power spectral density (rad² m²) at spatial frequency `f` (1/m)
pub fn von_karman_psd(frequency: f64, fried_parameter: f64, outer_scale: f64) -> f64 {
    0.023
        * fried_parameter.powf(-5.0 / 3.0)
        * (frequency * frequency + 1.0 / (outer_scale * outer_scale)).powf(-11.0 / 6.0)
}

/// Periodic frozen-flow screen sampled onto the aperture grid
#[derive(Debug, Clone)]
pub struct TurbulencePhaseScreen {
    config: TurbulenceConfig,
    /// OPD samples in metres on a square periodic grid
    opd: Array2<f64>,
    /// Physical spacing of `opd` samples (m)
    pitch: f64,
    wavelengths: Vec<f64>,
    normalized_coordinates: Array1<f64>,
    offset: [f64; 2],
    time: f64,
}

impl TurbulencePhaseScreen {
    /// Generate a screen large enough for the aperture footprint at every
    /// wavelength of `plan`.
    ///
    /// The screen is sampled at the finest physical aperture pitch (shortest
    /// wavelength) and spans at least twice the widest footprint, rounded up to
    /// a power of two for the FFT.
    pub fn new(config: TurbulenceConfig, plan: &GridPlan, seed: u64) -> Result<Self, OpticsError> {
        config.validate()?;

        let wavelengths = plan.wavelengths().to_vec();
        if wavelengths.is_empty() {
            return Err(OpticsError::NoWavelengths);
        }
        let (min_wavelength, max_wavelength) = wavelengths
            .iter()
            .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &w| (lo.min(w), hi.max(w)));

        let aperture = plan.aperture();
        let pitch = aperture.normalized_cell_extent * min_wavelength;
        let widest = aperture.footprint.n_cells as f64 * aperture.normalized_cell_extent * max_wavelength;
        let n = ((2.0 * widest / pitch).ceil() as usize)
            .max(2)
            .next_power_of_two();

        let opd = generate_opd_screen(&config, n, pitch, seed);
        debug!(
            "Generated {n}x{n} phase screen, pitch {pitch:.4e} m, r0 {:.4} m",
            config.fried_parameter_at(config.reference_wavelength)
        );

        Ok(Self {
            config,
            opd,
            pitch,
            wavelengths,
            normalized_coordinates: aperture.cropped_coordinates().to_owned(),
            offset: [0.0, 0.0],
            time: 0.0,
        })
    }

    pub fn config(&self) -> &TurbulenceConfig {
        &self.config
    }

    /// Raw OPD screen in metres
    pub fn opd(&self) -> &Array2<f64> {
        &self.opd
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn fried_parameter(&self, wavelength: f64) -> f64 {
        self.config.fried_parameter_at(wavelength)
    }

    pub fn coherence_time(&self) -> f64 {
        self.config.coherence_time()
    }

    /// OPD at physical position `(x, y)` relative to the current screen origin
    pub fn sample_opd(&self, x: f64, y: f64) -> f64 {
        sample_periodic(
            &self.opd,
            (x + self.offset[0]) / self.pitch,
            (y + self.offset[1]) / self.pitch,
        )
    }
}

impl PhaseScreen for TurbulencePhaseScreen {
    fn perturbation_field(&self) -> Result<Array3<Complex64>, OpticsError> {
        let u = &self.normalized_coordinates;
        let shape = (self.wavelengths.len(), u.len(), u.len());
        Ok(Array3::from_shape_fn(shape, |(w, iy, ix)| {
            let wavelength = self.wavelengths[w];
            let opd = self.sample_opd(wavelength * u[ix], wavelength * u[iy]);
            Complex64::from_polar(1.0, TAU * opd / wavelength)
        }))
    }

    fn advance(&mut self, dt: f64) {
        self.offset[0] += self.config.wind_velocity[0] * dt;
        self.offset[1] += self.config.wind_velocity[1] * dt;
        self.time += dt;
    }

    fn time(&self) -> f64 {
        self.time
    }
}

/// FFT-method von Kármán OPD screen with `n × n` samples at `pitch` metres
fn generate_opd_screen(config: &TurbulenceConfig, n: usize, pitch: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let r0 = config.fried_parameter_at(config.reference_wavelength);
    let df = 1.0 / (n as f64 * pitch);
    let frequency = |i: usize| {
        let k = if i < n / 2 { i as f64 } else { i as f64 - n as f64 };
        k * df
    };

    let mut spectrum = Array2::from_shape_fn((n, n), |(iy, ix)| {
        if ix == 0 && iy == 0 {
            return Complex64::new(0.0, 0.0);
        }
        let f = frequency(ix).hypot(frequency(iy));
        let amplitude = von_karman_psd(f, r0, config.outer_scale).sqrt() * df;
        let re: f64 = StandardNormal.sample(&mut rng);
        let im: f64 = StandardNormal.sample(&mut rng);
        Complex64::new(re, im) * amplitude
    });

    let ifft = FftPlanner::<f64>::new().plan_fft_inverse(n);
    for mut row in spectrum.rows_mut() {
        if let Some(slice) = row.as_slice_mut() {
            ifft.process(slice);
        }
    }
    let mut transposed = spectrum.t().as_standard_layout().into_owned();
    for mut row in transposed.rows_mut() {
        if let Some(slice) = row.as_slice_mut() {
            ifft.process(slice);
        }
    }

    let to_opd = config.reference_wavelength / TAU;
    transposed.reversed_axes().mapv(|c| c.re * to_opd)
}

/// Bilinear interpolation on a periodic grid at fractional indices `(fx, fy)`
fn sample_periodic(data: &Array2<f64>, fx: f64, fy: f64) -> f64 {
    let (ny, nx) = data.dim();
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;

    let ix0 = (x0 as i64).rem_euclid(nx as i64) as usize;
    let iy0 = (y0 as i64).rem_euclid(ny as i64) as usize;
    let ix1 = (ix0 + 1) % nx;
    let iy1 = (iy0 + 1) % ny;

    let top = data[[iy0, ix0]] * (1.0 - tx) + data[[iy0, ix1]] * tx;
    let bottom = data[[iy1, ix0]] * (1.0 - tx) + data[[iy1, ix1]] * tx;
    top * (1.0 - ty) + bottom * ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optics::config::OpticalSystemConfig;
    use crate::optics::grid::plan;
    use crate::units::arcsec_to_rad;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn test_plan() -> GridPlan {
        let config = OpticalSystemConfig::new(
            0.15,
            0.75,
            arcsec_to_rad(10.0),
            arcsec_to_rad(10.0),
            arcsec_to_rad(0.1),
            vec![500e-9, 700e-9],
        )
        .unwrap();
        plan(&config).unwrap()
    }

    #[test]
    fn test_fried_parameter_scaling() {
        let config = TurbulenceConfig {
            zenith_angle: 60f64.to_radians(),
            ..TurbulenceConfig::default()
        };
        // cos(60°)^(3/5) = 0.5^0.6
        assert_relative_eq!(
            config.fried_parameter_at(500e-9),
            0.1 * 0.5f64.powf(0.6),
            max_relative = 1e-12
        );
        assert_relative_eq!(
            config.fried_parameter_at(1000e-9) / config.fried_parameter_at(500e-9),
            2f64.powf(1.2),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_coherence_time() {
        let config = TurbulenceConfig {
            wind_velocity: [3.0, 4.0],
            ..TurbulenceConfig::default()
        };
        assert_relative_eq!(config.coherence_time(), 0.314 * 0.1 / 5.0, max_relative = 1e-12);

        let still = TurbulenceConfig {
            wind_velocity: [0.0, 0.0],
            ..TurbulenceConfig::default()
        };
        assert!(still.coherence_time().is_infinite());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TurbulenceConfig {
            fried_parameter: -0.1,
            ..TurbulenceConfig::default()
        };
        assert!(TurbulencePhaseScreen::new(config, &test_plan(), 1).is_err());
    }

    #[test]
    fn test_psd_decreases_with_frequency() {
        let low = von_karman_psd(0.1, 0.1, 25.0);
        let high = von_karman_psd(10.0, 0.1, 25.0);
        assert!(low > high);
        // Outer scale caps the spectrum at zero frequency
        assert!(von_karman_psd(0.0, 0.1, 25.0).is_finite());
    }

    #[test]
    fn test_screen_is_zero_mean_and_seeded() {
        let plan = test_plan();
        let a = TurbulencePhaseScreen::new(TurbulenceConfig::default(), &plan, 42).unwrap();
        let b = TurbulencePhaseScreen::new(TurbulenceConfig::default(), &plan, 42).unwrap();
        let c = TurbulencePhaseScreen::new(TurbulenceConfig::default(), &plan, 43).unwrap();

        assert_eq!(a.opd(), b.opd());
        assert_ne!(a.opd(), c.opd());

        let mean = a.opd().mean().unwrap();
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
        assert!(a.opd().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_perturbation_is_unit_modulus_with_planned_shape() {
        let plan = test_plan();
        let screen = TurbulencePhaseScreen::new(TurbulenceConfig::default(), &plan, 7).unwrap();
        let field = screen.perturbation_field().unwrap();
        assert_eq!(field.dim(), plan.field_shape());
        for value in field.iter() {
            assert_relative_eq!(value.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_advance_shifts_screen_with_wind() {
        let plan = test_plan();
        let mut screen = TurbulencePhaseScreen::new(TurbulenceConfig::default(), &plan, 3).unwrap();
        let pitch = screen.pitch();
        let ahead = screen.sample_opd(2.0 * pitch, 0.0);

        // 10 m/s along x for exactly two samples
        screen.advance(2.0 * pitch / 10.0);
        assert_relative_eq!(screen.sample_opd(0.0, 0.0), ahead, epsilon = 1e-15);
        assert_relative_eq!(screen.time(), 2.0 * pitch / 10.0);
    }

    #[test]
    fn test_periodic_bilinear_sampling() {
        let data = Array2::from_shape_fn((4, 4), |(iy, ix)| (iy * 4 + ix) as f64);
        assert_relative_eq!(sample_periodic(&data, 1.0, 2.0), 9.0);
        assert_relative_eq!(sample_periodic(&data, 1.5, 0.0), 1.5);
        // Wraps around in both directions
        assert_relative_eq!(sample_periodic(&data, 5.0, -3.0), data[[1, 1]]);
        assert_relative_eq!(sample_periodic(&data, 3.5, 0.0), 1.5);
    }
}
