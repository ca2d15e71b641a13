//! End-to-end imaging of point sources through a small refractor

use apsim::units::{arcsec_to_rad, nm_to_m};
use apsim::{Circular, FieldStage, FraunhoferOptics, OpticalSystemConfig, OpticsError, PointSource};
use approx::assert_relative_eq;
use ndarray::{Array2, ArrayView2, Axis};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 15 cm aperture, f/5, 10" square field at 0.1" sampling
fn reference_optics(wavelengths_nm: &[f64]) -> FraunhoferOptics {
    let config = OpticalSystemConfig::new(
        0.15,
        0.75,
        arcsec_to_rad(10.0),
        arcsec_to_rad(10.0),
        arcsec_to_rad(0.1),
        wavelengths_nm.iter().map(|&nm| nm_to_m(nm)).collect(),
    )
    .unwrap();
    FraunhoferOptics::new(config).unwrap()
}

fn argmax(image: ArrayView2<'_, f64>) -> (usize, usize) {
    image
        .indexed_iter()
        .fold(((0, 0), f64::NEG_INFINITY), |(best, max), (idx, &v)| {
            if v > max {
                (idx, v)
            } else {
                (best, max)
            }
        })
        .0
}

#[test]
fn test_on_axis_source_peaks_at_window_center() {
    init_logging();
    let mut optics = reference_optics(&[700.0]);
    optics
        .add_point_sources(&[PointSource::on_axis(vec![1.0])])
        .unwrap();

    let fluxes = optics.compute_image_fluxes(FieldStage::Pure).unwrap();
    let image: Array2<f64> = fluxes.index_axis(Axis(0), 0).to_owned();
    let grid = optics.plan().image();
    let cell = grid.angular_coordinates[1] - grid.angular_coordinates[0];

    let (iy, ix) = argmax(image.view());
    assert!(grid.angular_x_coordinates()[ix].abs() <= cell);
    assert!(grid.angular_y_coordinates()[iy].abs() <= cell);

    // Unit amplitude over the whole square footprint adds up coherently at the peak
    let n_cells = optics.plan().aperture().footprint.n_cells as f64;
    let scale = optics.plan().flux_scale().get(0).unwrap();
    assert_relative_eq!(image[[iy, ix]], n_cells.powi(4) * scale, max_relative = 1e-9);
}

#[test]
fn test_on_axis_image_is_symmetric() {
    init_logging();
    let mut optics = reference_optics(&[700.0]);
    optics
        .add_point_sources(&[PointSource::on_axis(vec![1.0])])
        .unwrap();
    optics.apply_transmission_mask(&Circular { diameter: 0.15 }).unwrap();

    let full = optics.compute_full_image_fluxes(FieldStage::Masked).unwrap();
    let image = full.index_axis(Axis(0), 0);
    let n = optics.plan().aperture().n_grid_cells;
    let center = n / 2;
    let peak = image[[center, center]];

    assert_eq!(argmax(image), (center, center));
    // Real aperture field, so the image is point symmetric about the centre
    let reach = center as isize - 1;
    for i in -reach..=reach {
        for j in -reach..=reach {
            let (y, x) = ((center as isize + i) as usize, (center as isize + j) as usize);
            let (my, mx) = ((center as isize - i) as usize, (center as isize - j) as usize);
            assert_relative_eq!(image[[y, x]], image[[my, mx]], epsilon = 1e-9 * peak);
        }
    }
}

#[test]
fn test_off_axis_source_lands_at_its_angle() {
    init_logging();
    let mut optics = reference_optics(&[700.0]);
    optics
        .add_point_sources(&[PointSource::at_angular_offset(
            arcsec_to_rad(1.0),
            arcsec_to_rad(-2.0),
            vec![1.0],
        )])
        .unwrap();
    optics.apply_transmission_mask(&Circular { diameter: 0.15 }).unwrap();

    let fluxes = optics.compute_image_fluxes(FieldStage::Masked).unwrap();
    let grid = optics.plan().image();
    let cell = grid.angular_coordinates[1] - grid.angular_coordinates[0];
    let (iy, ix) = argmax(fluxes.index_axis(Axis(0), 0));

    assert!((grid.angular_x_coordinates()[ix] - arcsec_to_rad(1.0)).abs() <= cell);
    assert!((grid.angular_y_coordinates()[iy] - arcsec_to_rad(-2.0)).abs() <= cell);
}

#[test]
fn test_psf_width_grows_with_wavelength() {
    init_logging();
    let mut optics = reference_optics(&[450.0, 900.0]);
    optics
        .add_point_sources(&[PointSource::on_axis(vec![1.0, 1.0])])
        .unwrap();
    optics.apply_transmission_mask(&Circular { diameter: 0.15 }).unwrap();

    let fluxes = optics.compute_image_fluxes(FieldStage::Masked).unwrap();
    let cell = {
        let angles = &optics.plan().image().angular_coordinates;
        angles[1] - angles[0]
    };

    // Count cells above half maximum along the central row
    let widths: Vec<usize> = fluxes
        .outer_iter()
        .map(|image| {
            let (iy, _) = argmax(image);
            let row = image.row(iy);
            let half = row.fold(0.0_f64, |m, &v| m.max(v)) * 0.5;
            row.iter().filter(|&&v| v >= half).count()
        })
        .collect();

    assert!(widths[1] > widths[0]);
    // FWHM ≈ 1.03 λ/D
    let expected = 1.03 * 900e-9 / 0.15 / cell;
    assert!((widths[1] as f64 - expected).abs() <= 2.0);
}

#[test]
fn test_aperture_too_large_for_grid() {
    init_logging();
    let config = OpticalSystemConfig::new(
        2.0,
        10.0,
        arcsec_to_rad(10.0),
        arcsec_to_rad(10.0),
        arcsec_to_rad(0.5),
        vec![400e-9, 800e-9],
    )
    .unwrap();

    match FraunhoferOptics::new(config) {
        Err(OpticsError::ApertureExceedsGrid {
            wavelength,
            aperture_cells,
            grid_cells,
        }) => {
            assert_relative_eq!(wavelength, 400e-9);
            assert_eq!(grid_cells, 32);
            assert!(aperture_cells > grid_cells);
        }
        other => panic!("expected ApertureExceedsGrid, got {other:?}"),
    }
}
