//! Power entering the aperture must reappear in the focal plane

use apsim::optics::diffraction;
use apsim::optics::energy::{diffracted_spectral_power, incident_spectral_power};
use apsim::units::arcsec_to_rad;
use apsim::{Circular, FieldStage, FraunhoferOptics, OpticalSystemConfig, PointSource};
use approx::assert_relative_eq;
use ndarray::Axis;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Footprint fills half the grid, so the image is Nyquist sampled at λ/2D.
///
/// With `fov_y_arcsec` at 60 the field is square and the window spans the
/// whole grid, so the budget is a Parseval check. Narrower y fields crop real
/// power out of the window.
fn wide_field_optics(fov_y_arcsec: f64, sources: &[PointSource]) -> FraunhoferOptics {
    let config = OpticalSystemConfig::new(
        0.15,
        0.75,
        arcsec_to_rad(60.0),
        arcsec_to_rad(fov_y_arcsec),
        arcsec_to_rad(0.5),
        vec![700e-9],
    )
    .unwrap();
    let mut optics = FraunhoferOptics::new(config).unwrap();
    optics.add_point_sources(sources).unwrap();
    optics.apply_transmission_mask(&Circular { diameter: 0.15 }).unwrap();
    optics
}

#[test]
fn test_uniform_disk_conserves_power_over_square_field() {
    init_logging();
    let optics = wide_field_optics(60.0, &[PointSource::on_axis(vec![1.0])]);
    assert_eq!(optics.plan().aperture().n_grid_cells, 128);
    assert_eq!(optics.plan().aperture().footprint.n_cells, 64);

    let budget = optics.power_budget(FieldStage::Masked, 0).unwrap();
    assert!(budget.relative_loss() > -1e-10);
    assert!(budget.relative_discrepancy() < 1e-3);
}

#[test]
fn test_off_axis_plane_wave_conserves_power_over_square_field() {
    init_logging();
    let source = PointSource::at_angular_offset(arcsec_to_rad(3.0), arcsec_to_rad(-2.0), vec![2.5]);
    let optics = wide_field_optics(60.0, &[source]);

    let budget = optics.power_budget(FieldStage::Masked, 0).unwrap();
    assert!(budget.relative_discrepancy() < 1e-3);
}

#[test]
fn test_parseval_over_full_grid() {
    init_logging();
    let sources = [
        PointSource::on_axis(vec![1.0]),
        PointSource::at_angular_offset(arcsec_to_rad(-7.0), arcsec_to_rad(4.0), vec![0.3]),
    ];
    // Narrow y window so the cropped image misses real power
    let optics = wide_field_optics(20.0, &sources);
    let plan = optics.plan();

    let field = optics.light_field().get(FieldStage::Masked);
    let full = diffraction::transform_full(field.view(), plan).unwrap();

    let incident = incident_spectral_power(
        field.index_axis(Axis(0), 0),
        plan.aperture().normalized_cell_extent,
        700e-9,
    );
    let diffracted =
        diffracted_spectral_power(full.index_axis(Axis(0), 0), plan.image().cell_extent);
    assert_relative_eq!(diffracted, incident, max_relative = 1e-10);

    let cropped = optics.power_budget(FieldStage::Masked, 0).unwrap();
    assert_relative_eq!(cropped.incident, incident, max_relative = 1e-12);
    assert!(cropped.relative_loss() > 5e-3);
}

#[test]
fn test_loss_grows_as_window_shrinks() {
    init_logging();
    let losses: Vec<f64> = [60.0, 40.0, 20.0]
        .iter()
        .map(|&fov_y| {
            wide_field_optics(fov_y, &[PointSource::on_axis(vec![1.0])])
                .power_budget(FieldStage::Masked, 0)
                .unwrap()
                .relative_loss()
        })
        .collect();

    assert!(losses[0] < losses[1]);
    assert!(losses[1] < losses[2]);
}

#[test]
fn test_transform_is_deterministic() {
    init_logging();
    let optics = wide_field_optics(
        60.0,
        &[PointSource::at_angular_offset(arcsec_to_rad(5.0), 0.0, vec![1.0])],
    );
    let first = optics.compute_image_fluxes(FieldStage::Masked).unwrap();
    let second = optics.compute_image_fluxes(FieldStage::Masked).unwrap();
    assert_eq!(first, second);
}

/// 15 cm aperture at f/5, 10" field sampled at 0.1", 700 nm, clear circular pupil
#[test]
fn test_reference_scenario_conserves_power() {
    init_logging();
    let config = OpticalSystemConfig::new(
        0.15,
        0.75,
        arcsec_to_rad(10.0),
        arcsec_to_rad(10.0),
        arcsec_to_rad(0.1),
        vec![700e-9],
    )
    .unwrap();
    let mut optics = FraunhoferOptics::new(config).unwrap();
    optics
        .add_point_sources(&[PointSource::on_axis(vec![1.0])])
        .unwrap();
    optics.apply_transmission_mask(&Circular { diameter: 0.15 }).unwrap();

    let plan = optics.plan();
    assert_eq!(plan.aperture().n_grid_cells, 128);
    assert_eq!(plan.aperture().footprint.n_cells, 12);
    assert_eq!(plan.aperture().footprint.n_pad_cells, 58);

    // Power inside the window is exactly the window's share of the full grid
    let full = optics.compute_full_image_fluxes(FieldStage::Masked).unwrap();
    let image = plan.image();
    let window = full
        .index_axis(Axis(0), 0)
        .slice(ndarray::s![image.range_y.as_range(), image.range_x.as_range()])
        .to_owned();
    let budget = optics.power_budget(FieldStage::Masked, 0).unwrap();
    assert_relative_eq!(
        budget.diffracted,
        diffracted_spectral_power(window.view(), image.cell_extent),
        max_relative = 1e-12
    );

    let total = diffracted_spectral_power(full.index_axis(Axis(0), 0), image.cell_extent);
    assert_relative_eq!(total, budget.incident, max_relative = 1e-10);
    assert!(budget.relative_loss() > -1e-10);
    assert!(budget.relative_discrepancy() < 5e-3);
}
