//! Render the focal plane image of point sources seen through a telescope.
//!
//! Builds an optical system from command line flags (or a JSON config), adds
//! point sources, applies a circular, annular or spider-vaned pupil and writes
//! an autostretched 16-bit PNG summed over all wavelengths. With
//! `--fried-parameter` the image is a long exposure averaged over frames of a
//! moving von Kármán phase screen.
//!
//! Usage:
//! ```
//! cargo run --release --bin apsim-image -- --source 0,0,1 --source 2,1,0.3 -o stars.png
//! cargo run --release --bin apsim-image -- --secondary-diameter 0.05 --vane-width 0.004 \
//!     --fried-parameter 0.1 --frames 20 --verify-energy
//! ```

use anyhow::{Context, Result};
use apsim::image_proc::{autostretch, to_u16_image};
use apsim::io::archive;
use apsim::turbulence::{
    FluxAccumulator, FrameProducer, PhaseScreen, TurbulenceConfig, TurbulencePhaseScreen,
};
use apsim::units::{Angle, AngleExt, Length, LengthExt};
use apsim::{
    Annular, Circular, FieldStage, FraunhoferOptics, OpticalSystemConfig, PointSource,
    SpiderVaned, TransmissionMask,
};
use clap::Parser;
use log::info;
use ndarray::{Array3, Axis};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "apsim-image")]
#[command(about = "Fraunhofer diffraction image of point sources")]
#[command(version)]
struct Args {
    /// Aperture diameter in metres
    #[arg(long, default_value_t = 0.15)]
    aperture_diameter: f64,

    /// Focal length in metres
    #[arg(long, default_value_t = 0.75)]
    focal_length: f64,

    /// Field of view along x in arcseconds
    #[arg(long, default_value_t = 10.0, value_name = "ARCSEC")]
    fov: f64,

    /// Field of view along y in arcseconds (defaults to --fov)
    #[arg(long, value_name = "ARCSEC")]
    fov_y: Option<f64>,

    /// Largest acceptable image cell size in arcseconds
    #[arg(long, default_value_t = 0.1, value_name = "ARCSEC")]
    coarseness: f64,

    /// Comma separated wavelengths in nanometres
    #[arg(long, value_delimiter = ',', default_value = "700", value_name = "NM")]
    wavelengths: Vec<f64>,

    /// Read the optical system from a JSON file instead of the flags above
    #[arg(long)]
    config: Option<PathBuf>,

    /// Diameter of the central obstruction in metres
    #[arg(long)]
    secondary_diameter: Option<f64>,

    /// Full width of the spider vanes in metres
    #[arg(long)]
    vane_width: Option<f64>,

    /// Point source as "x_arcsec,y_arcsec,flux"; repeatable, defaults to one on-axis source
    #[arg(short, long, value_parser = parse_source)]
    source: Vec<(f64, f64, f64)>,

    /// Field stage to image when no turbulence is simulated
    #[arg(long, default_value = "modulated")]
    stage: FieldStage,

    /// Fried parameter at 500 nm in metres; enables turbulence
    #[arg(long)]
    fried_parameter: Option<f64>,

    /// Wind speed along x in m/s
    #[arg(long, default_value_t = 10.0)]
    wind_speed: f64,

    /// Number of turbulence frames to average
    #[arg(long, default_value_t = 10)]
    frames: usize,

    /// Time between turbulence frames in seconds
    #[arg(long, default_value_t = 0.01)]
    time_step: f64,

    /// Seed for the phase screen
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Report incident versus diffracted power per wavelength
    #[arg(long)]
    verify_energy: bool,

    /// Mean display level after autostretch
    #[arg(long, default_value_t = 0.25)]
    target_mean: f64,

    /// Output PNG path
    #[arg(short, long, default_value = "diffraction.png")]
    output: PathBuf,

    /// Also save the optical system and field to this archive
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Gzip the archive
    #[arg(long)]
    compress: bool,
}

/// Parse "x,y,flux" with angles in arcseconds
fn parse_source(s: &str) -> Result<(f64, f64, f64), String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,flux but got '{s}'"));
    }
    let parse = |p: &str| p.parse::<f64>().map_err(|e| format!("invalid number '{p}': {e}"));
    Ok((parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
}

fn build_config(args: &Args) -> Result<OpticalSystemConfig> {
    if let Some(path) = &args.config {
        return OpticalSystemConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }
    let wavelengths: Vec<Length> = args
        .wavelengths
        .iter()
        .map(|&nm| Length::from_nanometers(nm))
        .collect();
    let config = OpticalSystemConfig::from_quantities(
        Length::from_meters(args.aperture_diameter),
        Length::from_meters(args.focal_length),
        Angle::from_arcseconds(args.fov),
        Angle::from_arcseconds(args.fov_y.unwrap_or(args.fov)),
        Angle::from_arcseconds(args.coarseness),
        &wavelengths,
    )?;
    Ok(config)
}

fn build_mask(args: &Args, diameter: f64) -> Box<dyn TransmissionMask> {
    match (args.secondary_diameter, args.vane_width) {
        (inner, Some(vane_width)) => Box::new(SpiderVaned {
            outer_diameter: diameter,
            inner_diameter: inner.unwrap_or(0.0),
            vane_width,
        }),
        (Some(inner), None) => Box::new(Annular {
            outer_diameter: diameter,
            inner_diameter: inner,
        }),
        (None, None) => Box::new(Circular { diameter }),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = build_config(&args)?;
    let mut optics = FraunhoferOptics::new(config).context("failed to set up optical system")?;
    let n_wavelengths = optics.wavelengths().len();

    let sources: Vec<PointSource> = if args.source.is_empty() {
        vec![PointSource::on_axis(vec![1.0; n_wavelengths])]
    } else {
        args.source
            .iter()
            .map(|&(x, y, flux)| {
                PointSource::at_angular_offset(
                    Angle::from_arcseconds(x).as_radians(),
                    Angle::from_arcseconds(y).as_radians(),
                    vec![flux; n_wavelengths],
                )
            })
            .collect()
    };
    let added = optics.add_point_sources(&sources)?;
    info!("Added {added} of {} point sources", sources.len());

    let mask = build_mask(&args, optics.config().aperture_diameter);
    optics.apply_transmission_mask(mask.as_ref())?;

    println!(
        "Grid: {} cells, aperture footprint {} cells",
        optics.plan().aperture().n_grid_cells,
        optics.plan().aperture().footprint.n_cells
    );
    for &wavelength in optics.wavelengths() {
        println!(
            "Rayleigh limit at {:.1} nm: {:.4} arcsec",
            Length::from_meters(wavelength).as_nanometers(),
            Angle::from_radians(optics.rayleigh_limit(wavelength)).as_arcseconds()
        );
    }

    let fluxes: Array3<f64> = match args.fried_parameter {
        Some(fried_parameter) => {
            let turbulence = TurbulenceConfig {
                fried_parameter,
                wind_velocity: [args.wind_speed, 0.0],
                ..TurbulenceConfig::default()
            };
            let mut screen = TurbulencePhaseScreen::new(turbulence, optics.plan(), args.seed)?;
            println!(
                "Turbulence: r0 {:.3} m at 500 nm, coherence time {:.4} s",
                fried_parameter,
                screen.coherence_time()
            );

            let mut accumulator = FluxAccumulator::new();
            for frame in FrameProducer::new(&mut optics, &mut screen, args.time_step, args.frames) {
                accumulator.add(&frame?.fluxes)?;
            }
            info!(
                "Averaged {} frames over {:.3} s",
                accumulator.count(),
                screen.time()
            );
            accumulator
                .mean()
                .context("no turbulence frames were produced")?
        }
        None => optics.compute_image_fluxes(args.stage)?,
    };

    if args.verify_energy {
        let stage = if args.fried_parameter.is_some() {
            FieldStage::Modulated
        } else {
            args.stage
        };
        for idx in 0..n_wavelengths {
            let budget = optics.power_budget(stage, idx)?;
            println!(
                "Power at {:.1} nm: incident {:.6e} W/m, diffracted {:.6e} W/m, relative loss {:.3e}",
                Length::from_meters(budget.wavelength).as_nanometers(),
                budget.incident,
                budget.diffracted,
                budget.relative_loss()
            );
        }
    }

    let total = fluxes.sum_axis(Axis(0));
    let display = autostretch(total.view(), args.target_mean);
    to_u16_image(display.view())
        .save(&args.output)
        .with_context(|| format!("failed to write image to {}", args.output.display()))?;
    println!("Wrote {}", args.output.display());

    if let Some(path) = &args.archive {
        archive::save(&optics, path, args.compress)
            .with_context(|| format!("failed to write archive to {}", path.display()))?;
        println!("Saved archive to {}", path.display());
    }

    Ok(())
}
