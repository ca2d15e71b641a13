//! Fraunhofer diffraction imaging for astronomical apertures
//!
//! This crate simulates the image formed in the focal plane of a telescope
//! by light arriving as a superposition of plane waves. The incident field is
//! sampled on an aperture grid whose coordinates are normalized by wavelength,
//! so a single discrete Fourier transform per wavelength yields the focal plane
//! flux on a shared angular grid.
//!
//! # Layout
//!
//! - [`optics`]: grid planning, the diffraction transform, energy accounting
//!   and the [`FraunhoferOptics`] facade tying them together.
//! - [`field`]: the incident light field (sources, transmission masks,
//!   modulation) and aperture shapes.
//! - [`turbulence`]: von Kármán phase screens and the pull-based frame producer.
//! - [`image_proc`]: tone mapping of flux images for display.
//! - [`io`]: archive persistence of an optical system and its field.
//! - [`units`]: typed `uom` angles and lengths for arcsecond and nanometre inputs.

pub mod field;
pub mod image_proc;
pub mod io;
pub mod optics;
pub mod turbulence;
pub mod units;

pub use field::light_field::{ExtendedSource, FieldStage, IncidentLightField, PointSource};
pub use field::mask::{Annular, Circular, SpiderVaned, TransmissionMask};
pub use optics::config::OpticalSystemConfig;
pub use optics::energy::PowerBudget;
pub use optics::error::OpticsError;
pub use optics::fraunhofer::FraunhoferOptics;
pub use optics::grid::{plan, ApertureGrid, FluxScale, GridPlan, ImageGrid, IndexRange};
pub use turbulence::frames::{FluxAccumulator, Frame, FrameProducer};
pub use turbulence::phase_screen::{PhaseScreen, TurbulenceConfig, TurbulencePhaseScreen};
