//! Atmospheric turbulence and time-resolved imaging

pub mod frames;
pub mod phase_screen;

pub use frames::{FluxAccumulator, Frame, FrameProducer};
pub use phase_screen::{PhaseScreen, TurbulenceConfig, TurbulencePhaseScreen};
