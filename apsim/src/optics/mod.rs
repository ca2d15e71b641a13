//! Fraunhofer diffraction optics
//!
//! The [`grid`] planner derives the aperture/image sampling once per
//! configuration, [`diffraction`] turns aperture fields into image fluxes and
//! [`energy`] provides the power integrals used to check conservation.
//! [`fraunhofer::FraunhoferOptics`] owns a plan plus an incident light field.

pub mod config;
pub mod diffraction;
pub mod energy;
pub mod error;
pub mod fraunhofer;
pub mod grid;

pub use config::OpticalSystemConfig;
pub use error::OpticsError;
pub use fraunhofer::FraunhoferOptics;
pub use grid::{plan, GridPlan};
