//! Persistence of optical systems

pub mod archive;

pub use archive::{load, save, OpticsArchive};
