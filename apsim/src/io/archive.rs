//! JSON archives of an optical system and its incident light field
//!
//! An archive stores the scalar optics parameters plus the raw light field
//! arrays. Wavelengths are not stored separately; they are recovered from the
//! light field when loading, and the grid planner is replayed so the loaded
//! system is identical to the saved one.
//!
//! Archives may be gzip compressed. Compression is detected from the gzip
//! magic bytes on load, so the file extension does not matter. The same
//! reader and writer back [`IncidentLightField::save`] and
//! [`IncidentLightField::load`].

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::field::light_field::IncidentLightField;
use crate::optics::config::OpticalSystemConfig;
use crate::optics::error::OpticsError;
use crate::optics::fraunhofer::FraunhoferOptics;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// On-disk representation of a [`FraunhoferOptics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticsArchive {
    pub aperture_diameter: f64,
    pub focal_length: f64,
    pub field_of_view_x: f64,
    pub field_of_view_y: f64,
    pub max_angular_coarseness: f64,
    pub light_field: IncidentLightField,
}

impl OpticsArchive {
    pub fn from_optics(optics: &FraunhoferOptics) -> Self {
        let config = optics.config();
        Self {
            aperture_diameter: config.aperture_diameter,
            focal_length: config.focal_length,
            field_of_view_x: config.field_of_view_x,
            field_of_view_y: config.field_of_view_y,
            max_angular_coarseness: config.max_angular_coarseness,
            light_field: optics.light_field().clone(),
        }
    }

    /// Replay the planner with the stored parameters and restore the field
    pub fn into_optics(self) -> Result<FraunhoferOptics, OpticsError> {
        let config = OpticalSystemConfig::new(
            self.aperture_diameter,
            self.focal_length,
            self.field_of_view_x,
            self.field_of_view_y,
            self.max_angular_coarseness,
            self.light_field.wavelengths().to_vec(),
        )?;
        FraunhoferOptics::with_light_field(config, self.light_field)
    }
}

/// Serialize `value` as JSON to `path`, gzip compressed if `compressed` is set
pub(crate) fn write_json<T: Serialize + ?Sized>(
    value: &T,
    path: &Path,
    compressed: bool,
) -> Result<(), OpticsError> {
    let writer = BufWriter::new(File::create(path)?);

    if compressed {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        serde_json::to_writer(&mut encoder, value)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = writer;
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    Ok(())
}

/// Read JSON written by [`write_json`], compressed or not
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, OpticsError> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;

    let value = if bytes.starts_with(&GZIP_MAGIC) {
        serde_json::from_reader(GzDecoder::new(bytes.as_slice()))?
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok(value)
}

/// Write `optics` to `path`, gzip compressed if `compressed` is set
pub fn save(optics: &FraunhoferOptics, path: &Path, compressed: bool) -> Result<(), OpticsError> {
    write_json(&OpticsArchive::from_optics(optics), path, compressed)?;
    info!(
        "Saved optical system to {} ({})",
        path.display(),
        if compressed { "gzip" } else { "plain" }
    );
    Ok(())
}

/// Read an archive written by [`save`], compressed or not
pub fn load(path: &Path) -> Result<FraunhoferOptics, OpticsError> {
    let archive: OpticsArchive = read_json(path)?;
    info!("Loaded optical system from {}", path.display());
    archive.into_optics()
}
