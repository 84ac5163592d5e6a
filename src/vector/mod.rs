//! Reading and writing vector datasets.
//!
//! Features are exchanged as `geojson::Feature` values regardless of the file
//! format on disk, so callers never touch format-specific types.
mod geojson_file;
mod gpkg;
mod shp;

use crate::error::Error;
use anyhow::Result;
use geojson::Feature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// EPSG code of WGS 84 longitude/latitude.
pub const WGS84: u32 = 4326;

/// Output encodings for feature tables.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VectorFormat {
    #[default]
    #[serde(rename = "GeoJSON")]
    GeoJson,
    #[serde(rename = "GPKG")]
    GeoPackage,
}

impl VectorFormat {
    /// Maps a driver name to a format: `GeoJSON` selects GeoJSON, any other
    /// name selects GeoPackage.
    pub fn from_driver(driver: &str) -> Self {
        if driver.eq_ignore_ascii_case("geojson") {
            Self::GeoJson
        } else {
            Self::GeoPackage
        }
    }

    pub fn driver(&self) -> &'static str {
        match self {
            Self::GeoJson => "GeoJSON",
            Self::GeoPackage => "GPKG",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::GeoJson => "geojson",
            Self::GeoPackage => "gpkg",
        }
    }
}

impl fmt::Display for VectorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver())
    }
}

/// Reads every feature of the vector file at `path`.
///
/// The backend is picked from the file extension: `.geojson`/`.json`,
/// `.gpkg` and `.shp` are understood.
pub fn read_vector_file<P: AsRef<Path>>(path: P) -> Result<Vec<Feature>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "geojson" | "json" => geojson_file::read(path),
        "gpkg" => gpkg::read(path),
        "shp" => shp::read(path),
        _ => Err(Error::UnsupportedAoi(format!(
            "unrecognised vector file extension: {}",
            path.display()
        ))
        .into()),
    }
}

/// Writes `features` as a single table to a new file at `path`.
///
/// Fails with [`Error::OutputExists`] if `path` is already present.
pub fn write_vector_table<P: AsRef<Path>>(
    features: &[Feature],
    path: P,
    format: VectorFormat,
    epsg: u32,
) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        return Err(Error::OutputExists(path.to_path_buf()).into());
    }
    match format {
        VectorFormat::GeoJson => geojson_file::write(features, path, epsg),
        VectorFormat::GeoPackage => gpkg::write(features, path, epsg),
    }
}
