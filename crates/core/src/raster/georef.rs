//! Georeferencing metadata copied verbatim from source rasters to artefacts

use super::GeoTransform;
use serde::{Deserialize, Serialize};

/// ProjectedCSTypeGeoKey
const PROJECTED_CS_TYPE: u16 = 3072;
/// GeographicTypeGeoKey
const GEOGRAPHIC_TYPE: u16 = 2048;

/// Raw GeoTIFF key tags: GeoKeyDirectory (34735), GeoDoubleParams (34736)
/// and GeoAsciiParams (34737).
///
/// Kept undecoded so the coordinate system of a source raster survives into
/// its artefacts bit for bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoKeys {
    pub directory: Vec<u16>,
    pub double_params: Option<Vec<f64>>,
    pub ascii_params: Option<String>,
}

impl GeoKeys {
    /// Minimal key directory: GTModelTypeGeoKey = Projected,
    /// GTRasterTypeGeoKey = PixelIsArea.
    pub fn minimal_projected() -> Self {
        Self {
            directory: vec![
                1, 1, 0, 2, // version 1.1.0, 2 keys
                1024, 0, 1, 1,
                1025, 0, 1, 1,
            ],
            double_params: None,
            ascii_params: None,
        }
    }

    /// EPSG code from ProjectedCSTypeGeoKey, falling back to GeographicTypeGeoKey
    pub fn epsg(&self) -> Option<u32> {
        let dir = &self.directory;
        if dir.len() < 4 {
            return None;
        }
        let num_keys = dir[3] as usize;

        let mut geographic = None;
        for entry in dir[4..].chunks_exact(4).take(num_keys) {
            let (key_id, location, value) = (entry[0], entry[1], entry[3]);
            // location 0 means the value is stored inline
            if location != 0 || value == 0 {
                continue;
            }
            match key_id {
                PROJECTED_CS_TYPE => return Some(value as u32),
                GEOGRAPHIC_TYPE => geographic = Some(value as u32),
                _ => {}
            }
        }
        geographic
    }
}

/// Georeferencing of a raster: affine transform plus coordinate-system keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Georef {
    pub transform: GeoTransform,
    pub geokeys: Option<GeoKeys>,
}

impl Georef {
    pub fn new(transform: GeoTransform) -> Self {
        Self {
            transform,
            geokeys: None,
        }
    }

    pub fn with_geokeys(mut self, geokeys: GeoKeys) -> Self {
        self.geokeys = Some(geokeys);
        self
    }

    pub fn epsg(&self) -> Option<u32> {
        self.geokeys.as_ref().and_then(GeoKeys::epsg)
    }
}
