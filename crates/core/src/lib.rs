//! # Habistat Core
//!
//! Core types and raster storage for the habistat artefact engine.
//!
//! This crate provides:
//! - `Raster`: a 2-D `f64` grid where missing samples are `NaN`
//! - `GeoTransform` and `Georef`: georeferencing carried from source to artefact
//! - `RasterStore`: GeoTIFF read/write with precision selection and atomic replace

pub mod error;
pub mod io;
pub mod raster;

pub use error::{Error, Result};
pub use io::{RasterStore, StoreOptions};
pub use raster::{GeoKeys, GeoTransform, Georef, Raster};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::io::{RasterStore, StoreOptions};
    pub use crate::raster::{GeoTransform, Georef, Raster};
}
