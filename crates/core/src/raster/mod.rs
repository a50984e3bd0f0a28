//! Raster data structures and georeferencing

mod geotransform;
mod georef;
mod grid;

pub use geotransform::GeoTransform;
pub use georef::{GeoKeys, Georef};
pub use grid::{Raster, RasterStatistics};
