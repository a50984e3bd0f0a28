//! Reading and writing GeoTIFF rasters

mod geotiff;
mod store;

pub use geotiff::{
    encode_geotiff, read_geotiff, read_geotiff_dimensions, write_geotiff, EncodeOptions, SamplePrecision,
};
pub use store::{
    partial_path, select_precision, RasterStore, StoreOptions, WriteReport, DEFAULT_BIGTIFF_THRESHOLD,
    PARTIAL_SUFFIX,
};
