//! Error types for habistat

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for raster and statistic operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TIFF error in {path}: {reason}")]
    Tiff { path: PathBuf, reason: String },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    /// A write could not be committed. `temp_path` is the partially or fully
    /// written scratch file, left on disk for inspection.
    #[error("failed to store {path} (temporary copy: {temp_path}): {source}")]
    Storage {
        path: PathBuf,
        temp_path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a `tiff` crate error with the file it came from
    pub fn tiff(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Error::Tiff {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// Result type alias for habistat operations
pub type Result<T> = std::result::Result<T, Error>;
