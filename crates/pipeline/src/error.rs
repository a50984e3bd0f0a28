//! Error types for the artefact pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot read configuration {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a base raster name: {0}")]
    UnrecognizedName(PathBuf),

    #[error(transparent)]
    Core(#[from] habistat_core::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// `err` and its sources joined by `": "`
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
