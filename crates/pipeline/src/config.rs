//! Engine configuration
//!
//! An [`EngineConfig`] is an explicit value handed to the run controller.
//! It can be built in code or loaded from YAML:
//!
//! ```yaml
//! base_dir: /data/rasters
//! raster_dirs:
//!   NDVI: ndvi
//!   NDWI: ndwi
//! window_size: 11
//! downsample: 5
//! tile_size: 1024
//! resume: true
//! ```

use crate::error::{PipelineError, Result};
use crate::naming::StatisticKind;
use habistat_algorithms::statistics::{Contiguity, MissingFill};
use habistat_core::io::DEFAULT_BIGTIFF_THRESHOLD;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Log file name used when none is configured
pub const DEFAULT_LOG_FILE: &str = "artefact_generation.log";

fn default_region() -> String {
    "BerlinBB".into()
}

fn default_extension() -> String {
    "tif".into()
}

fn default_window_size() -> usize {
    11
}

fn default_downsample() -> usize {
    5
}

fn default_tile_size() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_bigtiff_threshold() -> u64 {
    DEFAULT_BIGTIFF_THRESHOLD
}

fn default_statistics() -> Vec<StatisticKind> {
    StatisticKind::ALL.to_vec()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Root directory holding the per-index raster directories
    pub base_dir: PathBuf,
    /// Index kind (e.g. `NDVI`) to its raster subdirectory under `base_dir`
    pub raster_dirs: BTreeMap<String, PathBuf>,
    /// Region tag in base raster names
    #[serde(default = "default_region")]
    pub region: String,
    /// Raster file extension, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Side of the local std window; odd
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Lattice stride for autocorrelation
    #[serde(default = "default_downsample")]
    pub downsample: usize,
    /// Tile side for the local std scheduler
    #[serde(default = "default_tile_size")]
    pub tile_size: usize,
    /// Skip statistics whose artefact already exists
    #[serde(default = "default_true")]
    pub resume: bool,
    #[serde(default)]
    pub contiguity: Contiguity,
    #[serde(default)]
    pub missing_fill: MissingFill,
    /// Count an artefact as present only if its header decodes and its
    /// dimensions match the base raster
    #[serde(default = "default_true")]
    pub verify_artefacts: bool,
    #[serde(default = "default_bigtiff_threshold")]
    pub bigtiff_threshold_bytes: u64,
    /// Statistics to produce
    #[serde(default = "default_statistics")]
    pub statistics: Vec<StatisticKind>,
    /// Append-only run log; defaults to `<base_dir>/artefact_generation.log`
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl EngineConfig {
    /// Configuration with defaults for everything but the required keys
    pub fn new(base_dir: impl Into<PathBuf>, raster_dirs: BTreeMap<String, PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            raster_dirs,
            region: default_region(),
            extension: default_extension(),
            window_size: default_window_size(),
            downsample: default_downsample(),
            tile_size: default_tile_size(),
            resume: true,
            contiguity: Contiguity::default(),
            missing_fill: MissingFill::default(),
            verify_artefacts: true,
            bigtiff_threshold_bytes: default_bigtiff_threshold(),
            statistics: default_statistics(),
            log_file: None,
        }
    }

    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load and validate a YAML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text).map_err(|source| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check required keys and parameter ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::Config(msg));

        if self.base_dir.as_os_str().is_empty() {
            return invalid("base_dir is required".into());
        }
        if self.raster_dirs.is_empty() {
            return invalid("raster_dirs must name at least one index".into());
        }
        if let Some(index) = self.raster_dirs.keys().find(|k| k.is_empty() || k.contains('_')) {
            return invalid(format!("index kind '{index}' must be non-empty and contain no '_'"));
        }
        if self.region.is_empty() || self.region.contains('_') {
            return invalid(format!("region '{}' must be non-empty and contain no '_'", self.region));
        }
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return invalid(format!("extension '{}' must be given without a leading dot", self.extension));
        }
        if self.window_size == 0 || self.window_size % 2 == 0 {
            return invalid(format!("window_size must be odd and >= 1, got {}", self.window_size));
        }
        if self.downsample == 0 {
            return invalid("downsample must be >= 1".into());
        }
        if self.tile_size == 0 {
            return invalid("tile_size must be > 0".into());
        }
        if self.statistics.is_empty() {
            return invalid("statistics must not be empty".into());
        }
        Ok(())
    }

    /// Requested statistics, deduplicated
    pub fn statistic_set(&self) -> BTreeSet<StatisticKind> {
        self.statistics.iter().copied().collect()
    }

    /// Directory holding the base rasters (and artefacts) of `index`
    pub fn raster_dir(&self, index: &str) -> Option<PathBuf> {
        self.raster_dirs.get(index).map(|dir| self.base_dir.join(dir))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.base_dir.join(DEFAULT_LOG_FILE))
    }

    /// Neighborhood radius of the local std window
    pub fn window_radius(&self) -> usize {
        self.window_size / 2
    }
}
