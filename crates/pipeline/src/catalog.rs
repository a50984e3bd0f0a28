//! Artefact catalog: which base rasters still need which statistics
//!
//! The catalog is rebuilt by a directory scan on every call. No run state
//! is persisted, so deleting an artefact or leaving a scratch file behind
//! after a crash simply makes the item pending again.

use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::naming::{ArtefactKey, BaseName, StatisticKind};
use habistat_core::io::read_geotiff_dimensions;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A base raster and the statistics not yet produced for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub base_path: PathBuf,
    pub base: BaseName,
    pub missing: BTreeSet<StatisticKind>,
}

impl WorkItem {
    pub fn is_pending(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn artefact_key(&self, statistic: StatisticKind) -> ArtefactKey {
        self.base.artefact(statistic)
    }

    /// Where the artefact for `statistic` goes: next to the base raster
    pub fn artefact_path(&self, statistic: StatisticKind, extension: &str) -> PathBuf {
        let dir = self.base_path.parent().unwrap_or_else(|| Path::new(""));
        self.artefact_key(statistic).path_in(dir, extension)
    }
}

/// Result of scanning one raster directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogScan {
    /// Items with at least one missing statistic
    pub pending: Vec<WorkItem>,
    /// Base rasters whose requested artefacts all exist
    pub complete: Vec<PathBuf>,
}

/// Scans raster directories against the artefact naming convention
#[derive(Debug, Clone)]
pub struct ArtefactCatalog {
    region: String,
    extension: String,
    statistics: BTreeSet<StatisticKind>,
    resume: bool,
    verify: bool,
}

impl ArtefactCatalog {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            region: config.region.clone(),
            extension: config.extension.clone(),
            statistics: config.statistic_set(),
            resume: config.resume,
            verify: config.verify_artefacts,
        }
    }

    /// Statistics demanded of every base raster
    pub fn statistics(&self) -> &BTreeSet<StatisticKind> {
        &self.statistics
    }

    /// Base rasters of `index` in `dir`, sorted by file name
    pub fn base_rasters(&self, dir: &Path, index: &str) -> Result<Vec<(PathBuf, BaseName)>> {
        let scan_err = |source: std::io::Error| PipelineError::Scan {
            path: dir.to_path_buf(),
            source,
        };

        let mut found = Vec::new();
        for entry in fs::read_dir(dir).map_err(scan_err)? {
            let entry = entry.map_err(scan_err)?;
            // follows symlinks, matching the artefact check
            if !entry.path().is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(base) = BaseName::parse(name, index, &self.region, &self.extension) {
                found.push((entry.path(), base));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    /// Split the base rasters of `index` in `dir` into pending and complete.
    pub fn scan(&self, dir: &Path, index: &str) -> Result<CatalogScan> {
        let mut scan = CatalogScan::default();

        for (base_path, base) in self.base_rasters(dir, index)? {
            let item = self.classify(base_path, base);
            if item.is_pending() {
                scan.pending.push(item);
            } else {
                scan.complete.push(item.base_path);
            }
        }

        debug!(
            dir = %dir.display(),
            index,
            pending = scan.pending.len(),
            complete = scan.complete.len(),
            "catalog scanned"
        );
        Ok(scan)
    }

    /// Work items of `index` in `dir` with at least one missing statistic
    pub fn find_pending(&self, dir: &Path, index: &str) -> Result<Vec<WorkItem>> {
        Ok(self.scan(dir, index)?.pending)
    }

    /// Work item for one base raster
    pub fn classify(&self, base_path: PathBuf, base: BaseName) -> WorkItem {
        let missing = if self.resume {
            let base_dims = if self.verify {
                read_geotiff_dimensions(&base_path).ok()
            } else {
                None
            };
            let probe = WorkItem {
                base_path: base_path.clone(),
                base: base.clone(),
                missing: BTreeSet::new(),
            };
            self.statistics
                .iter()
                .copied()
                .filter(|&k| !self.artefact_present(&probe.artefact_path(k, &self.extension), base_dims))
                .collect()
        } else {
            self.statistics.clone()
        };

        WorkItem {
            base_path,
            base,
            missing,
        }
    }

    /// Whether the artefact at `path` counts as produced.
    ///
    /// In verify mode the artefact header must decode and match the base
    /// raster's dimensions; an unreadable base raster makes every artefact
    /// count as missing so the item is retried.
    fn artefact_present(&self, path: &Path, base_dims: Option<(usize, usize)>) -> bool {
        if !path.is_file() {
            return false;
        }
        if !self.verify {
            return true;
        }
        match (read_geotiff_dimensions(path), base_dims) {
            (Ok(dims), Some(expected)) if dims == expected => true,
            (Ok(dims), expected) => {
                debug!(path = %path.display(), ?dims, ?expected, "artefact does not match its base raster");
                false
            }
            (Err(e), _) => {
                debug!(path = %path.display(), error = %e, "artefact unreadable");
                false
            }
        }
    }
}
