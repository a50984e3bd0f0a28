//! Run controller: one resumable pass over every pending base raster
//!
//! Items are processed strictly one at a time. Per item:
//!
//! `Loaded -> StdComputed -> StdSaved -> AutocorrComputed -> AutocorrSaved -> Done`
//!
//! A load or storage failure skips the item; a computation failure skips
//! only the affected statistic. Nothing is retried within a run: the next
//! run finds the missing artefacts through the catalog.

use crate::catalog::{ArtefactCatalog, WorkItem};
use crate::config::EngineConfig;
use crate::diagnostics::ResourceSnapshot;
use crate::error::{error_chain, PipelineError, Result};
use crate::naming::{BaseName, StatisticKind};
use habistat_algorithms::statistics::{local_std, AutocorrelationLattice, LocalGeary, StdKernel};
use habistat_core::{Raster, RasterStore, StoreOptions};
use habistat_tiling::compute_tiled_with_progress;
use ndarray::Array2;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Last state an item reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Loaded,
    StdComputed,
    StdSaved,
    AutocorrComputed,
    AutocorrSaved,
    Done,
}

/// A statistic that could not be computed for an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticFailure {
    pub statistic: StatisticKind,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item reached `Done`; `failed` lists statistics that were skipped
    Done {
        produced: Vec<StatisticKind>,
        failed: Vec<StatisticFailure>,
    },
    /// The item was abandoned after `reached` (`None`: it never loaded)
    Skipped {
        reached: Option<ItemState>,
        error: String,
    },
}

impl ItemOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, ItemOutcome::Done { failed, .. } if failed.is_empty())
    }
}

/// Progress notifications from a run
#[derive(Debug, Clone, Copy)]
pub enum RunEvent<'a> {
    Planned { total: usize },
    ItemStarted { item: &'a WorkItem, position: usize, total: usize },
    Tile { done: usize, total: usize },
    ItemFinished { item: &'a WorkItem, outcome: &'a ItemOutcome },
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Items with every missing statistic produced
    pub completed: usize,
    /// Items that finished with at least one statistic skipped
    pub partial: usize,
    /// Items abandoned on a load or storage failure
    pub skipped: usize,
    /// Base rasters that needed nothing
    pub up_to_date: usize,
    /// Index kinds whose raster directory could not be scanned
    pub unscanned: Vec<String>,
    /// Base raster and error of every partial or skipped item
    pub failures: Vec<(PathBuf, String)>,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record(&mut self, item: &WorkItem, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Done { failed, .. } if failed.is_empty() => self.completed += 1,
            ItemOutcome::Done { failed, .. } => {
                self.partial += 1;
                let detail = failed
                    .iter()
                    .map(|f| format!("{}: {}", f.statistic, f.error))
                    .collect::<Vec<_>>()
                    .join("; ");
                self.failures.push((item.base_path.clone(), detail));
            }
            ItemOutcome::Skipped { error, .. } => {
                self.skipped += 1;
                self.failures.push((item.base_path.clone(), error.clone()));
            }
        }
    }

    /// Nothing failed
    pub fn is_clean(&self) -> bool {
        self.partial == 0 && self.skipped == 0 && self.unscanned.is_empty()
    }
}

#[derive(Default)]
struct ItemReport {
    produced: Vec<StatisticKind>,
    failed: Vec<StatisticFailure>,
}

impl ItemReport {
    fn fail(&mut self, item: &WorkItem, statistic: StatisticKind, err: &dyn std::error::Error) {
        let error = error_chain(err);
        warn!(
            index = %item.base.index,
            period = %item.base.period,
            %statistic,
            error = %error,
            "statistic skipped"
        );
        self.failed.push(StatisticFailure { statistic, error });
    }
}

/// Drives the artefact engine over the configured raster directories.
pub struct RunController {
    config: EngineConfig,
    catalog: ArtefactCatalog,
    store: RasterStore,
    std_kernel: StdKernel,
    geary: LocalGeary,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("config", &self.config)
            .field("std_kernel", &self.std_kernel)
            .field("geary", &self.geary)
            .finish()
    }
}

impl RunController {
    /// Validates `config`; an invalid configuration never reaches any item.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = RasterStore::new(StoreOptions {
            bigtiff_threshold_bytes: config.bigtiff_threshold_bytes,
            ..StoreOptions::default()
        });
        Ok(Self {
            catalog: ArtefactCatalog::new(&config),
            store,
            std_kernel: StdKernel::detect(),
            geary: LocalGeary::default(),
            config,
        })
    }

    pub fn with_std_kernel(mut self, kernel: StdKernel) -> Self {
        self.std_kernel = kernel;
        self
    }

    pub fn with_geary(mut self, geary: LocalGeary) -> Self {
        self.geary = geary;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ArtefactCatalog {
        &self.catalog
    }

    /// Pending work across all configured indices
    pub fn pending(&self) -> Result<Vec<WorkItem>> {
        let mut work = Vec::new();
        for index in self.config.raster_dirs.keys() {
            let dir = self.index_dir(index);
            work.extend(self.catalog.find_pending(&dir, index)?);
        }
        Ok(work)
    }

    pub fn run(&self) -> RunSummary {
        self.run_with_progress(|_| {})
    }

    /// Process every pending item, reporting progress through `on_event`.
    ///
    /// Per-item and per-directory failures are logged and counted, never
    /// returned.
    pub fn run_with_progress(&self, mut on_event: impl FnMut(RunEvent<'_>)) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut work = Vec::new();

        for index in self.config.raster_dirs.keys() {
            let dir = self.index_dir(index);
            match self.catalog.scan(&dir, index) {
                Ok(scan) => {
                    summary.up_to_date += scan.complete.len();
                    work.extend(scan.pending);
                }
                Err(e) => {
                    error!(index = %index, error = %error_chain(&e), "raster directory skipped");
                    summary.unscanned.push(index.clone());
                }
            }
        }

        let total = work.len();
        info!(pending = total, up_to_date = summary.up_to_date, "run planned");
        on_event(RunEvent::Planned { total });

        for (position, item) in work.iter().enumerate() {
            on_event(RunEvent::ItemStarted {
                item,
                position: position + 1,
                total,
            });
            let outcome = self.process_item(item, &mut on_event);
            summary.record(item, &outcome);
            on_event(RunEvent::ItemFinished {
                item,
                outcome: &outcome,
            });
        }

        summary.elapsed = started.elapsed();
        info!(
            completed = summary.completed,
            partial = summary.partial,
            skipped = summary.skipped,
            up_to_date = summary.up_to_date,
            elapsed_s = summary.elapsed.as_secs_f64(),
            "run finished"
        );
        summary
    }

    /// Produce `statistics` for one base raster, regardless of what exists.
    pub fn process_file(&self, path: &Path, statistics: &BTreeSet<StatisticKind>) -> Result<ItemOutcome> {
        let base = self.parse_base_name(path)?;
        let item = WorkItem {
            base_path: path.to_path_buf(),
            base,
            missing: statistics.clone(),
        };
        Ok(self.process_item(&item, &mut |_| {}))
    }

    fn parse_base_name(&self, path: &Path) -> Result<BaseName> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::UnrecognizedName(path.to_path_buf()))?;
        self.config
            .raster_dirs
            .keys()
            .find_map(|index| BaseName::parse(name, index, &self.config.region, &self.config.extension))
            .ok_or_else(|| PipelineError::UnrecognizedName(path.to_path_buf()))
    }

    fn index_dir(&self, index: &str) -> PathBuf {
        self.config
            .raster_dir(index)
            .unwrap_or_else(|| self.config.base_dir.clone())
    }

    /// Run one item through its state machine; failures end in `Skipped`.
    pub fn process_item(&self, item: &WorkItem, on_event: &mut dyn FnMut(RunEvent<'_>)) -> ItemOutcome {
        let started = Instant::now();
        info!(
            index = %item.base.index,
            period = %item.base.period,
            path = %item.base_path.display(),
            missing = ?item.missing,
            "item started"
        );

        let mut reached = None;
        match self.advance(item, &mut reached, on_event) {
            Ok(report) => {
                info!(
                    index = %item.base.index,
                    period = %item.base.period,
                    produced = ?report.produced,
                    failed = report.failed.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "item done"
                );
                ItemOutcome::Done {
                    produced: report.produced,
                    failed: report.failed,
                }
            }
            Err(e) => {
                let error = error_chain(&e);
                error!(
                    index = %item.base.index,
                    period = %item.base.period,
                    path = %item.base_path.display(),
                    state = ?reached,
                    error = %error,
                    resources = %ResourceSnapshot::capture(),
                    "item skipped"
                );
                ItemOutcome::Skipped { reached, error }
            }
        }
    }

    fn advance(
        &self,
        item: &WorkItem,
        reached: &mut Option<ItemState>,
        on_event: &mut dyn FnMut(RunEvent<'_>),
    ) -> habistat_core::Result<ItemReport> {
        let raster = self.store.read(&item.base_path)?;
        *reached = Some(ItemState::Loaded);
        let mut report = ItemReport::default();

        if item.missing.contains(&StatisticKind::Std) {
            match self.compute_std(&raster, on_event) {
                Ok(std) => {
                    *reached = Some(ItemState::StdComputed);
                    self.save(item, StatisticKind::Std, &raster, std)?;
                    report.produced.push(StatisticKind::Std);
                    *reached = Some(ItemState::StdSaved);
                }
                Err(e) => report.fail(item, StatisticKind::Std, &e),
            }
        }

        let autocorrelation: Vec<StatisticKind> =
            item.missing.iter().copied().filter(|k| k.is_autocorrelation()).collect();
        if !autocorrelation.is_empty() {
            match AutocorrelationLattice::prepare(
                raster.view(),
                self.config.downsample,
                self.config.contiguity,
                self.config.missing_fill,
            ) {
                Ok(lattice) => {
                    let mut computed = Vec::with_capacity(autocorrelation.len());
                    for statistic in autocorrelation {
                        match self.compute_autocorrelation(&lattice, statistic) {
                            Ok(data) => computed.push((statistic, data)),
                            Err(e) => report.fail(item, statistic, &e),
                        }
                    }
                    *reached = Some(ItemState::AutocorrComputed);

                    for (statistic, data) in computed {
                        self.save(item, statistic, &raster, data)?;
                        report.produced.push(statistic);
                    }
                    *reached = Some(ItemState::AutocorrSaved);
                }
                Err(e) => {
                    for statistic in autocorrelation {
                        report.fail(item, statistic, &e);
                    }
                }
            }
        }

        *reached = Some(ItemState::Done);
        Ok(report)
    }

    fn compute_std(
        &self,
        raster: &Raster,
        on_event: &mut dyn FnMut(RunEvent<'_>),
    ) -> habistat_core::Result<Array2<f64>> {
        let window = self.config.window_size;
        compute_tiled_with_progress(
            raster.view(),
            self.config.tile_size,
            self.config.window_radius(),
            |tile| local_std(tile, window, self.std_kernel),
            |done, total| on_event(RunEvent::Tile { done, total }),
        )
    }

    fn compute_autocorrelation(
        &self,
        lattice: &AutocorrelationLattice,
        statistic: StatisticKind,
    ) -> habistat_core::Result<Array2<f64>> {
        match statistic {
            StatisticKind::Moran => lattice.moran(),
            StatisticKind::Geary => {
                let (data, source) = lattice.geary(&self.geary)?;
                info!(source = ?source, "local Geary computed");
                Ok(data)
            }
            StatisticKind::Std => Err(habistat_core::Error::Algorithm(
                "local std is not an autocorrelation statistic".into(),
            )),
        }
    }

    fn save(
        &self,
        item: &WorkItem,
        statistic: StatisticKind,
        raster: &Raster,
        data: Array2<f64>,
    ) -> habistat_core::Result<()> {
        let path = item.artefact_path(statistic, &self.config.extension);
        let started = Instant::now();
        let report = self.store.write(&path, raster.georef(), data)?;
        info!(
            index = %item.base.index,
            period = %item.base.period,
            %statistic,
            path = %path.display(),
            precision = ?report.precision,
            bigtiff = report.bigtiff,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "artefact saved"
        );
        Ok(())
    }
}
