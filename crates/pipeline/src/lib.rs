//! # Habistat Pipeline
//!
//! The resumable artefact engine.
//!
//! - **config**: [`EngineConfig`], the explicit run configuration
//! - **naming**: base raster and artefact file name conventions
//! - **catalog**: directory scan producing the pending work list
//! - **controller**: per-item state machine with failure isolation
//! - **diagnostics**: resource snapshots for failure logs
//!
//! ```no_run
//! use habistat_pipeline::{EngineConfig, RunController};
//!
//! let config = EngineConfig::load("habistat.yaml")?;
//! let summary = RunController::new(config)?.run();
//! println!("{} completed, {} skipped", summary.completed, summary.skipped);
//! # Ok::<(), habistat_pipeline::PipelineError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod naming;

pub use catalog::{ArtefactCatalog, CatalogScan, WorkItem};
pub use config::EngineConfig;
pub use controller::{ItemOutcome, ItemState, RunController, RunEvent, RunSummary, StatisticFailure};
pub use diagnostics::ResourceSnapshot;
pub use error::{PipelineError, Result};
pub use naming::{ArtefactKey, BaseName, Period, StatisticKind};
