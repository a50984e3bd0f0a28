//! Habistat CLI - spatial-structure artefacts for monthly index rasters

mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

use habistat_algorithms::statistics::{local_std, StdKernel};
use habistat_core::{Raster, RasterStore};
use habistat_pipeline::{EngineConfig, ItemOutcome, RunController, RunEvent, RunSummary, StatisticKind};
use habistat_tiling::compute_tiled_with_progress;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "habistat")]
#[command(author, version, about = "Resumable local-statistic artefacts for NDVI/NDWI rasters", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// YAML engine configuration
    #[arg(short, long)]
    config: PathBuf,
    /// Recompute artefacts that already exist
    #[arg(long)]
    no_resume: bool,
    /// Local std window side (odd)
    #[arg(long)]
    window_size: Option<usize>,
    /// Lattice stride for Moran / Geary
    #[arg(long)]
    downsample: Option<usize>,
    /// Tile side for the local std scheduler
    #[arg(long)]
    tile_size: Option<usize>,
    /// Statistics to produce, e.g. `std,moran`
    #[arg(long, value_delimiter = ',')]
    statistics: Option<Vec<StatisticKind>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate every missing artefact under the configured directories
    Run {
        #[command(flatten)]
        args: ConfigArgs,
    },
    /// List base rasters with missing artefacts
    Pending {
        #[command(flatten)]
        args: ConfigArgs,
    },
    /// Generate artefacts for a single base raster, overwriting existing ones
    Process {
        #[command(flatten)]
        args: ConfigArgs,
        /// Base raster, e.g. NDVI_BerlinBB_2022_06.tif
        input: PathBuf,
    },
    /// Local standard deviation of one raster
    Std {
        /// Input raster file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Window side in cells (odd)
        #[arg(short, long, default_value = "11")]
        window: usize,
        /// Tile side in cells
        #[arg(short, long, default_value = "1024")]
        tile_size: usize,
        /// Kernel: auto, dense, generic
        #[arg(short, long, default_value = "auto")]
        kernel: String,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn load_config(args: &ConfigArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    if args.no_resume {
        config.resume = false;
    }
    if let Some(window_size) = args.window_size {
        config.window_size = window_size;
    }
    if let Some(downsample) = args.downsample {
        config.downsample = downsample;
    }
    if let Some(tile_size) = args.tile_size {
        config.tile_size = tile_size;
    }
    if let Some(statistics) = &args.statistics {
        config.statistics = statistics.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

fn read_raster(path: &Path) -> Result<Raster> {
    let pb = spinner("Reading raster...")?;
    let raster = RasterStore::default()
        .read(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn parse_kernel(s: &str) -> Result<StdKernel> {
    match s.to_lowercase().as_str() {
        "auto" => Ok(StdKernel::detect()),
        "dense" | "parallel" => Ok(StdKernel::Dense),
        "generic" | "filter" => Ok(StdKernel::Generic),
        _ => bail!("Unknown kernel: {}. Use: auto, dense, generic", s),
    }
}

fn print_summary(summary: &RunSummary) {
    println!("Run finished in {:.2?}", summary.elapsed);
    println!("  Completed:  {}", summary.completed);
    println!("  Partial:    {}", summary.partial);
    println!("  Skipped:    {}", summary.skipped);
    println!("  Up to date: {}", summary.up_to_date);
    for index in &summary.unscanned {
        println!("  Directory for {} could not be scanned", index);
    }
    for (path, error) in &summary.failures {
        println!("  {}: {}", path.display(), error);
    }
}

fn run(config: EngineConfig) -> Result<()> {
    let controller = RunController::new(config).context("Invalid configuration")?;
    let mut pb: Option<ProgressBar> = None;
    let mut style_error = None;
    let mut label = String::new();

    let summary = controller.run_with_progress(|event| match event {
        RunEvent::Planned { total } => match bar(total as u64) {
            Ok(b) => pb = Some(b),
            Err(e) => style_error = Some(e),
        },
        RunEvent::ItemStarted { item, .. } => {
            label = item.base.label();
            if let Some(pb) = &pb {
                pb.set_message(label.clone());
            }
        }
        RunEvent::Tile { done, total } => {
            if let Some(pb) = pb.as_ref().filter(|_| total > 1) {
                pb.set_message(format!("{label} (tile {done}/{total})"));
            }
        }
        RunEvent::ItemFinished { outcome, .. } => {
            if let Some(pb) = &pb {
                if let ItemOutcome::Skipped { error, .. } = outcome {
                    pb.println(format!("{label} skipped: {error}"));
                }
                pb.inc(1);
            }
        }
    });

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    if let Some(e) = style_error {
        tracing::warn!("progress bar unavailable: {e}");
    }
    print_summary(&summary);
    Ok(())
}

// ─── Entry point ────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => {
            let config = load_config(&args)?;
            logging::init(cli.verbose, Some(&config.log_path()))?;
            info!(config = %args.config.display(), resume = config.resume, "run started");
            run(config)?;
        }

        Commands::Pending { args } => {
            logging::init(cli.verbose, None)?;
            let config = load_config(&args)?;
            let controller = RunController::new(config)?;
            let pending = controller.pending().context("Failed to scan raster directories")?;
            if pending.is_empty() {
                println!("No pending artefacts");
            }
            for item in &pending {
                let missing: Vec<&str> = item.missing.iter().map(|k| k.tag()).collect();
                println!("{}: {}", item.base.label(), missing.join(", "));
            }
        }

        Commands::Process { args, input } => {
            let config = load_config(&args)?;
            logging::init(cli.verbose, Some(&config.log_path()))?;
            let statistics: BTreeSet<StatisticKind> = config.statistic_set();
            let controller = RunController::new(config)?;

            let pb = spinner(&format!("Processing {}...", input.display()))?;
            let start = Instant::now();
            let outcome = controller
                .process_file(&input, &statistics)
                .with_context(|| format!("Cannot process {}", input.display()))?;
            pb.finish_and_clear();

            match outcome {
                ItemOutcome::Done { produced, failed } => {
                    for statistic in produced {
                        println!("{} saved", statistic);
                    }
                    for failure in failed {
                        println!("{} skipped: {}", failure.statistic, failure.error);
                    }
                    println!("  Processing time: {:.2?}", start.elapsed());
                }
                ItemOutcome::Skipped { error, .. } => bail!("{} skipped: {}", input.display(), error),
            }
        }

        Commands::Std {
            input,
            output,
            window,
            tile_size,
            kernel,
        } => {
            logging::init(cli.verbose, None)?;
            let kernel = parse_kernel(&kernel)?;
            let raster = read_raster(&input)?;

            let start = Instant::now();
            let pb = bar(0)?;
            let result = compute_tiled_with_progress(
                raster.view(),
                tile_size,
                window / 2,
                |tile| local_std(tile, window, kernel),
                |done, total| {
                    pb.set_length(total as u64);
                    pb.set_position(done as u64);
                },
            )
            .context("Failed to calculate local standard deviation")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            let pb = spinner("Writing output...")?;
            RasterStore::default()
                .write(&output, raster.georef(), result)
                .context("Failed to write output")?;
            pb.finish_and_clear();

            println!("Local std saved to: {}", output.display());
            println!("  Processing time: {:.2?}", elapsed);
        }

        Commands::Info { input } => {
            logging::init(cli.verbose, None)?;
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();
            let transform = raster.transform();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Pixel size: {} x {}", transform.pixel_width, transform.pixel_height.abs());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(epsg) = raster.georef().epsg() {
                println!("CRS: EPSG:{}", epsg);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }
    }

    Ok(())
}
