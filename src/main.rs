//! arcfit command line
//!
//! Runs the arc estimation pipeline described by a TOML configuration file with the
//! built-in integer rounding estimator (`method = 2`).
use std::process::ExitCode;

use arcfit::{
    estimator::baseline::RoundingEstimator, ExecutionMode, Pipeline, PipelineConfig,
};
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Batch estimation of InSAR point time series relative to a reference point
#[derive(Parser)]
#[command(name = "arcfit")]
#[command(version)]
#[command(after_help = "The built-in estimator serves integer rounding only: the configuration \
must set `method = 2` (the default, method 3, is rejected before any work).")]
struct Cli {
    /// TOML configuration file (must set `method = 2`)
    config: Utf8PathBuf,

    /// Override the execution strategy of the configuration (sequential | partitioned)
    #[arg(short, long)]
    mode: Option<ExecutionMode>,

    /// Process only the first N points
    #[arg(short, long)]
    num_points: Option<usize>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), arcfit::ArcfitError> {
    let mut config = PipelineConfig::from_file(&cli.config)?;
    if cli.num_points.is_some() {
        config = config.into_builder().num_points(cli.num_points).build()?;
    }
    let estimator = RoundingEstimator::for_method(config.method)?;
    info!("\n{config:#}");

    let output = Pipeline::new(config, estimator).run_from_disk(cli.mode)?;

    info!(
        reference = output.reference,
        points = output.results.n_points(),
        failed = output.results.failed().len(),
        "done"
    );
    Ok(())
}
