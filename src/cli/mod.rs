//! Command-line interface for grid reconstruction.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::core::loaders::{load_table_csv, SampleTable};
use crate::core::writers::{write_domain_yaml, write_raster_csv};
use crate::hypertable::{axis_keys, Hypertable};
use crate::processors::rasterize::SquashMetric;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "hypergrid")]
#[command(about = "Reconstruct the regular grid behind scattered scan samples", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer and print the grid behind a CSV's coordinate columns
    Inspect {
        /// Input CSV file with a header row
        input: PathBuf,
        /// Coordinate columns, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        axes: Vec<String>,
        /// Also write the inferred domain as YAML
        #[arg(long)]
        domain_out: Option<PathBuf>,
    },

    /// Rasterize a CSV onto its inferred grid and write one row per cell
    Rasterize {
        /// Input CSV file with a header row
        input: PathBuf,
        /// Output CSV file
        output: PathBuf,
        /// Coordinate columns, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        axes: Vec<String>,
        /// Axes to keep; every other axis is squashed
        #[arg(short, long, value_delimiter = ',')]
        keep: Vec<String>,
        /// How samples sharing a cell are combined (mean, sum, median)
        #[arg(short, long)]
        metric: Option<SquashMetric>,
        /// Data columns (defaults to every non-coordinate column)
        #[arg(short, long, value_delimiter = ',')]
        data: Vec<String>,
        /// Also write the domain used as YAML
        #[arg(long)]
        domain_out: Option<PathBuf>,
    },

    /// Write the default configuration to a YAML file
    Config {
        /// Output YAML file
        output: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 38 {
            let head: String = value.chars().take(35).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<19}: {:<38} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Inspect {
            input,
            axes,
            domain_out,
        } => cmd_inspect(&input, &axes, domain_out.as_deref(), &config),
        Commands::Rasterize {
            input,
            output,
            axes,
            keep,
            metric,
            data,
            domain_out,
        } => cmd_rasterize(
            &input,
            &output,
            &axes,
            &keep,
            metric,
            &data,
            domain_out.as_deref(),
            &config,
        ),
        Commands::Config { output } => cmd_config(&output, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_inspect(
    input: &Path,
    axes: &[String],
    domain_out: Option<&Path>,
    config: &PipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    let keys = axis_keys(axes);

    let spinner = create_spinner("Loading samples...");
    let table = load_table_csv(input, &keys, &[])
        .with_context(|| format!("failed to load {}", input.display()))?;

    spinner.set_message("Inferring grid geometry...");
    let hypertable = Hypertable::from_table(Arc::new(table), keys, &config.reconstruction);
    spinner.finish_and_clear();
    let hypertable = hypertable.context("grid reconstruction failed")?;

    let domain = hypertable.domain();
    println!("{}", domain);

    if let Some(path) = domain_out {
        write_domain_yaml(path, domain)?;
    }

    let alignment = hypertable.alignment().context("samples do not fit the inferred grid")?;

    print_summary(
        "Inspection Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Samples", hypertable.table().num_rows().to_string()),
            ("Grid shape", format!("{:?}", domain.shape())),
            ("Empty cells", alignment.missing_cells().to_string()),
            ("Shared cells", alignment.shared_cells().to_string()),
            ("Skipped samples", alignment.skipped().len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_rasterize(
    input: &Path,
    output: &Path,
    axes: &[String],
    keep: &[String],
    metric: Option<SquashMetric>,
    data: &[String],
    domain_out: Option<&Path>,
    config: &PipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    let keys = axis_keys(axes);
    let data_keys = axis_keys(data);

    let spinner = create_spinner("Loading samples...");
    let table = load_table_csv(input, &keys, &data_keys)
        .with_context(|| format!("failed to load {}", input.display()))?;
    let value_names = table.data_column_names();

    spinner.set_message("Inferring grid geometry...");
    let mut hypertable = Hypertable::from_table(Arc::new(table), keys, &config.reconstruction)
        .context("grid reconstruction failed")?;

    if !keep.is_empty() {
        hypertable = hypertable
            .squash_to(&axis_keys(keep))
            .context("cannot squash to the requested axes")?;
    }
    if let Some(metric) = metric {
        hypertable = hypertable.with_squash_metric(metric);
    }

    spinner.set_message("Rasterizing...");
    let raster = hypertable.data();
    let cells = hypertable.cell_coordinates();
    spinner.finish_and_clear();
    let raster = raster.context("rasterization failed")?;
    let cells = cells.context("rasterization failed")?;

    let domain = hypertable.domain();
    let rows = write_raster_csv(output, &raster, domain, cells.view(), &value_names, &config.output)?;
    if let Some(path) = domain_out {
        write_domain_yaml(path, domain)?;
    }

    print_summary(
        "Rasterization Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Output file", output.display().to_string()),
            ("Grid shape", format!("{:?}", domain.shape())),
            ("Value columns", value_names.len().to_string()),
            ("Rows written", rows.to_string()),
            ("Squash metric", domain.squash_metric().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_config(output: &Path, config: &PipelineConfig) -> Result<()> {
    config
        .to_yaml(output)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {}", output.display(), e))?;
    println!("Configuration written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rasterize_arguments() {
        let cli = Cli::try_parse_from([
            "hypergrid",
            "-vv",
            "rasterize",
            "in.csv",
            "out.csv",
            "--axes",
            "x,y,z",
            "--keep",
            "x,y",
            "--metric",
            "median",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Rasterize {
                axes, keep, metric, data, ..
            } => {
                assert_eq!(axes, vec!["x", "y", "z"]);
                assert_eq!(keep, vec!["x", "y"]);
                assert_eq!(metric, Some(SquashMetric::Median));
                assert!(data.is_empty());
            }
            _ => panic!("expected rasterize"),
        }
    }

    #[test]
    fn test_unknown_metric_is_rejected() {
        let parsed = Cli::try_parse_from([
            "hypergrid", "rasterize", "in.csv", "out.csv", "--axes", "x", "--metric", "mode",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_config_command_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hypergrid.yaml");
        cmd_config(&path, &PipelineConfig::default()).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.reconstruction.max_grid_cells, 10_000_000);
    }
}
