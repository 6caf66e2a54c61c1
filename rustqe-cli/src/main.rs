//! rustqe command-line interface.
//!
//! Builds time-of-flight lookup tables from an instrument description,
//! inspects saved tables, and unwraps single detector times.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use clap::{Parser, Subcommand, ValueEnum};
use rustqe_core::units::wavelength_from_tof;
use rustqe_io::TableFormat;
use rustqe_tof::{FrameUnwrapper, LookupTable, TofConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    RustqeIo(#[from] rustqe_io::Error),

    #[error("Table error: {0}")]
    Tof(#[from] rustqe_tof::Error),

    #[error("{0}")]
    Usage(String),
}

/// Output format for saved tables.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// JSON document (always available)
    Json,
    /// HDF5 file (needs the `hdf5` feature)
    Hdf5,
}

impl From<Format> for TableFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => TableFormat::Json,
            Format::Hdf5 => TableFormat::Hdf5,
        }
    }
}

/// Time-of-flight lookup tables for indirect-geometry spectrometers.
#[derive(Parser)]
#[command(name = "rustqe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate the chopper cascade and save a lookup table
    BuildTable {
        /// Instrument configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output table path
        #[arg(short, long)]
        output: PathBuf,

        /// Table format; guessed from the output extension when omitted
        #[arg(short, long, value_enum)]
        format: Option<Format>,

        /// Override the number of simulated neutrons
        #[arg(long)]
        neutrons: Option<usize>,

        /// Override the simulation seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show grid and coverage of a saved table
    TableInfo {
        /// Table file
        input: PathBuf,
    },

    /// Unwrap frame times at one flight distance
    Unwrap {
        /// Table file
        #[arg(short, long)]
        table: PathBuf,

        /// Source-to-detector distance (m)
        #[arg(short, long)]
        distance: f64,

        /// Frame-relative arrival times (ms)
        #[arg(required = true)]
        frame_time_ms: Vec<f64>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::BuildTable {
            config,
            output,
            format,
            neutrons,
            seed,
        } => build_table(&config, &output, format, neutrons, seed),
        Commands::TableInfo { input } => {
            let table = rustqe_io::load_table(&input)?;
            println!("File: {}", input.display());
            print_table_info(&table);
            Ok(())
        }
        Commands::Unwrap {
            table,
            distance,
            frame_time_ms,
        } => {
            let unwrapper = FrameUnwrapper::new(Arc::new(rustqe_io::load_table(&table)?));
            println!("{:>14} {:>14} {:>14}", "frame (ms)", "tof (ms)", "lambda (A)");
            for t in frame_time_ms {
                match unwrapper.unwrap(distance, t * 1.0e6) {
                    Ok(tof) => println!(
                        "{:>14.4} {:>14.4} {:>14.4}",
                        t,
                        tof * 1.0e-6,
                        wavelength_from_tof(tof, distance)
                    ),
                    Err(err) => println!("{:>14.4} {}", t, err),
                }
            }
            Ok(())
        }
    }
}

fn build_table(
    config: &Path,
    output: &Path,
    format: Option<Format>,
    neutrons: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let format = format
        .map(TableFormat::from)
        .or_else(|| TableFormat::from_path(output))
        .unwrap_or(TableFormat::Json);
    if !format.is_available() {
        return Err(CliError::Usage(format!(
            "{:?} output needs rustqe built with the hdf5 feature",
            format
        )));
    }

    let mut config = TofConfig::from_file(config)?;
    if let Some(n) = neutrons {
        config.simulation.neutrons = n;
    }
    if let Some(s) = seed {
        config.simulation.seed = s;
    }
    log::info!(
        "simulating {} neutrons through {} choppers (seed {})",
        config.simulation.neutrons,
        config.choppers.len(),
        config.simulation.seed
    );

    let start = Instant::now();
    let table = config.build_table()?;
    rustqe_io::save_table(output, &table, format)?;

    println!(
        "Built {}x{} table in {:.2}s -> {}",
        table.n_distances(),
        table.n_times(),
        start.elapsed().as_secs_f64(),
        output.display()
    );
    print_table_info(&table);
    Ok(())
}

fn print_table_info(table: &LookupTable) {
    let (d_min, d_max) = table.distance_range();
    let coverage = table.coverage();
    println!(
        "Distances: {:.3} - {:.3} m ({} points, step {:.3} m)",
        d_min,
        d_max,
        table.n_distances(),
        table.distance_step_m()
    );
    println!(
        "Frame: {:.3} ms in {} cells of {:.1} us",
        table.pulse_period_ns() * 1.0e-6,
        table.n_times(),
        table.time_step_ns() * 1.0e-3
    );
    match table.error_threshold() {
        Some(threshold) => println!("Error threshold: {}", threshold),
        None => println!("Error threshold: none"),
    }
    println!("Neutrons simulated: {}", table.neutrons_simulated());
    println!(
        "Cells: {} valid, {} empty, {} over threshold ({:.1}% valid)",
        coverage.valid_cells,
        coverage.empty_cells,
        coverage.rejected_cells,
        100.0 * coverage.fraction_valid()
    );
}
