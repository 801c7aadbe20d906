//! pulsedata CLI
//!
//! Inspects the channels of a run: missing-data statistics, channel names and
//! shapes, and scan metadata.
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand};

use pulsedata_core::{ChannelSet, StatsOptions};
use pulsedata_io::{DataFiles, OpenOptions, ScanInfo};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    PulsedataIo(#[from] pulsedata_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] pulsedata_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Inspect pulse-id aligned HDF5 runs.
#[derive(Parser)]
#[command(name = "pulsedata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subtract this offset from every pulse id
    #[arg(long, global = true, default_value = "0")]
    offset: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report missing pulse ids per channel
    Stats {
        /// Data files of one run
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Also list channels that miss no pulse id
        #[arg(long)]
        complete: bool,

        /// Disable coloured output
        #[arg(long)]
        no_color: bool,

        /// Align every channel to the shared pulse ids before counting.
        /// Aligned channels are all complete and show 0% loss
        #[arg(long)]
        drop_missing: bool,
    },

    /// List channel names
    Names {
        /// Data files of one run
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Write the names to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Show shape, type and record counts of every channel
    Info {
        /// Data files of one run
        #[arg(required = true)]
        input: Vec<PathBuf>,
    },

    /// Show the steps of a scan
    Scan {
        /// Scan-info JSON file
        input: PathBuf,

        /// Print the steps as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let options = OpenOptions::default().with_pulse_id_offset(cli.offset);

    match cli.command {
        Commands::Stats {
            input,
            complete,
            no_color,
            drop_missing,
        } => {
            let run = DataFiles::open(&input, &options)?;
            if drop_missing {
                run.drop_missing()?;
            }
            let stats_options = StatsOptions::default()
                .with_show_complete(complete)
                .with_color(!no_color);
            let stdout = io::stdout();
            run.write_stats(&mut stdout.lock(), &stats_options)?;
            run.close()?;
        }

        Commands::Names {
            input,
            output,
            overwrite,
        } => {
            let run = DataFiles::open(&input, &options)?;
            match output {
                Some(path) => {
                    run.save_names(&path, overwrite)?;
                    eprintln!("Wrote {} names to {}", run.len(), path.display());
                }
                None => {
                    let stdout = io::stdout();
                    let mut out = stdout.lock();
                    for name in run.names() {
                        writeln!(out, "{}", name)?;
                    }
                }
            }
            run.close()?;
        }

        Commands::Info { input } => {
            let run = DataFiles::open(&input, &options)?;
            println!("{}", run);
            for file in run.files() {
                if let Some(meta) = file.meta() {
                    println!("  {}: {}", file.path().display(), meta.names().join(", "));
                }
            }
            print_channels(run.channels())?;
            run.close()?;
        }

        Commands::Scan { input, json } => {
            let info = ScanInfo::from_path(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Scan: {} ({} steps)", input.display(), info.len());
                println!("Parameters: {}", info.parameters);
                for step in info.steps() {
                    println!(
                        "  step {:>4}: value {:?} readback {:?} ({} files)",
                        step.index,
                        step.value.unwrap_or_default(),
                        step.readback.unwrap_or_default(),
                        step.files.len()
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_channels(channels: &ChannelSet) -> Result<()> {
    let width = channels
        .iter()
        .map(|ch| ch.name().len())
        .max()
        .unwrap_or(0);
    for ch in channels {
        println!(
            "  {:<width$}  {:>8} / {:<8}  {:<8}  {:?}",
            ch.name(),
            ch.nvalid()?,
            ch.ntotal()?,
            ch.dtype()?.to_string(),
            ch.shape()?,
            width = width
        );
    }
    Ok(())
}
