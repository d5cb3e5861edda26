//! Prep amplicons - resolves a primer scheme against a reference, sorts each
//! sample's reads into amplicon bins, and writes trimmed, downsampled FASTQs for
//! every sample that delivered all of its amplicons.
//!
//! Everything except threading and verbosity comes from a TOML file; see
//! `oneroof_amplicons::config` for the available sections.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use oneroof_amplicons::report::SampleStatus;

#[derive(Parser, Debug)]
#[command(
    name = "prep_amplicons",
    version,
    about = "Classify, trim and batch amplicon reads per sample"
)]
struct Args {
    /// TOML run configuration
    config: PathBuf,

    /// Number of threads (overrides the configuration file)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Increase verbosity level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn validate_args(args: &Args) -> Result<()> {
    debug!("Validating command-line arguments");

    if !args.config.is_file() {
        anyhow::bail!("Configuration file does not exist: {:?}", args.config);
    }
    if args.threads == Some(0) {
        anyhow::bail!("Number of threads must be at least 1");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
    info!("Logging set to {}", log_level);

    validate_args(&args)?;

    let summary = oneroof_amplicons::run(&args.config, args.threads)?;

    let stalled = summary.samples_with(SampleStatus::Stalled);
    if !stalled.is_empty() {
        warn!(
            "{} sample(s) never delivered every amplicon and were not written: {:?}",
            stalled.len(),
            stalled
        );
    }
    info!(
        "{} sample(s) complete, {} excluded below the read floor, {} stalled, {} failed. Goodbye!",
        summary.completed(),
        summary.excluded(),
        summary.stalled(),
        summary.failed()
    );
    Ok(())
}
