//! Resplice primers - finds all possible combinations of spike-in primers in an amplicon scheme.
//!
//! This tool reads a BED file containing PCR primer coordinates and writes every valid
//! LEFT/RIGHT primer pairing when spike-in primers are present, tagging each pairing with
//! a `_spliceN` suffix so that downstream tools can treat it as its own primer combination.
//!

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use oneroof_amplicons::naming::{
    PrimerNaming, DEFAULT_FWD_SUFFIX, DEFAULT_IDX_DELIM, DEFAULT_REV_SUFFIX,
};
use oneroof_amplicons::resplice::resplice_bed;
use std::path::PathBuf;

/// Command line arguments for primer resplicing
#[derive(Parser, Debug)]
#[command(
    name = "resplice_primers",
    about = "Finds all possible combinations of spike-in primers in an amplicon scheme"
)]
struct Args {
    /// BED file with one-off spike-in primers to be respliced into possible amplicons
    #[arg(short = 'i', long = "input_bed")]
    input_bed: PathBuf,

    /// Output prefix for final respliced amplicon BED file
    #[arg(short = 'o', long = "output_prefix", default_value = "respliced")]
    output_prefix: String,

    /// The suffix to be expected in the names for forward primers
    #[arg(short = 'f', long = "fwd_suffix", default_value = DEFAULT_FWD_SUFFIX)]
    fwd_suffix: String,

    /// The suffix to be expected in the names for reverse primers
    #[arg(short = 'r', long = "rev_suffix", default_value = DEFAULT_REV_SUFFIX)]
    rev_suffix: String,

    /// The symbol used to delimit the index of a spike-in primer
    #[arg(short = 'd', long = "idx_delim", default_value = DEFAULT_IDX_DELIM)]
    idx_delim: String,

    /// Increase verbosity level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Logging set to {}", log_level);

    let naming = PrimerNaming::new(&args.fwd_suffix, &args.rev_suffix, &args.idx_delim)
        .context("Invalid primer naming options")?;

    let output_path = PathBuf::from(format!("{}.bed", args.output_prefix));
    let respliced = resplice_bed(&args.input_bed, &output_path, &naming)
        .with_context(|| format!("Failed to resplice {:?}", args.input_bed))?;

    info!(
        "{} primers written to {:?}. Goodbye!",
        respliced.len(),
        output_path
    );

    Ok(())
}
