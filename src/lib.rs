//! Primer-scheme resolution and completeness-gated batching of amplicon
//! sequencing reads.
//!
//! A run parses a primer BED once, derives the number of distinct amplicons
//! every sample must deliver, compiles fuzzy primer patterns against the
//! reference, and then streams samples through orientation, classification,
//! trimming, per-sample aggregation and downsampling. See [`pipeline`] for the
//! stage layout.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;

pub mod aggregate;
pub mod bed;
pub mod classify;
pub mod combinations;
pub mod config;
pub mod counter;
pub mod discovery;
pub mod downsample;
pub mod error;
pub mod naming;
pub mod orient;
pub mod patterns;
pub mod pipeline;
pub mod prepare;
pub mod reads;
pub mod reference;
pub mod report;
pub mod resplice;
pub mod sequence;
pub mod trim;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{AbortSignal, Pipeline};
pub use report::RunSummary;

/// Run the whole pipeline from a TOML configuration file.
pub fn run(toml_file: &Path, threads: Option<usize>) -> Result<RunSummary> {
    let config = PipelineConfig::from_toml_file(toml_file)
        .with_context(|| format!("Could not parse toml file: {}", toml_file.to_string_lossy()))?;

    let mut pipeline = Pipeline::new(&config).context("Error in configuration")?;
    if let Some(threads) = threads {
        pipeline.set_threads(threads);
    }
    info!(
        "Every sample must deliver {} distinct amplicons.",
        pipeline.scheme().amplicon_count
    );

    let summary = pipeline.run().context("Error while processing reads")?;
    let mut stderr = std::io::stderr();
    pipeline
        .stats()
        .report(&mut stderr)
        .context("Failed to write run statistics")?;
    Ok(summary)
}
