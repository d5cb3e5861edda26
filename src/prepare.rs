//! Loading a sample's reads and applying the usability floor and read filters.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};

use crate::discovery::SampleSource;
use crate::error::{PipelineError, Result};
use crate::reads::{load_fastq, ReadRecord, SampleUnit};

/// Samples with this many reads or fewer are dropped.
pub const DEFAULT_MIN_READS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct PrepSettings {
    pub min_reads: usize,
    pub min_len: usize,
    pub max_len: Option<usize>,
    pub min_qual: Option<f64>,
}

impl Default for PrepSettings {
    fn default() -> Self {
        PrepSettings {
            min_reads: DEFAULT_MIN_READS,
            min_len: 0,
            max_len: None,
            min_qual: None,
        }
    }
}

impl PrepSettings {
    pub fn check(&self) -> Result<()> {
        if let Some(max_len) = self.max_len {
            if self.min_len > max_len {
                return Err(PipelineError::InvalidConfig(format!(
                    "min_len ({}) cannot be greater than max_len ({})",
                    self.min_len, max_len
                )));
            }
        }
        if let Some(min_qual) = self.min_qual {
            if !(0.0..=93.0).contains(&min_qual) {
                return Err(PipelineError::InvalidConfig(format!(
                    "min_qual must be a Phred score between 0 and 93, got {min_qual}"
                )));
            }
        }
        Ok(())
    }

    fn keep(&self, read: &ReadRecord, stats: &PrepStats) -> bool {
        if read.len() < self.min_len {
            stats.too_short.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.max_len.is_some_and(|max| read.len() > max) {
            stats.too_long.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.min_qual.is_some_and(|q| read.mean_quality() < q) {
            stats.low_quality.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }
}

/// Counters shared by every preparation worker.
#[derive(Debug, Default)]
pub struct PrepStats {
    pub samples_seen: AtomicUsize,
    pub low_yield: AtomicUsize,
    pub reads_loaded: AtomicUsize,
    pub reads_kept: AtomicUsize,
    pub too_short: AtomicUsize,
    pub too_long: AtomicUsize,
    pub low_quality: AtomicUsize,
}

impl PrepStats {
    pub fn report(&self, output: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(output, "\nRead Preparation Statistics:")?;
        writeln!(
            output,
            "  Samples seen: {}",
            self.samples_seen.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Samples below the read floor: {}",
            self.low_yield.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Reads loaded: {}",
            self.reads_loaded.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Reads kept: {}",
            self.reads_kept.load(Ordering::Relaxed)
        )?;
        writeln!(output, "\nReads filtered:")?;
        writeln!(
            output,
            "  Too short: {}",
            self.too_short.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Too long: {}",
            self.too_long.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Low quality: {}",
            self.low_quality.load(Ordering::Relaxed)
        )?;
        Ok(())
    }
}

/// Apply the read floor to the raw read set, then the per-read filters.
///
/// The floor is checked before any filtering: a sample with `min_reads` raw
/// reads or fewer is a [`PipelineError::LowYieldSample`].
pub fn filter_sample(mut unit: SampleUnit, settings: &PrepSettings, stats: &PrepStats) -> Result<SampleUnit> {
    stats.samples_seen.fetch_add(1, Ordering::Relaxed);
    let raw = unit.reads.len();
    stats.reads_loaded.fetch_add(raw, Ordering::Relaxed);

    if raw <= settings.min_reads {
        stats.low_yield.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Sample {} has only {} reads (floor: more than {}); excluding it.",
            unit.key(),
            raw,
            settings.min_reads
        );
        return Err(PipelineError::LowYieldSample {
            sample: unit.key().to_string(),
            reads: raw,
            floor: settings.min_reads,
        });
    }

    let kept: Vec<ReadRecord> = std::mem::take(&mut unit.reads)
        .into_iter()
        .filter(|read| settings.keep(read, stats))
        .collect();
    stats.reads_kept.fetch_add(kept.len(), Ordering::Relaxed);
    debug!("Sample {}: kept {} of {} reads", unit.key(), kept.len(), raw);
    Ok(unit.with_reads(kept))
}

/// Load every file of a sample and run [`filter_sample`] on the result.
pub fn prepare_sample(
    source: &SampleSource,
    settings: &PrepSettings,
    threads: usize,
    stats: &PrepStats,
) -> Result<SampleUnit> {
    let mut reads = Vec::new();
    for file in &source.files {
        reads.extend(load_fastq(&file.path, file.mate_suffix, threads)?);
    }
    if source.files.len() > 1 {
        reads.sort_unstable();
    }
    info!(
        "Loaded {} reads for sample {} from {} file(s)",
        reads.len(),
        source.key,
        source.files.len()
    );
    filter_sample(SampleUnit::new(&*source.key, reads), settings, stats)
}
