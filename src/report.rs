//! Run-level bookkeeping: stage counters, per-sample outcomes and the TSV
//! reports written at the end of a run.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

use log::info;

use crate::classify::ClassifyStats;
use crate::error::{PipelineError, Result};
use crate::naming::AmpliconId;
use crate::orient::OrientStats;
use crate::prepare::PrepStats;
use crate::reads::create_writer;
use crate::trim::TrimStats;

pub const AMPLICON_STATS_FILE: &str = "amplicon_stats.tsv";
pub const RUN_SUMMARY_FILE: &str = "run_summary.tsv";

/// Counters from every stage, shared by reference across worker threads.
#[derive(Debug, Default)]
pub struct RunStats {
    pub prepare: PrepStats,
    pub orient: OrientStats,
    pub classify: ClassifyStats,
    pub trim: TrimStats,
}

impl RunStats {
    pub fn report(&self, output: &mut dyn Write) -> std::io::Result<()> {
        self.prepare.report(output)?;
        self.orient.report(output)?;
        self.classify.report(output)?;
        self.trim.report(output)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SampleStatus {
    Complete,
    /// Dropped at the read floor.
    Excluded,
    /// Never reached the full amplicon count.
    Stalled,
    /// Input errors or duplicate bins.
    Failed,
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SampleStatus::Complete => "complete",
            SampleStatus::Excluded => "excluded",
            SampleStatus::Stalled => "stalled",
            SampleStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOutcome {
    pub status: SampleStatus,
    /// Reads written for complete samples, the raw count for excluded ones.
    pub reads: usize,
    pub detail: String,
}

/// Everything that happened to every sample in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    outcomes: BTreeMap<String, SampleOutcome>,
    bins: BTreeMap<(String, AmpliconId), usize>,
    /// Bins that arrived after their sample was already emitted.
    rejected: BTreeMap<String, Vec<(AmpliconId, usize)>>,
}

impl RunSummary {
    /// Note an amplicon bin accepted by the aggregator.
    pub fn record_bin(&mut self, sample: &str, amplicon: &AmpliconId, reads: usize) {
        self.bins
            .insert((sample.to_string(), amplicon.clone()), reads);
    }

    /// Note a bin that arrived after its sample completed. The sample keeps
    /// its status; the bin shows up in both reports as rejected.
    pub fn record_rejected_bin(&mut self, sample: &str, amplicon: &AmpliconId, reads: usize) {
        self.rejected
            .entry(sample.to_string())
            .or_default()
            .push((amplicon.clone(), reads));
    }

    pub fn rejected_bins(&self, sample: &str) -> &[(AmpliconId, usize)] {
        self.rejected.get(sample).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn record_complete(&mut self, sample: &str, reads_written: usize, reads_before: usize) {
        let detail = if reads_written < reads_before {
            format!("downsampled from {reads_before} reads")
        } else {
            String::new()
        };
        self.outcomes.insert(
            sample.to_string(),
            SampleOutcome {
                status: SampleStatus::Complete,
                reads: reads_written,
                detail,
            },
        );
    }

    /// Record a recoverable per-sample error, or a fatal one scoped to a
    /// single sample.
    pub fn record_error(&mut self, sample: &str, error: &PipelineError) {
        let (status, reads) = match error {
            PipelineError::LowYieldSample { reads, .. } => (SampleStatus::Excluded, *reads),
            PipelineError::StalledSample { .. } => (SampleStatus::Stalled, 0),
            _ => (SampleStatus::Failed, 0),
        };
        self.outcomes.insert(
            sample.to_string(),
            SampleOutcome {
                status,
                reads,
                detail: error.to_string(),
            },
        );
    }

    pub fn outcome(&self, sample: &str) -> Option<&SampleOutcome> {
        self.outcomes.get(sample)
    }

    pub fn samples_with(&self, status: SampleStatus) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.status == status)
            .map(|(s, _)| s.as_str())
            .collect()
    }

    pub fn completed(&self) -> usize {
        self.samples_with(SampleStatus::Complete).len()
    }

    pub fn excluded(&self) -> usize {
        self.samples_with(SampleStatus::Excluded).len()
    }

    pub fn stalled(&self) -> usize {
        self.samples_with(SampleStatus::Stalled).len()
    }

    pub fn failed(&self) -> usize {
        self.samples_with(SampleStatus::Failed).len()
    }

    pub fn write_amplicon_stats(&self, path: &Path) -> Result<()> {
        let mut writer = create_writer(path)?;
        writeln!(writer, "sample\tamplicon\treads\tstatus")?;
        for ((sample, amplicon), reads) in &self.bins {
            let status = self
                .outcomes
                .get(sample)
                .map_or(SampleStatus::Stalled, |o| o.status);
            writeln!(writer, "{sample}\t{amplicon}\t{reads}\t{status}")?;
        }
        for (sample, bins) in &self.rejected {
            for (amplicon, reads) in bins {
                writeln!(writer, "{sample}\t{amplicon}\t{reads}\trejected")?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_run_summary(&self, path: &Path) -> Result<()> {
        let mut writer = create_writer(path)?;
        writeln!(writer, "sample\tstatus\treads\tdetail")?;
        for (sample, outcome) in &self.outcomes {
            let mut detail = outcome.detail.clone();
            let rejected = self.rejected_bins(sample);
            if !rejected.is_empty() {
                if !detail.is_empty() {
                    detail.push_str("; ");
                }
                let reads: usize = rejected.iter().map(|(_, reads)| reads).sum();
                detail.push_str(&format!(
                    "rejected {} bin(s) with {} reads that arrived after completion",
                    rejected.len(),
                    reads
                ));
            }
            writeln!(
                writer,
                "{}\t{}\t{}\t{}",
                sample, outcome.status, outcome.reads, detail
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write both TSV reports into `dir`.
    pub fn write_reports(&self, dir: &Path) -> Result<()> {
        self.write_amplicon_stats(&dir.join(AMPLICON_STATS_FILE))?;
        self.write_run_summary(&dir.join(RUN_SUMMARY_FILE))?;
        info!(
            "{} sample(s) complete, {} excluded, {} stalled, {} failed. Reports written to {:?}",
            self.completed(),
            self.excluded(),
            self.stalled(),
            self.failed(),
            dir
        );
        Ok(())
    }
}
