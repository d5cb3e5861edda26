//! The staged read pipeline.
//!
//! ```text
//! samples -> [prepare] -> [orient + classify] -> [trim] -> (aggregate) -> [downsample + write]
//! ```
//!
//! Stages are connected by bounded channels and run inside one thread scope.
//! Worker pools share only read-only state (patterns, orienter, stats
//! counters). The aggregator is a single thread that owns every sample's
//! partial bins, so completeness needs no lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::aggregate::{Aggregator, Offer, SampleAggregate};
use crate::bed::{read_bed, PrimerRecord};
use crate::classify::{AmpliconBin, Classifier};
use crate::combinations::{split_combinations, write_combination_beds, PrimerCombination};
use crate::config::PipelineConfig;
use crate::counter::AmpliconCount;
use crate::discovery::{discover_samples, Platform, SampleSource};
use crate::downsample::Downsampler;
use crate::error::{PipelineError, Result};
use crate::naming::PrimerNaming;
use crate::orient::Orienter;
use crate::patterns::PatternSet;
use crate::prepare::{prepare_sample, PrepSettings};
use crate::reads::{write_fastq, SampleUnit};
use crate::reference::ReferenceIndex;
use crate::report::{RunStats, RunSummary};
use crate::trim::{trim_bin, TrimmedBin};

pub const COMBINATION_DIR: &str = "primer_combinations";

/// Run-wide stop flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The parsed primer table and everything derived from it before any read
/// is touched.
#[derive(Debug, Clone)]
pub struct PrimerScheme {
    pub records: Vec<PrimerRecord>,
    pub combinations: Vec<PrimerCombination>,
    pub amplicon_count: AmpliconCount,
}

impl PrimerScheme {
    pub fn load(path: &Path, naming: &PrimerNaming) -> Result<Self> {
        let records = read_bed(path, naming)?;
        let amplicon_count = AmpliconCount::from_records(&records);
        let combinations = split_combinations(&records)?;
        info!(
            "Primer scheme {:?}: {} amplicons across {} combination(s).",
            path,
            amplicon_count,
            combinations.len()
        );
        Ok(PrimerScheme {
            records,
            combinations,
            amplicon_count,
        })
    }
}

/// Worker counts per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StageWorkers {
    prepare: usize,
    classify: usize,
    trim: usize,
    write: usize,
}

impl StageWorkers {
    fn split(threads: usize) -> Self {
        let quarter = (threads / 4).max(1);
        StageWorkers {
            prepare: quarter,
            classify: (threads / 2).max(1),
            trim: quarter,
            write: quarter,
        }
    }
}

enum AggregatorInput {
    Register(String),
    Bin(TrimmedBin),
    SampleFailed(String, PipelineError),
}

pub struct Pipeline {
    scheme: PrimerScheme,
    patterns: Arc<PatternSet>,
    orienter: Orienter,
    prep: PrepSettings,
    downsampler: Downsampler,
    platform: Platform,
    read_dir: PathBuf,
    results: PathBuf,
    threads: usize,
    channel_capacity: usize,
    abort: AbortSignal,
    stats: RunStats,
}

impl Pipeline {
    /// Validate the configuration and load everything the read stages need.
    /// The amplicon count is fixed here, before any sample is read.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.check()?;
        let naming = config.naming()?;

        let reference = ReferenceIndex::from_fasta(&config.input.reference)?;
        let scheme = PrimerScheme::load(&config.input.primer_bed, &naming)?;
        let patterns = PatternSet::compile(
            &scheme.combinations,
            &reference,
            config.primers.max_mismatch,
        )?;
        let orienter = Orienter::new(
            &reference,
            config.reads.orient_kmer,
            config.reads.min_orient_similarity,
        )?;

        Ok(Pipeline {
            scheme,
            patterns: Arc::new(patterns),
            orienter,
            prep: config.prep_settings(),
            downsampler: config.downsampler(),
            platform: config.platform(),
            read_dir: config.read_dir()?.to_path_buf(),
            results: config.output.results.clone(),
            threads: config.runtime.threads,
            channel_capacity: config.runtime.channel_capacity,
            abort: AbortSignal::new(),
            stats: RunStats::default(),
        })
    }

    pub fn scheme(&self) -> &PrimerScheme {
        &self.scheme
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// A handle that stops the run from another thread.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads.max(1);
    }

    /// Discover samples, run them through every stage and write the reports.
    pub fn run(&self) -> Result<RunSummary> {
        std::fs::create_dir_all(&self.results)?;
        write_combination_beds(&self.scheme.combinations, &self.results.join(COMBINATION_DIR))?;

        let sources = discover_samples(self.platform, &self.read_dir)?;
        if sources.is_empty() {
            warn!("No samples found in {:?}", self.read_dir);
        }
        let summary = self.run_sources(sources)?;
        summary.write_reports(&self.results)?;
        Ok(summary)
    }

    /// Run the given samples through the staged pipeline. Output FASTQs are
    /// written as samples complete; the summary comes back once every stage
    /// has drained. `sources` may be a channel that is still being filled.
    pub fn run_sources<I>(&self, sources: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = SampleSource>,
        I::IntoIter: Send,
    {
        if self.abort.is_aborted() {
            return Err(PipelineError::Aborted);
        }
        std::fs::create_dir_all(&self.results)?;
        let sources = sources.into_iter();

        let workers = StageWorkers::split(self.threads);
        debug!("Stage workers: {:?}", workers);
        let capacity = self.channel_capacity;

        let (source_tx, source_rx) = bounded::<SampleSource>(capacity);
        let (unit_tx, unit_rx) = bounded::<SampleUnit>(capacity);
        let (bin_tx, bin_rx) = bounded::<AmpliconBin>(capacity);
        let (agg_tx, agg_rx) = bounded::<AggregatorInput>(capacity);
        let (done_tx, done_rx) = bounded::<SampleAggregate>(capacity);

        let outcome = thread::scope(|s| {
            let feeder = s.spawn(move || {
                for source in sources {
                    if self.abort.is_aborted() || source_tx.send(source).is_err() {
                        break;
                    }
                }
            });

            let prepare: Vec<_> = (0..workers.prepare)
                .map(|_| {
                    let (rx, tx, agg) = (source_rx.clone(), unit_tx.clone(), agg_tx.clone());
                    s.spawn(move || self.prepare_worker(rx, tx, agg))
                })
                .collect();

            let classify: Vec<_> = (0..workers.classify)
                .map(|_| {
                    let (rx, tx) = (unit_rx.clone(), bin_tx.clone());
                    let patterns = Arc::clone(&self.patterns);
                    s.spawn(move || self.classify_worker(Classifier::new(patterns), rx, tx))
                })
                .collect();

            let trim: Vec<_> = (0..workers.trim)
                .map(|_| {
                    let (rx, tx) = (bin_rx.clone(), agg_tx.clone());
                    s.spawn(move || self.trim_worker(rx, tx))
                })
                .collect();

            let aggregator = {
                let (rx, tx) = (agg_rx.clone(), done_tx.clone());
                s.spawn(move || self.aggregate(rx, tx))
            };

            let write: Vec<_> = (0..workers.write)
                .map(|_| {
                    let rx = done_rx.clone();
                    s.spawn(move || self.write_worker(rx))
                })
                .collect();

            // only the workers hold channel ends from here on
            drop((source_rx, unit_tx, unit_rx, bin_tx, bin_rx));
            drop((agg_tx, agg_rx, done_tx, done_rx));

            feeder
                .join()
                .unwrap_or_else(|e| std::panic::resume_unwind(e));
            for handle in prepare.into_iter().chain(classify).chain(trim) {
                handle
                    .join()
                    .unwrap_or_else(|e| std::panic::resume_unwind(e));
            }
            let mut summary = aggregator
                .join()
                .unwrap_or_else(|e| std::panic::resume_unwind(e));

            let mut failure = None;
            for handle in write {
                match handle
                    .join()
                    .unwrap_or_else(|e| std::panic::resume_unwind(e))
                {
                    Ok(written) => {
                        for (sample, kept, before) in written {
                            summary.record_complete(&sample, kept, before);
                        }
                    }
                    Err(e) => failure = failure.or(Some(e)),
                }
            }
            match failure {
                Some(e) => Err(e),
                None => Ok(summary),
            }
        });

        let summary = outcome?;
        if self.abort.is_aborted() {
            warn!("Run aborted; partial sample state was discarded.");
            return Err(PipelineError::Aborted);
        }
        Ok(summary)
    }

    fn prepare_worker(
        &self,
        sources: Receiver<SampleSource>,
        units: Sender<SampleUnit>,
        aggregator: Sender<AggregatorInput>,
    ) {
        for source in sources.iter() {
            if self.abort.is_aborted() {
                break;
            }
            let key = source.key.clone();
            let message = match prepare_sample(&source, &self.prep, 1, &self.stats.prepare) {
                Ok(unit) => {
                    if aggregator.send(AggregatorInput::Register(key)).is_err() {
                        break;
                    }
                    if units.send(unit).is_err() {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    if !e.is_recoverable() {
                        error!("Sample {} could not be read: {}", key, e);
                    }
                    AggregatorInput::SampleFailed(key, e)
                }
            };
            if aggregator.send(message).is_err() {
                break;
            }
        }
    }

    fn classify_worker(
        &self,
        mut classifier: Classifier,
        units: Receiver<SampleUnit>,
        bins: Sender<AmpliconBin>,
    ) {
        for unit in units.iter() {
            if self.abort.is_aborted() {
                break;
            }
            let oriented = self.orienter.orient_sample(unit, &self.stats.orient);
            for bin in classifier.classify_sample(oriented, &self.stats.classify) {
                if bins.send(bin).is_err() {
                    return;
                }
            }
        }
    }

    fn trim_worker(
        &self,
        bins: Receiver<AmpliconBin>,
        aggregator: Sender<AggregatorInput>,
    ) {
        for bin in bins.iter() {
            if self.abort.is_aborted() {
                break;
            }
            if let Some(trimmed) = trim_bin(bin, &self.stats.trim) {
                if aggregator.send(AggregatorInput::Bin(trimmed)).is_err() {
                    break;
                }
            }
        }
    }

    fn aggregate(
        &self,
        inputs: Receiver<AggregatorInput>,
        complete: Sender<SampleAggregate>,
    ) -> RunSummary {
        let mut aggregator = Aggregator::new(self.scheme.amplicon_count);
        let mut summary = RunSummary::default();

        for input in inputs.iter() {
            if self.abort.is_aborted() {
                break;
            }
            match input {
                AggregatorInput::Register(sample) => aggregator.register(&sample),
                AggregatorInput::SampleFailed(sample, e) => summary.record_error(&sample, &e),
                AggregatorInput::Bin(bin) => {
                    let (sample, amplicon, reads) =
                        (bin.sample.clone(), bin.amplicon.clone(), bin.reads.len());
                    match aggregator.offer(bin) {
                        Ok(Offer::Waiting { .. }) => summary.record_bin(&sample, &amplicon, reads),
                        Ok(Offer::Complete(aggregate)) => {
                            summary.record_bin(&sample, &amplicon, reads);
                            if complete.send(aggregate).is_err() {
                                break;
                            }
                        }
                        Ok(Offer::Discarded) => {}
                        Err(e) if aggregator.is_complete(&sample) => {
                            warn!("{}; the sample was already emitted", e);
                            summary.record_rejected_bin(&sample, &amplicon, reads);
                        }
                        Err(e) => {
                            warn!("{}", e);
                            summary.record_error(&sample, &e);
                        }
                    }
                }
            }
        }

        for stalled in aggregator.finish() {
            if let PipelineError::StalledSample { sample, .. } = &stalled {
                summary.record_error(sample, &stalled);
            }
        }
        summary
    }

    fn write_worker(&self, complete: Receiver<SampleAggregate>) -> Result<Vec<(String, usize, usize)>> {
        let mut written = Vec::new();
        for aggregate in complete.iter() {
            if self.abort.is_aborted() {
                break;
            }
            let sample = aggregate.sample.clone();
            let reads = aggregate.into_reads();
            let before = reads.len();
            let kept = self.downsampler.apply(reads);

            let path = self.results.join(format!("{sample}.fastq.gz"));
            if let Err(e) = write_fastq(&path, &kept) {
                error!("Failed to write {:?}: {}", path, e);
                self.abort.abort();
                return Err(e);
            }
            info!("Wrote {} reads for sample {} to {:?}", kept.len(), sample, path);
            written.push((sample, kept.len(), before));
        }
        Ok(written)
    }
}
