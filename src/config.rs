//! TOML run configuration.
//!
//! ```toml
//! [input]
//! reference = "reference.fasta"
//! primer_bed = "primers.bed"
//! prepped_data = "basecalled/"
//!
//! [primers]
//! max_mismatch = 2
//!
//! [downsample]
//! downsample_to = 1000
//!
//! [output]
//! results = "results"
//! ```

use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::bed::check_bed_existence;
use crate::discovery::Platform;
use crate::downsample::{Downsampler, DEFAULT_SEED};
use crate::error::{PipelineError, Result};
use crate::naming::{PrimerNaming, DEFAULT_FWD_SUFFIX, DEFAULT_IDX_DELIM, DEFAULT_REV_SUFFIX};
use crate::orient::{DEFAULT_KMER_SIZE, DEFAULT_MIN_SIMILARITY};
use crate::prepare::{PrepSettings, DEFAULT_MIN_READS};

#[derive(Deserialize, Debug, Clone, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub input: Input,
    #[serde(default)]
    pub primers: PrimerConfig,
    #[serde(default)]
    pub reads: ReadConfig,
    #[serde(default)]
    pub downsample: DownsampleConfig,
    pub output: Output,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Debug, Clone, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Input {
    pub reference: PathBuf,
    pub primer_bed: PathBuf,
    /// Demultiplexed Nanopore reads, one FASTQ or directory per barcode.
    pub prepped_data: Option<PathBuf>,
    /// Paired-end Illumina FASTQs.
    pub illumina_fastq_dir: Option<PathBuf>,
    // Handed through untouched to variant annotation.
    pub ref_gbk: Option<PathBuf>,
    pub snpeff_config: Option<PathBuf>,
    pub sample_lookup: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrimerConfig {
    pub fwd_suffix: String,
    pub rev_suffix: String,
    pub idx_delim: String,
    pub max_mismatch: usize,
    /// Count primers without a side suffix instead of rejecting the file.
    pub lenient_names: bool,
}

impl Default for PrimerConfig {
    fn default() -> Self {
        PrimerConfig {
            fwd_suffix: DEFAULT_FWD_SUFFIX.to_string(),
            rev_suffix: DEFAULT_REV_SUFFIX.to_string(),
            idx_delim: DEFAULT_IDX_DELIM.to_string(),
            max_mismatch: 2,
            lenient_names: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadConfig {
    pub min_reads: usize,
    pub min_len: usize,
    pub max_len: Option<usize>,
    pub min_qual: Option<f64>,
    pub orient_kmer: usize,
    pub min_orient_similarity: f64,
}

impl Default for ReadConfig {
    fn default() -> Self {
        ReadConfig {
            min_reads: DEFAULT_MIN_READS,
            min_len: 0,
            max_len: None,
            min_qual: None,
            orient_kmer: DEFAULT_KMER_SIZE,
            min_orient_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownsampleConfig {
    /// Reads to keep per sample; 0 keeps everything.
    pub downsample_to: usize,
    pub seed: u64,
}

impl Default for DownsampleConfig {
    fn default() -> Self {
        DownsampleConfig {
            downsample_to: 0,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Output {
    pub results: PathBuf,
}

#[derive(Deserialize, Debug, Clone, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub threads: usize,
    pub channel_capacity: usize,
}

pub fn default_threads() -> usize {
    (num_cpus::get() / 2).max(1)
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            threads: default_threads(),
            channel_capacity: 64,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::read_input(path, e))?;
        Self::from_toml_str(&raw)
    }

    pub fn check(&self) -> Result<()> {
        debug!("Validating run configuration");

        if !self.input.reference.is_file() {
            return Err(PipelineError::MissingReference(self.input.reference.clone()));
        }
        check_bed_existence(&self.input.primer_bed)?;

        match (&self.input.prepped_data, &self.input.illumina_fastq_dir) {
            (Some(_), Some(_)) => {
                return Err(PipelineError::InvalidConfig(
                    "set either prepped_data or illumina_fastq_dir, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(PipelineError::InvalidConfig(
                    "no reads given: set prepped_data or illumina_fastq_dir".to_string(),
                ))
            }
            _ => {}
        }

        for (name, path) in [
            ("ref_gbk", &self.input.ref_gbk),
            ("snpeff_config", &self.input.snpeff_config),
            ("sample_lookup", &self.input.sample_lookup),
        ] {
            if let Some(path) = path {
                if !path.exists() {
                    warn!("{} points to {:?}, which does not exist", name, path);
                }
            }
        }

        self.naming()?;
        self.prep_settings().check()?;

        if !(1..=32).contains(&self.reads.orient_kmer) {
            return Err(PipelineError::InvalidConfig(format!(
                "orient_kmer must be between 1 and 32, got {}",
                self.reads.orient_kmer
            )));
        }
        if !(0.0..=1.0).contains(&self.reads.min_orient_similarity) {
            return Err(PipelineError::InvalidConfig(format!(
                "min_orient_similarity must be between 0 and 1, got {}",
                self.reads.min_orient_similarity
            )));
        }
        if self.runtime.threads == 0 {
            return Err(PipelineError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.runtime.channel_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Illumina when paired-end reads are configured, Nanopore otherwise.
    pub fn platform(&self) -> Platform {
        if self.input.illumina_fastq_dir.is_some() {
            Platform::Illumina
        } else {
            Platform::Ont
        }
    }

    pub fn read_dir(&self) -> Result<&Path> {
        self.input
            .illumina_fastq_dir
            .as_deref()
            .or(self.input.prepped_data.as_deref())
            .ok_or_else(|| PipelineError::InvalidConfig("no read directory configured".to_string()))
    }

    pub fn naming(&self) -> Result<PrimerNaming> {
        Ok(PrimerNaming::new(
            &self.primers.fwd_suffix,
            &self.primers.rev_suffix,
            &self.primers.idx_delim,
        )?
        .lenient(self.primers.lenient_names))
    }

    pub fn prep_settings(&self) -> PrepSettings {
        PrepSettings {
            min_reads: self.reads.min_reads,
            min_len: self.reads.min_len,
            max_len: self.reads.max_len,
            min_qual: self.reads.min_qual,
        }
    }

    pub fn downsampler(&self) -> Downsampler {
        Downsampler::new(self.downsample.downsample_to, self.downsample.seed)
    }
}
