//! Error taxonomy for primer handling and read batching.
//!
//! File-level and configuration errors abort a run. Per-read and per-sample
//! errors (`LowYieldSample`, `PrimerTrimFailure`, `DuplicateAmpliconBin`,
//! `StalledSample`) are recovered where they occur and end up in the run
//! summary.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed primer file: {0}")]
    MalformedPrimerFile(String),

    #[error(
        "primer {primer} spans {start}..{end} on {reference}, which is only {length} bp long"
    )]
    ReferenceCoordinateOutOfRange {
        primer: String,
        reference: String,
        start: u64,
        end: u64,
        length: usize,
    },

    #[error("primer {primer} refers to {reference}, which is not present in the reference FASTA")]
    UnknownReference { primer: String, reference: String },

    #[error("reference FASTA {0:?} does not exist or is not a file")]
    MissingReference(PathBuf),

    #[error("sample {sample} has {reads} reads, at or below the usability floor of {floor}")]
    LowYieldSample {
        sample: String,
        reads: usize,
        floor: usize,
    },

    #[error("trimming primers from read {read_id} ({amplicon}) leaves no sequence")]
    PrimerTrimFailure { read_id: String, amplicon: String },

    #[error("sample {sample} received a second bin for amplicon {amplicon}")]
    DuplicateAmpliconBin { sample: String, amplicon: String },

    #[error("sample {sample} stalled with {observed} of {expected} expected amplicons")]
    StalledSample {
        sample: String,
        observed: usize,
        expected: usize,
    },

    #[error("failed to read {path:?}: {reason}")]
    ReadInput { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("run aborted before all samples were processed")]
    Aborted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn read_input(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::ReadInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error only affects a single read or sample.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::LowYieldSample { .. }
                | PipelineError::PrimerTrimFailure { .. }
                | PipelineError::DuplicateAmpliconBin { .. }
                | PipelineError::StalledSample { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_split() {
        let low = PipelineError::LowYieldSample {
            sample: "barcode01".to_string(),
            reads: 50,
            floor: 100,
        };
        assert!(low.is_recoverable());
        assert!(low.to_string().contains("50 reads"));

        let malformed = PipelineError::MalformedPrimerFile("row 3 has 2 columns".to_string());
        assert!(!malformed.is_recoverable());
        assert!(!PipelineError::Aborted.is_recoverable());
    }
}
