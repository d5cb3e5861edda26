//! Cutting primers off classified reads.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, warn};

use crate::classify::{AmpliconBin, ClassifiedRead};
use crate::error::{PipelineError, Result};
use crate::naming::AmpliconId;
use crate::reads::ReadRecord;

/// Primer-free reads of one sample and amplicon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimmedBin {
    pub sample: String,
    pub amplicon: AmpliconId,
    pub reads: Vec<ReadRecord>,
}

#[derive(Debug, Default)]
pub struct TrimStats {
    pub reads_trimmed: AtomicUsize,
    pub trim_failures: AtomicUsize,
    pub bases_removed: AtomicUsize,
    pub empty_bins: AtomicUsize,
}

impl TrimStats {
    pub fn report(&self, output: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(output, "\nPrimer Trimming Statistics:")?;
        writeln!(
            output,
            "  Reads trimmed: {}",
            self.reads_trimmed.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Primer bases removed: {}",
            self.bases_removed.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Reads with no insert left: {}",
            self.trim_failures.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Bins emptied by trimming: {}",
            self.empty_bins.load(Ordering::Relaxed)
        )?;
        Ok(())
    }
}

/// Keep only the insert of a classified read.
pub fn trim_read(classified: &ClassifiedRead) -> Result<ReadRecord> {
    let failure = || PipelineError::PrimerTrimFailure {
        read_id: classified.read.id.clone(),
        amplicon: classified.amplicon.to_string(),
    };
    if classified.insert.is_empty() {
        return Err(failure());
    }
    classified
        .read
        .sliced(classified.insert.clone())
        .ok_or_else(failure)
}

/// Trim every read of a bin. Reads that trim to nothing are dropped; a bin
/// with no reads left comes back as `None` and is not forwarded.
pub fn trim_bin(bin: AmpliconBin, stats: &TrimStats) -> Option<TrimmedBin> {
    let mut reads = Vec::with_capacity(bin.reads.len());
    for classified in &bin.reads {
        match trim_read(classified) {
            Ok(trimmed) => {
                stats.reads_trimmed.fetch_add(1, Ordering::Relaxed);
                stats
                    .bases_removed
                    .fetch_add(classified.read.len() - trimmed.len(), Ordering::Relaxed);
                reads.push(trimmed);
            }
            Err(e) => {
                stats.trim_failures.fetch_add(1, Ordering::Relaxed);
                debug!("{}", e);
            }
        }
    }

    if reads.is_empty() {
        stats.empty_bins.fetch_add(1, Ordering::Relaxed);
        warn!(
            "No reads of sample {} kept an insert for amplicon {}; the sample cannot complete.",
            bin.sample, bin.amplicon
        );
        return None;
    }

    Some(TrimmedBin {
        sample: bin.sample,
        amplicon: bin.amplicon,
        reads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifyStats, Classifier};
    use crate::patterns::PatternSet;
    use crate::reads::SampleUnit;
    use crate::sequence::reverse_complement;
    use crate::test_fixtures::{combinations, random_bases, reference, SCHEME};
    use std::sync::Arc;

    fn classified(id: &str, seq: &[u8], insert: std::ops::Range<usize>) -> ClassifiedRead {
        ClassifiedRead {
            read: ReadRecord::new(id, seq, &vec![b'I'; seq.len()]),
            amplicon: AmpliconId::new("AMP1"),
            combination: "default".to_string(),
            insert,
            cost: 0,
        }
    }

    #[test]
    fn test_trim_read_keeps_insert() {
        let read = classified("r1", b"AAAACCCCGGGG", 4..8);
        let trimmed = trim_read(&read).unwrap();
        assert_eq!(trimmed.seq, b"CCCC");
        assert_eq!(trimmed.qual, b"IIII");
        assert_eq!(trimmed.id, "r1");
    }

    #[test]
    fn test_zero_length_insert_fails() {
        let read = classified("r1", b"AAAACCCC", 4..4);
        let err = trim_read(&read).unwrap_err();
        assert!(matches!(err, PipelineError::PrimerTrimFailure { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_primers_flanking_insert_trim_to_insert() {
        let reference = reference();
        let genome = reference.get("ref").unwrap();
        let set = PatternSet::compile(&combinations(&SCHEME), &reference, 2).unwrap();
        let pair = set.lookup("default", &AmpliconId::new("AMP1")).unwrap().clone();
        let mut classifier = Classifier::new(Arc::new(set));

        // LEFT oligo + insert + reverse complement of the RIGHT oligo
        let insert = random_bases(73, 99);
        let mut seq = pair.left.oligo.clone();
        seq.extend_from_slice(&insert);
        seq.extend_from_slice(&reverse_complement(&pair.right.oligo));
        assert_eq!(&seq[..20], &genome[10..30]);

        let unit = SampleUnit::new("s", vec![ReadRecord::new("r1", &seq, &vec![b'I'; seq.len()])]);
        let bins = classifier.classify_sample(unit, &ClassifyStats::default());
        assert_eq!(bins.len(), 1);

        let stats = TrimStats::default();
        let trimmed = trim_bin(bins.into_iter().next().unwrap(), &stats).unwrap();
        assert_eq!(trimmed.reads[0].seq, insert);
        assert_eq!(stats.bases_removed.load(Ordering::Relaxed), 40);
    }

    #[test]
    fn test_bin_emptied_by_trimming_is_not_forwarded() {
        let bin = AmpliconBin {
            sample: "s".to_string(),
            amplicon: AmpliconId::new("AMP1"),
            reads: vec![classified("r1", b"AAAACCCC", 4..4)],
        };
        let stats = TrimStats::default();
        assert!(trim_bin(bin, &stats).is_none());
        assert_eq!(stats.empty_bins.load(Ordering::Relaxed), 1);
        assert_eq!(stats.trim_failures.load(Ordering::Relaxed), 1);
    }
}
