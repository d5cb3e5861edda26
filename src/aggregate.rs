//! Completeness-gated grouping of amplicon bins by sample.
//!
//! Each sample moves through `Waiting -> Complete` or `Waiting -> Failed`.
//! A sample completes the moment exactly [`AmpliconCount`] distinct amplicon
//! bins have arrived for it; its aggregate is handed out once and the key is
//! retired. Samples still waiting when the input ends are stalled.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::counter::AmpliconCount;
use crate::error::{PipelineError, Result};
use crate::naming::AmpliconId;
use crate::reads::ReadRecord;
use crate::trim::TrimmedBin;

/// Every amplicon bin of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleAggregate {
    pub sample: String,
    /// Bins in amplicon order.
    pub bins: Vec<TrimmedBin>,
}

impl SampleAggregate {
    pub fn read_count(&self) -> usize {
        self.bins.iter().map(|b| b.reads.len()).sum()
    }

    /// All reads, amplicon by amplicon.
    pub fn into_reads(self) -> Vec<ReadRecord> {
        self.bins.into_iter().flat_map(|b| b.reads).collect()
    }
}

/// What happened to an offered bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// Accepted; the sample still needs more amplicons.
    Waiting { observed: usize, expected: usize },
    /// Accepted, and the sample is now complete.
    Complete(SampleAggregate),
    /// Dropped because the sample already failed.
    Discarded,
}

#[derive(Debug)]
enum SampleState {
    Waiting(BTreeMap<AmpliconId, TrimmedBin>),
    Complete,
    Failed,
}

/// Per-sample bin state. Owned by a single thread; nothing in here is shared.
#[derive(Debug)]
pub struct Aggregator {
    expected: AmpliconCount,
    samples: BTreeMap<String, SampleState>,
}

impl Aggregator {
    pub fn new(expected: AmpliconCount) -> Self {
        Aggregator {
            expected,
            samples: BTreeMap::new(),
        }
    }

    /// Start tracking a sample before any of its bins arrive, so that a sample
    /// with no bins at all still shows up as stalled. Idempotent.
    pub fn register(&mut self, sample: &str) {
        self.samples
            .entry(sample.to_string())
            .or_insert_with(|| SampleState::Waiting(BTreeMap::new()));
    }

    /// Number of distinct amplicons seen so far for a waiting sample.
    pub fn observed(&self, sample: &str) -> Option<usize> {
        match self.samples.get(sample) {
            Some(SampleState::Waiting(bins)) => Some(bins.len()),
            _ => None,
        }
    }

    pub fn is_complete(&self, sample: &str) -> bool {
        matches!(self.samples.get(sample), Some(SampleState::Complete))
    }

    pub fn offer(&mut self, bin: TrimmedBin) -> Result<Offer> {
        let expected = self.expected.get();
        let state = self
            .samples
            .entry(bin.sample.clone())
            .or_insert_with(|| SampleState::Waiting(BTreeMap::new()));

        match state {
            SampleState::Waiting(bins) => {
                if bins.contains_key(&bin.amplicon) {
                    warn!(
                        "Sample {} received amplicon {} twice; discarding its {} partial bin(s).",
                        bin.sample,
                        bin.amplicon,
                        bins.len()
                    );
                    *state = SampleState::Failed;
                    return Err(PipelineError::DuplicateAmpliconBin {
                        sample: bin.sample,
                        amplicon: bin.amplicon.to_string(),
                    });
                }

                let sample = bin.sample.clone();
                bins.insert(bin.amplicon.clone(), bin);
                let observed = bins.len();
                if observed < expected {
                    debug!(
                        "Sample {} has {} of {} amplicons",
                        sample, observed, expected
                    );
                    return Ok(Offer::Waiting { observed, expected });
                }

                let bins = std::mem::take(bins);
                *state = SampleState::Complete;
                info!(
                    "Sample {} is complete with all {} amplicons.",
                    sample, expected
                );
                Ok(Offer::Complete(SampleAggregate {
                    sample,
                    bins: bins.into_values().collect(),
                }))
            }
            SampleState::Complete => Err(PipelineError::DuplicateAmpliconBin {
                sample: bin.sample,
                amplicon: bin.amplicon.to_string(),
            }),
            SampleState::Failed => {
                debug!(
                    "Dropping amplicon {} for failed sample {}",
                    bin.amplicon, bin.sample
                );
                Ok(Offer::Discarded)
            }
        }
    }

    /// Close the aggregator. Every sample still waiting is reported as a
    /// [`PipelineError::StalledSample`], in sample order.
    pub fn finish(self) -> Vec<PipelineError> {
        let expected = self.expected.get();
        self.samples
            .into_iter()
            .filter_map(|(sample, state)| match state {
                SampleState::Waiting(bins) => {
                    warn!(
                        "Sample {} stalled with {} of {} amplicons.",
                        sample,
                        bins.len(),
                        expected
                    );
                    Some(PipelineError::StalledSample {
                        sample,
                        observed: bins.len(),
                        expected,
                    })
                }
                SampleState::Complete | SampleState::Failed => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bed::PrimerRecord;
    use crate::naming::PrimerNaming;
    use proptest::prelude::*;

    fn count(n: usize) -> AmpliconCount {
        let naming = PrimerNaming::default();
        let records: Vec<PrimerRecord> = (1..=n as u64)
            .flat_map(|i| {
                [
                    PrimerRecord::new("ref", i * 100, i * 100 + 20, format!("AMP{i}_LEFT"), &naming),
                    PrimerRecord::new("ref", i * 100 + 80, i * 100 + 100, format!("AMP{i}_RIGHT"), &naming),
                ]
            })
            .collect::<Result<_>>()
            .unwrap();
        AmpliconCount::from_records(&records)
    }

    fn bin(sample: &str, amplicon: &str, reads: usize) -> TrimmedBin {
        TrimmedBin {
            sample: sample.to_string(),
            amplicon: AmpliconId::new(amplicon),
            reads: (0..reads)
                .map(|i| ReadRecord::new(format!("{amplicon}_{i}"), b"ACGT", b"IIII"))
                .collect(),
        }
    }

    #[test]
    fn test_completes_at_exact_count() {
        let mut aggregator = Aggregator::new(count(3));
        assert_eq!(
            aggregator.offer(bin("s1", "AMP2", 2)).unwrap(),
            Offer::Waiting { observed: 1, expected: 3 }
        );
        assert_eq!(
            aggregator.offer(bin("s1", "AMP1", 1)).unwrap(),
            Offer::Waiting { observed: 2, expected: 3 }
        );
        assert_eq!(aggregator.observed("s1"), Some(2));

        let Offer::Complete(aggregate) = aggregator.offer(bin("s1", "AMP3", 4)).unwrap() else {
            panic!("third bin should complete the sample");
        };
        assert_eq!(aggregate.sample, "s1");
        assert_eq!(aggregate.read_count(), 7);
        let order: Vec<&str> = aggregate.bins.iter().map(|b| b.amplicon.as_str()).collect();
        assert_eq!(order, vec!["AMP1", "AMP2", "AMP3"]);
        assert_eq!(aggregator.observed("s1"), None);
        assert!(aggregator.finish().is_empty());
    }

    #[test]
    fn test_stalled_sample_reported() {
        let mut aggregator = Aggregator::new(count(98));
        for i in 1..=97 {
            aggregator.offer(bin("barcode05", &format!("AMP{i}"), 1)).unwrap();
        }
        let stalled = aggregator.finish();
        assert_eq!(stalled.len(), 1);
        assert!(matches!(
            &stalled[0],
            PipelineError::StalledSample { sample, observed: 97, expected: 98 } if sample == "barcode05"
        ));
    }

    #[test]
    fn test_registered_sample_without_bins_stalls() {
        let mut aggregator = Aggregator::new(count(2));
        aggregator.register("quiet");
        aggregator.register("quiet");
        let stalled = aggregator.finish();
        assert_eq!(stalled.len(), 1);
        assert!(matches!(
            &stalled[0],
            PipelineError::StalledSample { observed: 0, expected: 2, .. }
        ));
    }

    #[test]
    fn test_duplicate_bin_fails_sample() {
        let mut aggregator = Aggregator::new(count(3));
        aggregator.offer(bin("s1", "AMP1", 1)).unwrap();
        let err = aggregator.offer(bin("s1", "AMP1", 1)).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateAmpliconBin { .. }));

        // later bins for the failed sample are dropped, and nothing is emitted
        assert_eq!(aggregator.offer(bin("s1", "AMP2", 1)).unwrap(), Offer::Discarded);
        assert_eq!(aggregator.offer(bin("s1", "AMP3", 1)).unwrap(), Offer::Discarded);
        assert!(aggregator.finish().is_empty());
    }

    #[test]
    fn test_emits_once() {
        let mut aggregator = Aggregator::new(count(1));
        assert!(matches!(
            aggregator.offer(bin("s1", "AMP1", 1)).unwrap(),
            Offer::Complete(_)
        ));
        assert!(matches!(
            aggregator.offer(bin("s1", "AMP1", 1)),
            Err(PipelineError::DuplicateAmpliconBin { .. })
        ));
        // a late duplicate does not undo the completion
        assert!(aggregator.is_complete("s1"));
    }

    #[test]
    fn test_samples_are_independent() {
        let mut aggregator = Aggregator::new(count(2));
        aggregator.offer(bin("a", "AMP1", 1)).unwrap();
        aggregator.offer(bin("b", "AMP2", 1)).unwrap();
        assert!(matches!(
            aggregator.offer(bin("b", "AMP1", 1)).unwrap(),
            Offer::Complete(SampleAggregate { ref sample, .. }) if sample == "b"
        ));
        assert_eq!(aggregator.observed("a"), Some(1));
    }

    proptest! {
        #[test]
        fn test_any_arrival_order_completes_once(
            order in Just((1..=8usize).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let mut aggregator = Aggregator::new(count(8));
            let mut completions = 0;
            for (i, amp) in order.iter().enumerate() {
                match aggregator.offer(bin("s", &format!("AMP{amp}"), 1)).unwrap() {
                    Offer::Complete(aggregate) => {
                        completions += 1;
                        prop_assert_eq!(i, 7);
                        prop_assert_eq!(aggregate.bins.len(), 8);
                    }
                    Offer::Waiting { observed, .. } => prop_assert_eq!(observed, i + 1),
                    Offer::Discarded => prop_assert!(false, "nothing should be discarded"),
                }
            }
            prop_assert_eq!(completions, 1);
        }
    }
}
