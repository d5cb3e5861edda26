//! Assigning oriented reads to amplicons.
//!
//! A read belongs to an amplicon only when both its LEFT and RIGHT patterns
//! match, with the LEFT match ending at or before the RIGHT match starts.
//! Within one primer pair the placement with the lowest total edit cost wins,
//! ties going to the longer insert. Across pairs the lowest total cost wins
//! and equal costs go to the pair declared first: earlier combination, then
//! earlier pair within the combination.

use std::cmp;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use sassy::{profiles::Iupac, Searcher};

use crate::naming::AmpliconId;
use crate::patterns::{PatternPair, PatternSet};
use crate::reads::{ReadRecord, SampleUnit};

/// Why a read was left out of every bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unassigned {
    /// No LEFT pattern matched.
    NoLeftPrimer,
    /// A LEFT pattern matched but its RIGHT partner did not.
    NoRightPrimer,
    /// Both patterns matched, but never with LEFT before RIGHT.
    InvalidStructure,
}

/// Best placement of one primer pair in a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmpliconHit {
    /// Index into [`PatternSet::pairs`].
    pub pair_index: usize,
    /// Insert start, right after the LEFT match.
    pub insert_start: usize,
    /// Insert end, right before the RIGHT match.
    pub insert_end: usize,
    pub left_cost: i32,
    pub right_cost: i32,
    /// Another pair matched the read at the same total cost.
    pub ambiguous: bool,
}

impl AmpliconHit {
    pub fn total_cost(&self) -> i32 {
        self.left_cost + self.right_cost
    }

    pub fn insert_len(&self) -> usize {
        self.insert_end - self.insert_start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRead {
    pub read: ReadRecord,
    pub amplicon: AmpliconId,
    pub combination: String,
    pub insert: Range<usize>,
    pub cost: i32,
}

/// All reads of one sample assigned to one amplicon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmpliconBin {
    pub sample: String,
    pub amplicon: AmpliconId,
    pub reads: Vec<ClassifiedRead>,
}

#[derive(Debug, Default)]
pub struct ClassifyStats {
    pub total_reads: AtomicUsize,
    pub assigned: AtomicUsize,
    pub ambiguous: AtomicUsize,
    pub no_left_primer: AtomicUsize,
    pub no_right_primer: AtomicUsize,
    pub invalid_structure: AtomicUsize,
}

impl ClassifyStats {
    fn record(&self, outcome: &Result<AmpliconHit, Unassigned>) {
        self.total_reads.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Ok(hit) => {
                if hit.ambiguous {
                    self.ambiguous.fetch_add(1, Ordering::Relaxed);
                }
                &self.assigned
            }
            Err(Unassigned::NoLeftPrimer) => &self.no_left_primer,
            Err(Unassigned::NoRightPrimer) => &self.no_right_primer,
            Err(Unassigned::InvalidStructure) => &self.invalid_structure,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self, output: &mut dyn std::io::Write) -> std::io::Result<()> {
        let total = self.total_reads.load(Ordering::Relaxed);
        let assigned = self.assigned.load(Ordering::Relaxed);

        writeln!(output, "\nAmplicon Classification Statistics:")?;
        writeln!(output, "  Total reads classified: {}", total)?;
        if total > 0 {
            writeln!(
                output,
                "  Assigned to an amplicon: {} ({:.2}%)",
                assigned,
                100.0 * assigned as f64 / total as f64
            )?;
        } else {
            writeln!(output, "  Assigned to an amplicon: 0")?;
        }
        writeln!(
            output,
            "  Resolved by declaration order: {}",
            self.ambiguous.load(Ordering::Relaxed)
        )?;

        writeln!(output, "\nReads unassigned:")?;
        writeln!(
            output,
            "  No LEFT primer: {}",
            self.no_left_primer.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  No RIGHT primer: {}",
            self.no_right_primer.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Invalid structure: {}",
            self.invalid_structure.load(Ordering::Relaxed)
        )?;
        Ok(())
    }
}

/// Fuzzy primer matcher over a shared [`PatternSet`]. Each worker thread
/// holds its own clone; only the pattern set is shared.
#[derive(Clone)]
pub struct Classifier {
    patterns: Arc<PatternSet>,
    searcher: Searcher<Iupac>,
}

impl Classifier {
    pub fn new(patterns: Arc<PatternSet>) -> Self {
        Classifier {
            patterns,
            // reads are already in reference orientation
            searcher: Searcher::new(false, None),
        }
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Best placement of a single pair, or why there is none.
    fn place_pair(
        &mut self,
        pair_index: usize,
        pair: &PatternPair,
        seq: &[u8],
    ) -> Result<AmpliconHit, Unassigned> {
        let left_matches = self
            .searcher
            .search(pair.left.target.as_slice(), seq, pair.left.max_mismatch);
        if left_matches.is_empty() {
            return Err(Unassigned::NoLeftPrimer);
        }

        let right_matches = self
            .searcher
            .search(pair.right.target.as_slice(), seq, pair.right.max_mismatch);
        if right_matches.is_empty() {
            return Err(Unassigned::NoRightPrimer);
        }

        let mut best: Option<AmpliconHit> = None;
        for left in &left_matches {
            for right in &right_matches {
                if left.text_end > right.text_start {
                    continue;
                }
                let candidate = AmpliconHit {
                    pair_index,
                    insert_start: left.text_end,
                    insert_end: right.text_start,
                    left_cost: left.cost,
                    right_cost: right.cost,
                    ambiguous: false,
                };
                let is_better = match &best {
                    None => true,
                    Some(current) => match candidate.total_cost().cmp(&current.total_cost()) {
                        cmp::Ordering::Less => true,
                        cmp::Ordering::Equal => candidate.insert_len() > current.insert_len(),
                        cmp::Ordering::Greater => false,
                    },
                };
                if is_better {
                    best = Some(candidate);
                }
            }
        }
        best.ok_or(Unassigned::InvalidStructure)
    }

    /// Find the one amplicon a read belongs to.
    pub fn classify_read(&mut self, read: &ReadRecord) -> Result<AmpliconHit, Unassigned> {
        let patterns = Arc::clone(&self.patterns);
        let mut best: Option<AmpliconHit> = None;
        let mut closest_miss = Unassigned::NoLeftPrimer;

        for (index, pair) in patterns.pairs().iter().enumerate() {
            match self.place_pair(index, pair, &read.seq) {
                Ok(hit) => {
                    let replace = match &mut best {
                        None => true,
                        Some(current) => match hit.total_cost().cmp(&current.total_cost()) {
                            cmp::Ordering::Less => true,
                            cmp::Ordering::Equal => {
                                current.ambiguous = true;
                                false
                            }
                            cmp::Ordering::Greater => false,
                        },
                    };
                    if replace {
                        best = Some(hit);
                    }
                }
                // report the failure that got furthest through the read structure
                Err(Unassigned::InvalidStructure) => closest_miss = Unassigned::InvalidStructure,
                Err(Unassigned::NoRightPrimer) if closest_miss == Unassigned::NoLeftPrimer => {
                    closest_miss = Unassigned::NoRightPrimer
                }
                Err(_) => {}
            }
        }

        best.ok_or(closest_miss)
    }

    /// Classify every read of a sample and group the hits into bins, one per
    /// amplicon that received at least one read.
    pub fn classify_sample(&mut self, unit: SampleUnit, stats: &ClassifyStats) -> Vec<AmpliconBin> {
        let patterns = Arc::clone(&self.patterns);
        let sample = unit.key().to_string();
        let mut bins: BTreeMap<AmpliconId, Vec<ClassifiedRead>> = BTreeMap::new();

        for read in unit.reads {
            let outcome = self.classify_read(&read);
            stats.record(&outcome);
            let Ok(hit) = outcome else { continue };

            let pair = &patterns.pairs()[hit.pair_index];
            bins.entry(pair.amplicon.clone())
                .or_default()
                .push(ClassifiedRead {
                    insert: hit.insert_start..hit.insert_end,
                    cost: hit.total_cost(),
                    amplicon: pair.amplicon.clone(),
                    combination: pair.combination.clone(),
                    read,
                });
        }

        debug!(
            "Sample {}: reads landed in {} amplicon bin(s)",
            sample,
            bins.len()
        );
        bins.into_iter()
            .map(|(amplicon, reads)| AmpliconBin {
                sample: sample.clone(),
                amplicon,
                reads,
            })
            .collect()
    }
}
