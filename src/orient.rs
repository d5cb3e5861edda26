//! Reference-relative read orientation.
//!
//! Every reference k-mer goes into a hash set once. A read is scored by the
//! share of its k-mers found in that set, on the read as given and on its
//! reverse complement; reads scoring higher on the reverse complement are
//! flipped. Reads scoring below the similarity floor on both strands are
//! dropped.

use std::sync::atomic::{AtomicUsize, Ordering};

use fxhash::FxHashSet;
use log::{debug, info};

use crate::error::{PipelineError, Result};
use crate::reads::{ReadRecord, SampleUnit};
use crate::reference::ReferenceIndex;

pub const DEFAULT_KMER_SIZE: usize = 15;
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

fn encode(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' | b'U' | b'u' => Some(3),
        _ => None,
    }
}

/// Call `f` with the 2-bit packed value of every ACGT-only k-mer of `seq`.
fn for_each_kmer(seq: &[u8], k: usize, mut f: impl FnMut(u64)) {
    let mask = if k == 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
    let mut packed = 0u64;
    let mut filled = 0usize;
    for &base in seq {
        match encode(base) {
            Some(bits) => {
                packed = ((packed << 2) | bits) & mask;
                filled += 1;
                if filled >= k {
                    f(packed);
                }
            }
            None => {
                packed = 0;
                filled = 0;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct OrientStats {
    pub total_reads: AtomicUsize,
    pub forward: AtomicUsize,
    pub reverse: AtomicUsize,
    pub unmatched: AtomicUsize,
}

impl OrientStats {
    pub fn report(&self, output: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(output, "\nOrientation Statistics:")?;
        writeln!(
            output,
            "  Total reads: {}",
            self.total_reads.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Forward strand: {}",
            self.forward.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Reverse strand (flipped): {}",
            self.reverse.load(Ordering::Relaxed)
        )?;
        writeln!(
            output,
            "  Below similarity floor: {}",
            self.unmatched.load(Ordering::Relaxed)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Orienter {
    kmers: FxHashSet<u64>,
    k: usize,
    min_similarity: f64,
}

impl Orienter {
    pub fn new(reference: &ReferenceIndex, k: usize, min_similarity: f64) -> Result<Self> {
        if !(1..=32).contains(&k) {
            return Err(PipelineError::InvalidConfig(format!(
                "orientation k-mer size must be between 1 and 32, got {k}"
            )));
        }
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(PipelineError::InvalidConfig(format!(
                "min_orient_similarity must be between 0 and 1, got {min_similarity}"
            )));
        }

        let mut kmers = FxHashSet::default();
        for contig in reference.contigs() {
            for_each_kmer(&contig.sequence, k, |kmer| {
                kmers.insert(kmer);
            });
        }
        info!(
            "Indexed {} distinct reference {}-mers for read orientation",
            kmers.len(),
            k
        );
        Ok(Orienter {
            kmers,
            k,
            min_similarity,
        })
    }

    /// Share of the k-mers of `seq` that occur in the reference.
    pub fn similarity(&self, seq: &[u8]) -> f64 {
        let mut total = 0usize;
        let mut shared = 0usize;
        for_each_kmer(seq, self.k, |kmer| {
            total += 1;
            if self.kmers.contains(&kmer) {
                shared += 1;
            }
        });
        if total == 0 {
            0.0
        } else {
            shared as f64 / total as f64
        }
    }

    /// Return the read in reference orientation, or `None` when neither
    /// strand reaches the similarity floor. Ties keep the read as given.
    pub fn orient(&self, read: ReadRecord) -> Option<(ReadRecord, Strand)> {
        let forward = self.similarity(&read.seq);
        let flipped = read.reverse_complement();
        let reverse = self.similarity(&flipped.seq);

        if forward.max(reverse) < self.min_similarity || (forward == 0.0 && reverse == 0.0) {
            return None;
        }
        if reverse > forward {
            Some((flipped, Strand::Reverse))
        } else {
            Some((read, Strand::Forward))
        }
    }

    pub fn orient_sample(&self, mut unit: SampleUnit, stats: &OrientStats) -> SampleUnit {
        let reads = std::mem::take(&mut unit.reads);
        let before = reads.len();
        stats.total_reads.fetch_add(before, Ordering::Relaxed);

        let mut oriented = Vec::with_capacity(before);
        for read in reads {
            match self.orient(read) {
                Some((read, Strand::Forward)) => {
                    stats.forward.fetch_add(1, Ordering::Relaxed);
                    oriented.push(read);
                }
                Some((read, Strand::Reverse)) => {
                    stats.reverse.fetch_add(1, Ordering::Relaxed);
                    oriented.push(read);
                }
                None => {
                    stats.unmatched.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        debug!(
            "Sample {}: {} of {} reads oriented to the reference",
            unit.key(),
            oriented.len(),
            before
        );
        unit.with_reads(oriented)
    }
}
