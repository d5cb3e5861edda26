//! Seeded depth normalization of complete samples.

use log::debug;
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use crate::reads::ReadRecord;

pub const DEFAULT_SEED: u64 = 42;

/// Subsamples reads without replacement to a fixed ceiling. Every sample
/// starts from a fresh generator seeded with the same value, so a sample's
/// result does not depend on which other samples were processed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Downsampler {
    ceiling: usize,
    seed: u64,
}

impl Downsampler {
    /// A `ceiling` of zero disables downsampling.
    pub fn new(ceiling: usize, seed: u64) -> Self {
        Downsampler { ceiling, seed }
    }

    pub fn is_enabled(&self) -> bool {
        self.ceiling > 0
    }

    /// Keep at most `ceiling` reads, preserving their input order.
    pub fn apply(&self, reads: Vec<ReadRecord>) -> Vec<ReadRecord> {
        if !self.is_enabled() || reads.len() <= self.ceiling {
            return reads;
        }

        let mut rng = XorShiftRng::seed_from_u64(self.seed);
        let mut keep = sample(&mut rng, reads.len(), self.ceiling).into_vec();
        keep.sort_unstable();
        debug!(
            "Downsampling {} reads to {}",
            reads.len(),
            self.ceiling
        );

        let mut keep = keep.into_iter().peekable();
        reads
            .into_iter()
            .enumerate()
            .filter_map(|(i, read)| {
                if keep.peek() == Some(&i) {
                    keep.next();
                    Some(read)
                } else {
                    None
                }
            })
            .collect()
    }
}
