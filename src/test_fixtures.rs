//! Synthetic primer schemes and reads shared by the unit tests.

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::bed::PrimerRecord;
use crate::combinations::{split_combinations, PrimerCombination};
use crate::naming::PrimerNaming;
use crate::reads::ReadRecord;
use crate::reference::ReferenceIndex;

pub const REFERENCE_LEN: usize = 420;

/// (name, start, end) rows of a two-amplicon tiling over [`reference`].
pub const SCHEME: [(&str, u64, u64); 4] = [
    ("AMP1_LEFT", 10, 30),
    ("AMP1_RIGHT", 190, 210),
    ("AMP2_LEFT", 220, 240),
    ("AMP2_RIGHT", 400, 420),
];

pub fn random_bases(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = XorShiftRng::seed_from_u64(seed);
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

pub fn reference() -> ReferenceIndex {
    ReferenceIndex::from_contigs([("ref", random_bases(REFERENCE_LEN, 7))])
}

pub fn records(rows: &[(&str, u64, u64)]) -> Vec<PrimerRecord> {
    let naming = PrimerNaming::default();
    rows.iter()
        .map(|(name, start, end)| PrimerRecord::new("ref", *start, *end, *name, &naming).unwrap())
        .collect()
}

pub fn combinations(rows: &[(&str, u64, u64)]) -> Vec<PrimerCombination> {
    split_combinations(&records(rows)).unwrap()
}

pub fn bed_text(rows: &[(&str, u64, u64)]) -> String {
    rows.iter()
        .map(|(name, start, end)| format!("ref\t{start}\t{end}\t{name}\n"))
        .collect()
}

/// A read spanning `start..end` of the reference, as sequenced off the
/// forward strand.
pub fn amplicon_read(reference: &ReferenceIndex, id: &str, start: usize, end: usize) -> ReadRecord {
    let seq = &reference.get("ref").unwrap()[start..end];
    ReadRecord::new(id, seq, &vec![b'I'; seq.len()])
}
