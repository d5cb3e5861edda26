//! The per-run amplicon count: how many distinct amplicons every sample must
//! deliver before it is considered complete.

use std::collections::HashSet;
use std::fmt;

use crate::bed::PrimerRecord;
use crate::naming::AmpliconId;

/// Number of distinct amplicons across the whole primer table, combinations
/// folded together. Computed once per run and then only copied around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmpliconCount(usize);

impl AmpliconCount {
    pub fn get(self) -> usize {
        self.0
    }

    pub fn from_records(records: &[PrimerRecord]) -> Self {
        let distinct: HashSet<&AmpliconId> = records.iter().map(|r| &r.amplicon).collect();
        AmpliconCount(distinct.len())
    }
}

impl fmt::Display for AmpliconCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
