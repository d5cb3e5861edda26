//! Primer sequence extraction and pattern compilation.
//!
//! Each primer pair is sliced out of the reference and turned into a pair of
//! IUPAC-aware search patterns. Reads are oriented to the reference before
//! classification, so both patterns are searched in reference orientation:
//! the LEFT pattern is the primer itself and the RIGHT pattern is the reverse
//! complement of the RIGHT primer oligo, i.e. the reference bases under it.

use log::{debug, info, warn};

use crate::combinations::{PrimerCombination, PrimerPair};
use crate::error::{PipelineError, Result};
use crate::naming::{AmpliconId, PrimerSide};
use crate::reference::ReferenceIndex;
use crate::sequence::{first_invalid_base, reverse_complement};

/// Primers shorter than this are likely to produce spurious matches.
const SHORT_PRIMER_WARNING: usize = 10;

/// A compiled, fuzzy primer matcher for one side of an amplicon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimerPattern {
    pub primer: String,
    pub amplicon: AmpliconId,
    pub side: PrimerSide,
    /// The primer as synthesized, 5' to 3'.
    pub oligo: Vec<u8>,
    /// What to look for in a read oriented like the reference.
    pub target: Vec<u8>,
    /// Edit distance budget for a match.
    pub max_mismatch: usize,
}

impl PrimerPattern {
    fn compile(
        primer: &str,
        amplicon: &AmpliconId,
        side: PrimerSide,
        reference_bases: &[u8],
        max_mismatch: usize,
    ) -> Result<Self> {
        let target = reference_bases.to_ascii_uppercase();
        if let Some(base) = first_invalid_base(&target) {
            return Err(PipelineError::MalformedPrimerFile(format!(
                "primer {primer} covers a non-nucleotide reference character '{}'",
                base as char
            )));
        }
        if target.len() < SHORT_PRIMER_WARNING {
            warn!(
                "Primer {} is very short ({} bp), may cause false matches",
                primer,
                target.len()
            );
        }
        let oligo = match side {
            PrimerSide::Left => target.clone(),
            PrimerSide::Right => reverse_complement(&target),
        };
        Ok(PrimerPattern {
            primer: primer.to_string(),
            amplicon: amplicon.clone(),
            side,
            oligo,
            target,
            max_mismatch: max_mismatch.min(reference_bases.len().saturating_sub(1)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternPair {
    pub amplicon: AmpliconId,
    pub combination: String,
    pub left: PrimerPattern,
    pub right: PrimerPattern,
}

impl PatternPair {
    pub fn extract(pair: &PrimerPair, reference: &ReferenceIndex, max_mismatch: usize) -> Result<Self> {
        let left_bases = reference.primer_bases(&pair.left)?;
        let right_bases = reference.primer_bases(&pair.right)?;
        Ok(PatternPair {
            amplicon: pair.amplicon.clone(),
            combination: pair.combination.clone(),
            left: PrimerPattern::compile(
                &pair.left.name,
                &pair.amplicon,
                PrimerSide::Left,
                left_bases,
                max_mismatch,
            )?,
            right: PrimerPattern::compile(
                &pair.right.name,
                &pair.amplicon,
                PrimerSide::Right,
                right_bases,
                max_mismatch,
            )?,
        })
    }
}

/// Every compiled pattern pair of the run, in declaration order: combinations
/// in file order, pairs in file order within each combination.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternSet {
    pairs: Vec<PatternPair>,
}

impl PatternSet {
    pub fn compile(
        combinations: &[PrimerCombination],
        reference: &ReferenceIndex,
        max_mismatch: usize,
    ) -> Result<Self> {
        let mut pairs = Vec::new();
        for combination in combinations {
            for pair in combination.pairs()? {
                let compiled = PatternPair::extract(&pair, reference, max_mismatch)?;
                debug!(
                    "{} [{}]: LEFT {} / RIGHT {}",
                    compiled.amplicon,
                    compiled.combination,
                    String::from_utf8_lossy(&compiled.left.oligo),
                    String::from_utf8_lossy(&compiled.right.oligo)
                );
                pairs.push(compiled);
            }
        }
        info!(
            "Compiled {} primer pattern pairs across {} combination(s), allowing {} mismatches.",
            pairs.len(),
            combinations.len(),
            max_mismatch
        );
        Ok(PatternSet { pairs })
    }

    /// Wrap already compiled pairs, keeping their order.
    pub fn from_pairs(pairs: Vec<PatternPair>) -> Self {
        PatternSet { pairs }
    }

    pub fn pairs(&self) -> &[PatternPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The LEFT/RIGHT patterns of one amplicon within one combination.
    pub fn lookup(&self, combination: &str, amplicon: &AmpliconId) -> Option<&PatternPair> {
        self.pairs
            .iter()
            .find(|p| p.combination == combination && &p.amplicon == amplicon)
    }
}
