//! Splitting a primer table into alternative primer combinations.
//!
//! Resplicing writes every LEFT x RIGHT spike-in combination with a
//! `_spliceN` tag. Each distinct tag becomes its own [`PrimerCombination`];
//! untagged rows form the implicit `default` combination. The split is
//! exhaustive and disjoint, and combinations keep the order in which their
//! first row appears in the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::bed::{write_bed, PrimerRecord};
use crate::error::{PipelineError, Result};
use crate::naming::{AmpliconId, PrimerSide};

pub const DEFAULT_COMBINATION: &str = "default";

/// A LEFT/RIGHT primer pair for one amplicon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimerPair {
    pub amplicon: AmpliconId,
    pub combination: String,
    pub left: PrimerRecord,
    pub right: PrimerRecord,
}

/// One alternative primer set, as a BED sub-table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimerCombination {
    pub tag: String,
    pub records: Vec<PrimerRecord>,
}

impl PrimerCombination {
    /// Pair up LEFT and RIGHT primers by amplicon, in declared order. Every
    /// amplicon must have exactly one primer on each side.
    pub fn pairs(&self) -> Result<Vec<PrimerPair>> {
        let mut order: Vec<AmpliconId> = Vec::new();
        let mut sides: HashMap<AmpliconId, (Vec<&PrimerRecord>, Vec<&PrimerRecord>)> =
            HashMap::new();

        for record in &self.records {
            let entry = sides.entry(record.amplicon.clone()).or_insert_with(|| {
                order.push(record.amplicon.clone());
                (Vec::new(), Vec::new())
            });
            match record.side {
                Some(PrimerSide::Left) => entry.0.push(record),
                Some(PrimerSide::Right) => entry.1.push(record),
                None => {
                    return Err(PipelineError::MalformedPrimerFile(format!(
                        "cannot tell whether primer {} is a LEFT or RIGHT primer",
                        record.name
                    )))
                }
            }
        }

        order
            .into_iter()
            .map(|amplicon| {
                let (lefts, rights) = &sides[&amplicon];
                match (lefts.as_slice(), rights.as_slice()) {
                    ([left], [right]) => Ok(PrimerPair {
                        amplicon: amplicon.clone(),
                        combination: self.tag.clone(),
                        left: (*left).clone(),
                        right: (*right).clone(),
                    }),
                    ([], _) | (_, []) => Err(PipelineError::MalformedPrimerFile(format!(
                        "amplicon {} in combination {} has {} LEFT and {} RIGHT primers; \
                        every amplicon needs one of each",
                        amplicon,
                        self.tag,
                        lefts.len(),
                        rights.len()
                    ))),
                    _ => Err(PipelineError::MalformedPrimerFile(format!(
                        "amplicon {} in combination {} has {} LEFT and {} RIGHT primers; \
                        resplice spike-in primers before splitting",
                        amplicon,
                        self.tag,
                        lefts.len(),
                        rights.len()
                    ))),
                }
            })
            .collect()
    }
}

/// Split the primer table by combination tag and check that every
/// combination pairs up cleanly.
pub fn split_combinations(records: &[PrimerRecord]) -> Result<Vec<PrimerCombination>> {
    if records.is_empty() {
        return Err(PipelineError::MalformedPrimerFile(
            "the primer table has no rows".to_string(),
        ));
    }

    let mut combinations: Vec<PrimerCombination> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let tag = record
            .combination
            .clone()
            .unwrap_or_else(|| DEFAULT_COMBINATION.to_string());
        let slot = *index.entry(tag.clone()).or_insert_with(|| {
            combinations.push(PrimerCombination {
                tag,
                records: Vec::new(),
            });
            combinations.len() - 1
        });
        combinations[slot].records.push(record.clone());
    }

    for combination in &combinations {
        let pairs = combination.pairs()?;
        debug!(
            "Combination {} holds {} primer pairs",
            combination.tag,
            pairs.len()
        );
    }

    info!(
        "{} primers split into {} primer combination(s).",
        records.len(),
        combinations.len()
    );
    Ok(combinations)
}

/// Write each combination to `<dir>/<tag>.bed`.
pub fn write_combination_beds(combinations: &[PrimerCombination], dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    combinations
        .iter()
        .map(|combination| {
            let path = dir.join(format!("{}.bed", combination.tag));
            write_bed(&combination.records, &path)?;
            Ok(path)
        })
        .collect()
}
