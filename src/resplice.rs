//! Resplicing spike-in primers into explicit primer combinations.
//!
//! Schemes that were patched with extra spike-in primers (`AMP5_LEFT-1`,
//! `AMP5_LEFT-2`, ...) only list each primer once, leaving the possible
//! LEFT/RIGHT pairings implicit. Resplicing re-indexes every primer 1-based
//! and writes out every LEFT x RIGHT pairing of a spiked amplicon as its own
//! `_spliceN` pair, which is what [`crate::combinations`] splits on.

use std::collections::HashMap;
use std::path::Path;

use itertools::Itertools;
use log::{debug, error, info, warn};

use crate::bed::{check_bed_existence, read_bed, write_bed, PrimerRecord};
use crate::error::{PipelineError, Result};
use crate::naming::{AmpliconId, PrimerNaming, PrimerSide, SPLICE_SEPARATOR};

/// Primer names holding the index delimiter more than once.
pub fn check_idx_delims(records: &[PrimerRecord], idx_delim: &str) -> Vec<String> {
    let warning_list: Vec<String> = records
        .iter()
        .filter(|r| r.name.matches(idx_delim).count() > 1)
        .map(|r| r.name.clone())
        .collect();

    if !warning_list.is_empty() {
        warn!(
            "{} primer names contained more than one of the symbol used to delimit spike-in primer index, '{}', \
            which is a special value in this program. Unexpected behavior, such as merging multiple amplicons \
            into one or incorrect resplicing, is likely to occur.\n\n\
            To fix it, either use a different delimiter symbol than '{}' or modify the primer names so that \
            the symbol '{}' is only used to denote a spike-in index.\n\n\
            Below is the list of {} primers that generated this warning:\n{:#?}",
            warning_list.len(),
            idx_delim,
            idx_delim,
            idx_delim,
            warning_list.len(),
            warning_list
        );
    }
    warning_list
}

/// Primers of one amplicon, split by side, in file order.
#[derive(Debug, Default)]
struct AmpliconPrimers<'a> {
    left: Vec<&'a PrimerRecord>,
    right: Vec<&'a PrimerRecord>,
}

fn partition_by_amplicon<'a>(
    records: &'a [PrimerRecord],
) -> Result<Vec<(AmpliconId, AmpliconPrimers<'a>)>> {
    let mut order: Vec<(AmpliconId, AmpliconPrimers<'a>)> = Vec::new();
    let mut index: HashMap<&AmpliconId, usize> = HashMap::new();

    for record in records {
        let slot = *index.entry(&record.amplicon).or_insert_with(|| {
            order.push((record.amplicon.clone(), AmpliconPrimers::default()));
            order.len() - 1
        });
        let primers = &mut order[slot].1;
        match record.side {
            Some(PrimerSide::Left) => primers.left.push(record),
            Some(PrimerSide::Right) => primers.right.push(record),
            None => {
                return Err(PipelineError::MalformedPrimerFile(format!(
                    "cannot resplice primer {}: it is neither a LEFT nor a RIGHT primer",
                    record.name
                )))
            }
        }
    }
    Ok(order)
}

fn indexed_name(amplicon: &AmpliconId, side: PrimerSide, naming: &PrimerNaming, index: usize) -> String {
    format!(
        "{}{}{}{}",
        amplicon,
        naming.suffix(side),
        naming.idx_delim(),
        index
    )
}

fn spliced_name(amplicon: &AmpliconId, side: PrimerSide, naming: &PrimerNaming, combination: usize) -> String {
    format!(
        "{}{}{}{}",
        amplicon,
        naming.suffix(side),
        SPLICE_SEPARATOR,
        combination
    )
}

/// Resplice a primer table. Amplicons with one primer per side keep their
/// primers under fresh `-1` indices; amplicons with spike-ins are expanded
/// into every LEFT x RIGHT pairing. Output is sorted by reference, start and
/// stop.
pub fn resplice(records: &[PrimerRecord], naming: &PrimerNaming) -> Result<Vec<PrimerRecord>> {
    check_idx_delims(records, naming.idx_delim());

    let amplicons = partition_by_amplicon(records)?;
    info!(
        "{} input primers split into {} discrete amplicons.",
        records.len(),
        amplicons.len()
    );
    if records.len() > 2 * amplicons.len() {
        info!(
            "There appear to be {} spike-in primers.",
            records.len() - 2 * amplicons.len()
        );
    }

    let mut output = Vec::new();
    let mut skipped = 0usize;
    for (amplicon, primers) in &amplicons {
        let total = primers.left.len() + primers.right.len();
        if total == 1 {
            error!(
                "There is a single primer without an amplicon running around! \
                Here are the primers parsed for amplicon {}:\n{:#?}",
                amplicon,
                primers.left.iter().chain(&primers.right).collect::<Vec<_>>()
            );
            return Err(PipelineError::MalformedPrimerFile(format!(
                "amplicon {amplicon} has a single primer without a partner"
            )));
        }

        if primers.left.is_empty() || primers.right.is_empty() {
            warn!(
                "Incorrect splicing occurred for the primers of amplicon {} ({} LEFT, {} RIGHT). \
                The amplicon will be skipped.",
                amplicon,
                primers.left.len(),
                primers.right.len()
            );
            skipped += 1;
            continue;
        }

        if total == 2 {
            debug!(
                "Pair of primers within the amplicon {} detected. No resplicing needed.",
                amplicon
            );
            output.push(primers.left[0].renamed(indexed_name(amplicon, PrimerSide::Left, naming, 1), naming)?);
            output.push(primers.right[0].renamed(indexed_name(amplicon, PrimerSide::Right, naming, 1), naming)?);
            continue;
        }

        debug!(
            "Resplicing {} LEFT and {} RIGHT primers of amplicon {}",
            primers.left.len(),
            primers.right.len(),
            amplicon
        );
        for (i, (left, right)) in primers
            .left
            .iter()
            .cartesian_product(primers.right.iter())
            .enumerate()
        {
            output.push(left.renamed(spliced_name(amplicon, PrimerSide::Left, naming, i + 1), naming)?);
            output.push(right.renamed(spliced_name(amplicon, PrimerSide::Right, naming, i + 1), naming)?);
        }
    }

    if skipped > 0 {
        warn!(
            "{} of {} amplicon primer sets did not make it through resplicing. \
            Data loss may have occurred for this primer set.",
            skipped,
            amplicons.len()
        );
    }

    output.sort_by(|a, b| {
        (&a.reference, a.start, a.end).cmp(&(&b.reference, b.start, b.end))
    });
    info!(
        "The input BED file contained {} primers. After searching for any spike-ins to resplice, \
        the final BED file contains {}",
        records.len(),
        output.len()
    );
    Ok(output)
}

/// Read a BED, resplice it and write the result to `output`.
pub fn resplice_bed(input: &Path, output: &Path, naming: &PrimerNaming) -> Result<Vec<PrimerRecord>> {
    check_bed_existence(input)?;
    let records = read_bed(input, naming)?;
    let respliced = resplice(&records, naming)?;
    write_bed(&respliced, output)?;
    info!(
        "Reading and processing of primers in {:?} was successful. \
        The output BED file was written to {:?}.",
        input, output
    );
    Ok(respliced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinations::split_combinations;
    use crate::counter::AmpliconCount;

    fn record(name: &str, start: u64, end: u64) -> PrimerRecord {
        PrimerRecord::new("MN908947.3", start, end, name, &PrimerNaming::default()).unwrap()
    }

    fn names(records: &[PrimerRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_plain_pairs_reindexed() {
        let records = vec![
            record("AMP1_LEFT", 30, 54),
            record("AMP1_RIGHT", 385, 410),
        ];
        let out = resplice(&records, &PrimerNaming::default()).unwrap();
        assert_eq!(names(&out), vec!["AMP1_LEFT-1", "AMP1_RIGHT-1"]);
    }

    #[test]
    fn test_spike_ins_expand_to_every_pairing() {
        let records = vec![
            record("AMP1_LEFT", 30, 54),
            record("AMP1_RIGHT", 385, 410),
            record("AMP2_LEFT-1", 320, 342),
            record("AMP2_LEFT-2", 322, 345),
            record("AMP2_RIGHT-1", 704, 726),
            record("AMP2_RIGHT-2", 708, 730),
        ];
        let naming = PrimerNaming::default();
        let out = resplice(&records, &naming).unwrap();
        assert_eq!(out.len(), 2 + 8);

        let amp2: Vec<&str> = names(&out)
            .into_iter()
            .filter(|n| n.starts_with("AMP2"))
            .collect();
        assert_eq!(
            amp2,
            vec![
                "AMP2_LEFT_splice1",
                "AMP2_LEFT_splice2",
                "AMP2_LEFT_splice3",
                "AMP2_LEFT_splice4",
                "AMP2_RIGHT_splice1",
                "AMP2_RIGHT_splice3",
                "AMP2_RIGHT_splice2",
                "AMP2_RIGHT_splice4",
            ]
        );
        assert!(out.windows(2).all(|w| w[0].start <= w[1].start));

        // the respliced table splits cleanly and still counts two amplicons
        let combinations = split_combinations(&out).unwrap();
        let tags: Vec<&str> = combinations.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags, vec!["default", "splice1", "splice2", "splice3", "splice4"]);
        assert_eq!(AmpliconCount::from_records(&out).get(), 2);
    }

    #[test]
    fn test_orphan_primer_rejected() {
        let records = vec![
            record("AMP1_LEFT", 30, 54),
            record("AMP1_RIGHT", 385, 410),
            record("AMP2_LEFT", 320, 342),
        ];
        assert!(matches!(
            resplice(&records, &PrimerNaming::default()),
            Err(PipelineError::MalformedPrimerFile(_))
        ));
    }

    #[test]
    fn test_one_sided_amplicon_skipped() {
        let records = vec![
            record("AMP1_LEFT", 30, 54),
            record("AMP1_RIGHT", 385, 410),
            record("AMP2_LEFT-1", 320, 342),
            record("AMP2_LEFT-2", 322, 345),
        ];
        let out = resplice(&records, &PrimerNaming::default()).unwrap();
        assert_eq!(names(&out), vec!["AMP1_LEFT-1", "AMP1_RIGHT-1"]);
    }

    #[test]
    fn test_check_idx_delims() {
        let records = vec![record("SARS-CoV-2_1_LEFT", 30, 54), record("AMP1_RIGHT-1", 385, 410)];
        assert_eq!(check_idx_delims(&records, "-"), vec!["SARS-CoV-2_1_LEFT"]);
    }

    #[test]
    fn test_resplice_bed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scheme.bed");
        let output = dir.path().join("respliced.bed");
        std::fs::write(
            &input,
            "ref\t10\t30\tAMP1_LEFT-1\t1\t+\n\
             ref\t12\t32\tAMP1_LEFT-2\t1\t+\n\
             ref\t190\t210\tAMP1_RIGHT-1\t1\t-\n",
        )
        .unwrap();
        let naming = PrimerNaming::default();
        let respliced = resplice_bed(&input, &output, &naming).unwrap();
        assert_eq!(respliced.len(), 4);

        let reread = read_bed(&output, &naming).unwrap();
        assert_eq!(reread, respliced);
        assert_eq!(reread[0].strand.as_deref(), Some("+"));
    }
}
