//! Reading and writing primer BED tables.
//!
//! Primer schemes arrive as headerless, tab-separated BED files with at least
//! four columns: reference, start, stop and primer name. A fifth (pool/score)
//! and sixth (strand) column are carried through when present.

use std::fs::File;
use std::path::{Path, PathBuf};

use itertools::izip;
use log::{debug, error, info};
use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::naming::{AmpliconId, PrimerNaming, PrimerSide};

const RAW_COLUMNS: [&str; 6] = [
    "column_1", "column_2", "column_3", "column_4", "column_5", "column_6",
];
const BED_COLUMNS: [&str; 6] = [
    "Ref",
    "Start Position",
    "Stop Position",
    "NAME",
    "INDEX",
    "SENSE",
];

/// One row of a primer BED file with the identity derived from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimerRecord {
    pub reference: String,
    pub start: u64,
    pub end: u64,
    pub name: String,
    pub score: Option<String>,
    pub strand: Option<String>,
    pub amplicon: AmpliconId,
    pub side: Option<PrimerSide>,
    pub combination: Option<String>,
}

impl PrimerRecord {
    pub fn new(
        reference: impl Into<String>,
        start: u64,
        end: u64,
        name: impl Into<String>,
        naming: &PrimerNaming,
    ) -> Result<Self> {
        let reference = reference.into();
        let name = name.into();
        if start >= end {
            return Err(PipelineError::MalformedPrimerFile(format!(
                "primer {name} has start {start} at or after its stop {end}"
            )));
        }
        let parsed = naming.parse(&name)?;
        Ok(PrimerRecord {
            reference,
            start,
            end,
            name,
            score: None,
            strand: None,
            amplicon: parsed.amplicon,
            side: parsed.side,
            combination: parsed.combination,
        })
    }

    /// Attach the optional BED columns. In lenient naming mode the strand
    /// column decides the side of primers whose names lack a suffix.
    pub fn with_extra_columns(mut self, score: Option<String>, strand: Option<String>) -> Self {
        if self.side.is_none() {
            self.side = strand.as_deref().and_then(PrimerSide::from_strand);
        }
        self.score = score;
        self.strand = strand;
        self
    }

    /// Same coordinates under a new primer name.
    pub fn renamed(&self, name: impl Into<String>, naming: &PrimerNaming) -> Result<Self> {
        Ok(PrimerRecord::new(&*self.reference, self.start, self.end, name, naming)?
            .with_extra_columns(self.score.clone(), self.strand.clone()))
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Bail out early with a hint when the primer BED is missing.
pub fn check_bed_existence(path: &Path) -> Result<()> {
    info!("Parsing input BED file at {:?}...", path);

    if path.is_file() {
        return Ok(());
    }

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let bed_files: Vec<PathBuf> = std::fs::read_dir(parent)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("bed"))
                .collect()
        })
        .unwrap_or_default();

    if bed_files.is_empty() {
        error!(
            "The provided input BED file, {:?}, does not exist or is not a file. Aborting.",
            path
        );
    } else {
        error!(
            "The provided input BED file, {:?}, does not exist or is not a file. \
            Perhaps you meant one of the following files?\n{:#?}",
            path, bed_files
        );
    }
    Err(PipelineError::MalformedPrimerFile(format!(
        "primer BED {path:?} not found"
    )))
}

fn malformed(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::MalformedPrimerFile(format!("{path:?}: {err}"))
}

/// Load a primer BED into a data frame with named columns.
pub fn read_bed_frame(path: &Path) -> Result<DataFrame> {
    check_bed_existence(path)?;

    let mut parse_options = CsvParseOptions::default();
    parse_options.separator = b'\t';

    let frame = CsvReadOptions::default()
        .with_has_header(false)
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| malformed(path, e))?;

    if frame.width() < 4 {
        return Err(malformed(
            path,
            format!(
                "expected at least 4 tab-separated columns (ref, start, stop, name), found {}",
                frame.width()
            ),
        ));
    }
    if frame.height() == 0 {
        return Err(malformed(path, "no primer rows"));
    }

    frame
        .lazy()
        .rename(RAW_COLUMNS, BED_COLUMNS, false)
        .collect()
        .map_err(|e| malformed(path, e))
}

/// Convert a BED data frame into typed primer records, in file order.
pub fn records_from_frame(
    frame: &DataFrame,
    naming: &PrimerNaming,
    path: &Path,
) -> Result<Vec<PrimerRecord>> {
    let text_column = |name: &str| -> Result<Option<Column>> {
        match frame.column(name) {
            Ok(column) => column
                .cast(&DataType::String)
                .map(Some)
                .map_err(|e| malformed(path, e)),
            Err(_) => Ok(None),
        }
    };
    let int_column = |name: &str| -> Result<Column> {
        frame
            .column(name)
            .and_then(|column| column.cast(&DataType::Int64))
            .map_err(|e| malformed(path, e))
    };

    let refs = text_column(BED_COLUMNS[0])?.ok_or_else(|| malformed(path, "missing Ref"))?;
    let names = text_column(BED_COLUMNS[3])?.ok_or_else(|| malformed(path, "missing NAME"))?;
    let starts = int_column(BED_COLUMNS[1])?;
    let stops = int_column(BED_COLUMNS[2])?;
    let scores = text_column(BED_COLUMNS[4])?;
    let strands = text_column(BED_COLUMNS[5])?;

    let refs = refs.str().map_err(|e| malformed(path, e))?;
    let names = names.str().map_err(|e| malformed(path, e))?;
    let starts = starts.i64().map_err(|e| malformed(path, e))?;
    let stops = stops.i64().map_err(|e| malformed(path, e))?;
    let scores = scores
        .as_ref()
        .map(|c| c.str().map_err(|e| malformed(path, e)))
        .transpose()?;
    let strands = strands
        .as_ref()
        .map(|c| c.str().map_err(|e| malformed(path, e)))
        .transpose()?;

    let mut records = Vec::with_capacity(frame.height());
    for (row, (reference, start, stop, name)) in
        izip!(refs.into_iter(), starts.into_iter(), stops.into_iter(), names.into_iter())
            .enumerate()
    {
        let line = row + 1;
        let (Some(reference), Some(start), Some(stop), Some(name)) = (reference, start, stop, name)
        else {
            return Err(malformed(
                path,
                format!("line {line} is missing one of the first four columns or has non-integer coordinates"),
            ));
        };
        if start < 0 || stop < 0 {
            return Err(malformed(path, format!("line {line} has negative coordinates")));
        }

        let score = scores.and_then(|s| s.get(row)).map(str::to_string);
        let strand = strands.and_then(|s| s.get(row)).map(str::to_string);
        let record = PrimerRecord::new(reference, start as u64, stop as u64, name, naming)
            .map_err(|e| malformed(path, format!("line {line}: {e}")))?
            .with_extra_columns(score, strand);
        records.push(record);
    }

    debug!("Parsed {} primer records from {:?}", records.len(), path);
    Ok(records)
}

/// Read a primer BED file into typed records.
pub fn read_bed(path: &Path, naming: &PrimerNaming) -> Result<Vec<PrimerRecord>> {
    let frame = read_bed_frame(path)?;
    records_from_frame(&frame, naming, path)
}

/// Write primer records as a headerless, tab-separated BED file. The score and
/// strand columns are written only when every record carries them.
pub fn write_bed(records: &[PrimerRecord], path: &Path) -> Result<()> {
    let mut columns: Vec<Column> = vec![
        Series::new(
            BED_COLUMNS[0].into(),
            records.iter().map(|r| r.reference.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            BED_COLUMNS[1].into(),
            records.iter().map(|r| r.start as i64).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            BED_COLUMNS[2].into(),
            records.iter().map(|r| r.end as i64).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            BED_COLUMNS[3].into(),
            records.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
        )
        .into(),
    ];

    let scores: Option<Vec<String>> = records.iter().map(|r| r.score.clone()).collect();
    if let Some(scores) = scores {
        columns.push(Series::new(BED_COLUMNS[4].into(), scores).into());
        let strands: Option<Vec<String>> = records.iter().map(|r| r.strand.clone()).collect();
        if let Some(strands) = strands {
            columns.push(Series::new(BED_COLUMNS[5].into(), strands).into());
        }
    }

    let mut frame = DataFrame::new(columns).map_err(|e| malformed(path, e))?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(false)
        .with_separator(b'\t')
        .finish(&mut frame)
        .map_err(|e| malformed(path, e))?;

    debug!("Wrote {} primer records to {:?}", records.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_bed(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("primers.bed");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_bed_six_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_bed(
            dir.path(),
            "MN908947.3\t30\t54\tAMP1_LEFT\t1\t+\n\
             MN908947.3\t385\t410\tAMP1_RIGHT\t1\t-\n",
        );
        let records = read_bed(&path, &PrimerNaming::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reference, "MN908947.3");
        assert_eq!(records[0].start, 30);
        assert_eq!(records[0].end, 54);
        assert_eq!(records[0].amplicon.as_str(), "AMP1");
        assert_eq!(records[0].side, Some(PrimerSide::Left));
        assert_eq!(records[1].side, Some(PrimerSide::Right));
        assert_eq!(records[1].score.as_deref(), Some("1"));
        assert_eq!(records[1].strand.as_deref(), Some("-"));
    }

    #[test]
    fn test_read_bed_four_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_bed(dir.path(), "ref\t0\t20\tA_LEFT\nref\t80\t100\tA_RIGHT\n");
        let records = read_bed(&path, &PrimerNaming::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.score.is_none() && r.strand.is_none()));
    }

    #[test]
    fn test_read_bed_too_few_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_bed(dir.path(), "ref\t0\t20\nref\t80\t100\n");
        let err = read_bed(&path, &PrimerNaming::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPrimerFile(_)));
        assert!(err.to_string().contains("at least 4"));
    }

    #[test]
    fn test_read_bed_one_short_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_bed(
            dir.path(),
            "ref\t0\t20\tAMP1_LEFT\nref\t80\t100\n\
             ref\t90\t110\tAMP2_LEFT\nref\t200\t220\tAMP2_RIGHT\n",
        );
        let err = read_bed(&path, &PrimerNaming::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPrimerFile(_)));
        assert!(err.to_string().contains("primers.bed"));
    }

    #[test]
    fn test_read_bed_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_bed(dir.path(), "ref\t0\t20\tprimer_one\nref\t80\t100\tA_RIGHT\n");
        let err = read_bed(&path, &PrimerNaming::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPrimerFile(_)));
    }

    #[test]
    fn test_read_bed_lenient_uses_strand() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_bed(dir.path(), "ref\t0\t20\tampA\t1\t+\nref\t80\t100\tampA\t1\t-\n");
        let naming = PrimerNaming::default().lenient(true);
        let records = read_bed(&path, &naming).unwrap();
        assert_eq!(records[0].side, Some(PrimerSide::Left));
        assert_eq!(records[1].side, Some(PrimerSide::Right));
        assert_eq!(records[0].amplicon, records[1].amplicon);
    }

    #[test]
    fn test_missing_bed_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_bed(&dir.path().join("nope.bed"), &PrimerNaming::default()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_write_then_read_bed() {
        let dir = tempfile::tempdir().unwrap();
        let naming = PrimerNaming::default();
        let records = vec![
            PrimerRecord::new("ref", 0, 20, "A_LEFT", &naming).unwrap(),
            PrimerRecord::new("ref", 80, 100, "A_RIGHT", &naming).unwrap(),
        ];
        let path = dir.path().join("out.bed");
        write_bed(&records, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().next(), Some("ref\t0\t20\tA_LEFT"));
        assert_eq!(read_bed(&path, &naming).unwrap(), records);
    }

    #[test]
    fn test_record_rejects_inverted_coordinates() {
        let err = PrimerRecord::new("ref", 20, 10, "A_LEFT", &PrimerNaming::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPrimerFile(_)));
    }
}
