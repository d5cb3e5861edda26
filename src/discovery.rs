//! Finding per-sample read files on disk.
//!
//! Nanopore runs deliver one FASTQ per barcode, either as a flat file
//! (`barcode01.fastq.gz`) or as a directory of chunks (`barcode01/*.fastq.gz`).
//! Illumina runs deliver paired `*_R1*` / `*_R2*` files per sample.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ont,
    Illumina,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFile {
    pub path: PathBuf,
    /// Appended to read ids to keep Illumina mates distinct.
    pub mate_suffix: Option<&'static str>,
}

/// The read files that make up one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSource {
    pub key: String,
    pub files: Vec<ReadFile>,
}

const FASTQ_NAME: &str = r"^(.+?)\.(?:fastq|fq)(?:\.gz)?$";
const ILLUMINA_NAME: &str = r"^(.+?)(?:_S\d+)?(?:_L\d{3})?_R([12])(?:_\d{3})?\.(?:fastq|fq)(?:\.gz)?$";

/// Compiled read file name patterns, built once per discovery.
struct FileNames {
    fastq: Regex,
    illumina: Regex,
}

impl FileNames {
    fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                PipelineError::InvalidConfig(format!("bad read file pattern {pattern:?}: {e}"))
            })
        };
        Ok(FileNames {
            fastq: compile(FASTQ_NAME)?,
            illumina: compile(ILLUMINA_NAME)?,
        })
    }

    /// The sample key of a flat FASTQ file name, extensions dropped.
    fn fastq_key(&self, path: &Path) -> Option<String> {
        let caps = self.fastq.captures(file_name(path)?)?;
        Some(caps[1].to_string())
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::read_input(dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

pub fn discover_samples(platform: Platform, dir: &Path) -> Result<Vec<SampleSource>> {
    if !dir.is_dir() {
        return Err(PipelineError::InvalidConfig(format!(
            "read directory {dir:?} does not exist"
        )));
    }
    let names = FileNames::new()?;
    let samples = match platform {
        Platform::Ont => discover_ont(dir, &names)?,
        Platform::Illumina => discover_illumina(dir, &names)?,
    };
    info!(
        "Found {} {:?} sample(s) in {:?}",
        samples.len(),
        platform,
        dir
    );
    Ok(samples)
}

/// Every directory and flat FASTQ file contributes its reads to the barcode
/// it is named after, so `barcode01/`, `barcode01.fastq` and
/// `barcode01.fq.gz` all end up in one sample.
fn discover_ont(dir: &Path, names: &FileNames) -> Result<Vec<SampleSource>> {
    let mut samples: BTreeMap<String, Vec<ReadFile>> = BTreeMap::new();
    for path in sorted_entries(dir)? {
        if path.is_dir() {
            let Some(key) = file_name(&path).map(str::to_string) else { continue };
            let files: Vec<ReadFile> = sorted_entries(&path)?
                .into_iter()
                .filter(|p| p.is_file() && names.fastq_key(p).is_some())
                .map(|path| ReadFile {
                    path,
                    mate_suffix: None,
                })
                .collect();
            if files.is_empty() {
                debug!("Skipping {:?}: no FASTQ files inside", path);
                continue;
            }
            samples.entry(key).or_default().extend(files);
        } else if let Some(key) = names.fastq_key(&path) {
            samples.entry(key).or_default().push(ReadFile {
                path,
                mate_suffix: None,
            });
        }
    }

    Ok(samples
        .into_iter()
        .map(|(key, mut files)| {
            files.sort_by(|a, b| a.path.cmp(&b.path));
            debug!("Sample {} has {} read file(s)", key, files.len());
            SampleSource { key, files }
        })
        .collect())
}

fn discover_illumina(dir: &Path, names: &FileNames) -> Result<Vec<SampleSource>> {
    let mut mates: BTreeMap<String, [Option<PathBuf>; 2]> = BTreeMap::new();
    for path in sorted_entries(dir)? {
        let Some(caps) = file_name(&path).and_then(|n| names.illumina.captures(n)) else {
            continue;
        };
        let slot = if &caps[2] == "1" { 0 } else { 1 };
        let entry = mates.entry(caps[1].to_string()).or_default();
        if let Some(previous) = entry[slot].replace(path.clone()) {
            return Err(PipelineError::InvalidConfig(format!(
                "sample {} has more than one R{} file: {:?} and {:?}",
                &caps[1],
                slot + 1,
                previous,
                path
            )));
        }
    }

    Ok(mates
        .into_iter()
        .map(|(key, [r1, r2])| {
            if r1.is_none() || r2.is_none() {
                warn!("Sample {} is missing one mate; using the reads that are present.", key);
            }
            let files = [(r1, "/1"), (r2, "/2")]
                .into_iter()
                .filter_map(|(path, suffix)| {
                    path.map(|path| ReadFile {
                        path,
                        mate_suffix: Some(suffix),
                    })
                })
                .collect();
            SampleSource { key, files }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_discover_ont_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("barcode02.fastq.gz"));
        touch(&dir.path().join("notes.txt"));
        std::fs::create_dir(dir.path().join("barcode01")).unwrap();
        touch(&dir.path().join("barcode01").join("chunk_0.fastq"));
        touch(&dir.path().join("barcode01").join("chunk_1.fq.gz"));
        std::fs::create_dir(dir.path().join("unclassified_empty")).unwrap();

        let samples = discover_samples(Platform::Ont, dir.path()).unwrap();
        let keys: Vec<&str> = samples.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["barcode01", "barcode02"]);
        assert_eq!(samples[0].files.len(), 2);
        assert!(samples[0].files.iter().all(|f| f.mate_suffix.is_none()));
    }

    #[test]
    fn test_discover_ont_merges_files_for_one_barcode() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("barcode01.fastq"));
        touch(&dir.path().join("barcode01.fq.gz"));
        std::fs::create_dir(dir.path().join("barcode01")).unwrap();
        touch(&dir.path().join("barcode01").join("chunk_0.fastq.gz"));
        touch(&dir.path().join("barcode02.fastq.gz"));

        let samples = discover_samples(Platform::Ont, dir.path()).unwrap();
        let keys: Vec<&str> = samples.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["barcode01", "barcode02"]);

        let files: Vec<&Path> = samples[0].files.iter().map(|f| f.path.as_path()).collect();
        assert_eq!(
            files,
            vec![
                dir.path().join("barcode01").join("chunk_0.fastq.gz"),
                dir.path().join("barcode01.fastq"),
                dir.path().join("barcode01.fq.gz"),
            ]
        );
    }

    #[test]
    fn test_read_file_patterns_compile() {
        let names = FileNames::new().unwrap();
        assert_eq!(
            names.fastq_key(Path::new("runs/barcode07.fq.gz")).as_deref(),
            Some("barcode07")
        );
        assert_eq!(names.fastq_key(Path::new("notes.txt")), None);
        assert!(names.illumina.is_match("patientA_S1_L001_R2_001.fastq.gz"));
    }

    #[test]
    fn test_discover_illumina_pairs() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("patientA_S1_L001_R1_001.fastq.gz"));
        touch(&dir.path().join("patientA_S1_L001_R2_001.fastq.gz"));
        touch(&dir.path().join("patientB_R1.fq.gz"));

        let samples = discover_samples(Platform::Illumina, dir.path()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].key, "patientA");
        assert_eq!(samples[0].files.len(), 2);
        assert_eq!(samples[0].files[0].mate_suffix, Some("/1"));
        assert_eq!(samples[0].files[1].mate_suffix, Some("/2"));
        assert_eq!(samples[1].key, "patientB");
        assert_eq!(samples[1].files.len(), 1);
    }

    #[test]
    fn test_missing_directory() {
        let err = discover_samples(Platform::Ont, Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
