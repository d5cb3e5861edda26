//! Read records, FASTQ loading and FASTQ output.

use std::io::Write;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex};

use flate2::{write::GzEncoder, Compression};
use log::debug;
use paraseq::{fastq, prelude::*, ProcessError};

use crate::error::{PipelineError, Result};
use crate::sequence::reverse_complement;

/// A single sequencing read. Sequence bases are uppercased on load.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReadRecord {
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

impl ReadRecord {
    pub fn new(id: impl Into<String>, seq: &[u8], qual: &[u8]) -> Self {
        ReadRecord {
            id: id.into(),
            seq: seq.to_ascii_uppercase(),
            qual: qual.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Mean Phred quality, assuming Sanger (+33) encoding.
    pub fn mean_quality(&self) -> f64 {
        if self.qual.is_empty() {
            return 0.0;
        }
        let total: u64 = self
            .qual
            .iter()
            .map(|&q| u64::from(q.saturating_sub(33)))
            .sum();
        total as f64 / self.qual.len() as f64
    }

    /// The same read on the opposite strand, qualities reversed to match.
    pub fn reverse_complement(&self) -> Self {
        ReadRecord {
            id: self.id.clone(),
            seq: reverse_complement(&self.seq),
            qual: self.qual.iter().rev().copied().collect(),
        }
    }

    /// Keep only `range` of the read, sequence and qualities alike.
    pub fn sliced(&self, range: Range<usize>) -> Option<Self> {
        if range.end > self.seq.len() || range.end > self.qual.len() || range.start > range.end {
            return None;
        }
        Some(ReadRecord {
            id: self.id.clone(),
            seq: self.seq[range.clone()].to_vec(),
            qual: self.qual[range].to_vec(),
        })
    }
}

/// A sample and its current read set. Each stage replaces the reads; the key
/// stays fixed for the lifetime of the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleUnit {
    key: String,
    pub reads: Vec<ReadRecord>,
}

impl SampleUnit {
    pub fn new(key: impl Into<String>, reads: Vec<ReadRecord>) -> Self {
        SampleUnit {
            key: key.into(),
            reads,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn with_reads(self, reads: Vec<ReadRecord>) -> Self {
        SampleUnit { key: self.key, reads }
    }
}

/// Collects records from paraseq's worker threads.
#[derive(Clone)]
struct ReadCollector {
    reads: Arc<Mutex<Vec<ReadRecord>>>,
    mate_suffix: Option<&'static str>,
}

impl<Rf: Record> ParallelProcessor<Rf> for ReadCollector {
    fn process_record(&mut self, record: Rf) -> Result<(), ProcessError> {
        let qual = record.qual().ok_or_else(|| {
            ProcessError::Process(Box::new(std::io::Error::other(
                "FASTQ input requires quality scores",
            )))
        })?;
        // keep only the first token of the header
        let id = record.id_str().split_whitespace().next().unwrap_or_default();
        let id = match self.mate_suffix {
            Some(suffix) => format!("{id}{suffix}"),
            None => id.to_string(),
        };
        let read = ReadRecord::new(id, &record.seq(), qual);

        let mut reads = self.reads.lock().unwrap();
        reads.push(read);
        Ok(())
    }
}

/// Load every read of a (possibly gzipped) FASTQ file. Reads come back sorted
/// by id so that later stages do not depend on thread scheduling.
pub fn load_fastq(path: &Path, mate_suffix: Option<&'static str>, threads: usize) -> Result<Vec<ReadRecord>> {
    let reader = fastq::Reader::from_path(path).map_err(|e| PipelineError::read_input(path, e))?;
    let mut collector = ReadCollector {
        reads: Arc::new(Mutex::new(Vec::new())),
        mate_suffix,
    };

    reader
        .process_parallel(&mut collector, threads.max(1))
        .map_err(|e| PipelineError::read_input(path, e))?;

    let mut reads = std::mem::take(&mut *collector.reads.lock().unwrap());
    reads.sort_unstable();
    debug!("Loaded {} reads from {:?}", reads.len(), path);
    Ok(reads)
}

/// Open an output file, gzip-compressed when the name ends in `.gz`.
pub fn create_writer(path: &Path) -> Result<Box<dyn Write + Send>> {
    let file = std::fs::File::create(path)?;
    let writer: Box<dyn Write + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzEncoder::new(file, Compression::default()))
    } else {
        Box::new(std::io::BufWriter::new(file))
    };
    Ok(writer)
}

pub fn write_fastq_record<W: Write + ?Sized>(writer: &mut W, read: &ReadRecord) -> std::io::Result<()> {
    writeln!(writer, "@{}", read.id)?;
    writer.write_all(&read.seq)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(&read.qual)?;
    writer.write_all(b"\n")
}

/// Write reads to `path`, going through a `.partial` file so an interrupted
/// run never leaves a truncated output under the final name. The `.partial`
/// file is removed again if anything fails.
pub fn write_fastq(path: &Path, reads: &[ReadRecord]) -> Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = std::path::PathBuf::from(partial);

    // the compression choice follows the final name, not the .partial one
    let compressed = path.extension().is_some_and(|ext| ext == "gz");
    let written = write_partial(&partial, compressed, reads).and_then(|()| std::fs::rename(&partial, path));
    if let Err(e) = written {
        if let Err(cleanup) = std::fs::remove_file(&partial) {
            debug!("Could not remove {:?}: {}", partial, cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

fn write_partial(partial: &Path, compressed: bool, reads: &[ReadRecord]) -> std::io::Result<()> {
    let file = std::fs::File::create(partial)?;
    if compressed {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write_records(&mut encoder, reads)?;
        encoder.finish()?;
    } else {
        let mut writer = std::io::BufWriter::new(file);
        write_records(&mut writer, reads)?;
        writer.flush()?;
    }
    Ok(())
}

fn write_records<W: Write>(writer: &mut W, reads: &[ReadRecord]) -> std::io::Result<()> {
    for read in reads {
        write_fastq_record(writer, read)?;
    }
    Ok(())
}
