//! In-memory reference sequences, loaded once and shared read-only by every
//! worker.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{debug, info};
use noodles::fasta;

use crate::bed::PrimerRecord;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub sequence: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    contigs: Vec<Contig>,
    by_name: HashMap<String, usize>,
}

impl ReferenceIndex {
    /// Build an index from `(name, sequence)` pairs. Sequences are uppercased.
    pub fn from_contigs<I, N, S>(contigs: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: AsRef<[u8]>,
    {
        let mut index = ReferenceIndex::default();
        for (name, sequence) in contigs {
            index.push(Contig {
                name: name.into(),
                sequence: sequence.as_ref().to_ascii_uppercase(),
            });
        }
        index
    }

    fn push(&mut self, contig: Contig) {
        self.by_name.insert(contig.name.clone(), self.contigs.len());
        self.contigs.push(contig);
    }

    /// Load a (multi-)FASTA reference. A missing file is fatal.
    pub fn from_fasta(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::MissingReference(path.to_path_buf()));
        }

        let mut reader = File::open(path)
            .map(BufReader::new)
            .map(fasta::io::Reader::new)?;

        let mut index = ReferenceIndex::default();
        for result in reader.records() {
            let record = result.map_err(|e| PipelineError::read_input(path, e))?;
            let name = String::from_utf8_lossy(record.name()).into_owned();
            let sequence = record.sequence().as_ref().to_ascii_uppercase();
            debug!("Loaded reference contig {} ({} bp)", name, sequence.len());
            index.push(Contig { name, sequence });
        }

        if index.contigs.is_empty() {
            return Err(PipelineError::read_input(path, "no FASTA records"));
        }

        info!(
            "Loaded {} reference sequence(s), {} bp in total, from {:?}",
            index.contigs.len(),
            index.total_len(),
            path
        );
        Ok(index)
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.by_name
            .get(name)
            .map(|&i| self.contigs[i].sequence.as_slice())
    }

    pub fn total_len(&self) -> usize {
        self.contigs.iter().map(|c| c.sequence.len()).sum()
    }

    /// The reference bases under a primer's coordinates.
    pub fn primer_bases(&self, primer: &PrimerRecord) -> Result<&[u8]> {
        let sequence = self
            .get(&primer.reference)
            .ok_or_else(|| PipelineError::UnknownReference {
                primer: primer.name.clone(),
                reference: primer.reference.clone(),
            })?;

        if primer.end as usize > sequence.len() || primer.start >= primer.end {
            return Err(PipelineError::ReferenceCoordinateOutOfRange {
                primer: primer.name.clone(),
                reference: primer.reference.clone(),
                start: primer.start,
                end: primer.end,
                length: sequence.len(),
            });
        }

        Ok(&sequence[primer.start as usize..primer.end as usize])
    }
}
