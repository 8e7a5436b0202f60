// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::{Mutex, RwLock};

use anyhow::Result;
use bio::io::fasta;
use lru_time_cache::LruCache;

use crate::errors::Error;

/// Contig names in reference index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceDictionary {
    names: Vec<String>,
    indices: HashMap<String, usize>,
}

impl ReferenceDictionary {
    pub fn new(names: Vec<String>) -> Self {
        let indices = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        ReferenceDictionary { names, indices }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Reference bases of one contig, addressed with 1-based positions.
#[derive(Debug, Clone, new)]
pub struct ReferenceWindow {
    start: i64,
    bases: Arc<Vec<u8>>,
}

impl ReferenceWindow {
    /// Base at the given position, `None` outside of the window.
    pub fn base(&self, pos: i64) -> Option<u8> {
        if pos < self.start {
            return None;
        }
        self.bases
            .get((pos - self.start) as usize)
            .map(|b| b.to_ascii_uppercase())
    }

    /// Whether `bases` match the reference when placed at `pos`. Bases outside
    /// of the window never match.
    pub fn matches(&self, pos: i64, bases: &[u8]) -> bool {
        bases
            .iter()
            .enumerate()
            .all(|(i, b)| self.base(pos + i as i64) == Some(b.to_ascii_uppercase()))
    }

    /// Fraction of `bases` equal to the reference when placed at `pos`.
    pub fn identity(&self, pos: i64, bases: &[u8]) -> f64 {
        if bases.is_empty() {
            return 1.0;
        }
        let matching = bases
            .iter()
            .enumerate()
            .filter(|(i, b)| self.base(pos + *i as i64) == Some(b.to_ascii_uppercase()))
            .count();
        matching as f64 / bases.len() as f64
    }
}

/// A lazy buffer for reference sequences.
pub struct Buffer {
    reader: RwLock<fasta::IndexedReader<fs::File>>,
    sequences: Mutex<LruCache<String, Arc<Vec<u8>>>>,
    reference_path: PathBuf,
}

impl Buffer {
    pub fn from_path<P: AsRef<Path> + std::fmt::Debug>(path: P, capacity: usize) -> Result<Self> {
        let fasta: fasta::IndexedReader<fs::File> = fasta::IndexedReader::from_file(&path)?;
        Ok(Buffer {
            reader: RwLock::new(fasta),
            sequences: Mutex::new(LruCache::with_capacity(capacity)),
            reference_path: path.as_ref().to_path_buf(),
        })
    }

    pub fn reference_path(&self) -> &Path {
        &self.reference_path
    }

    /// Contig names in the order of the FASTA index.
    pub fn dictionary(&self) -> ReferenceDictionary {
        let sequences = self.reader.read().unwrap().index.sequences();
        ReferenceDictionary::new(sequences.into_iter().map(|seq| seq.name).collect())
    }

    /// Load given chromosome and return it as a slice. This is O(1) if chromosome was loaded before.
    pub fn seq(&self, chrom: &str) -> Result<Arc<Vec<u8>>> {
        let mut sequences = self.sequences.lock().unwrap();

        if !sequences.contains_key(chrom) {
            let mut sequence = Vec::new();
            {
                let mut reader = self.reader.write().unwrap();
                reader.fetch_all(chrom)?;
                reader.read(&mut sequence)?;
            }
            debug!("Loaded {} bases of reference contig {}.", sequence.len(), chrom);

            let sequence = Arc::new(sequence);
            sequences.insert(chrom.to_owned(), Arc::clone(&sequence));
            Ok(sequence)
        } else {
            Ok(Arc::clone(sequences.get(chrom).unwrap()))
        }
    }

    /// Whole-contig window for the given reference index.
    pub fn window(&self, dict: &ReferenceDictionary, reference_index: usize) -> Result<ReferenceWindow> {
        let name = dict
            .name(reference_index)
            .ok_or(Error::UnknownReferenceIndex {
                index: reference_index,
            })?;
        Ok(ReferenceWindow::new(1, self.seq(name)?))
    }
}
