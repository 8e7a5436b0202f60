// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Two bit encoding of fixed length base windows into 64 bit keys.

use std::fmt;

use anyhow::Result;

use crate::errors::Error;

pub const MAX_K: usize = 31;

const BASES: [u8; 4] = *b"ACGT";

/// A stranded kmer. Bases are packed with two bits each, first base in the most
/// significant position, hence integer order equals lexicographic order for
/// kmers of the same size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Kmer(u64);

impl Kmer {
    pub fn key(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Kmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Canonical representation of a kmer: the smaller of the kmer and its reverse
/// complement, together with the orientation it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct CanonicalKmer {
    kmer: Kmer,
    reverse: bool,
}

impl CanonicalKmer {
    /// Key with the orientation in the lowest bit.
    pub fn packed(&self) -> u64 {
        (self.kmer.0 << 1) | self.reverse as u64
    }
}

pub(crate) fn encode_base(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
pub struct KmerEncoder {
    #[getset(get_copy = "pub")]
    k: usize,
    mask: u64,
}

impl KmerEncoder {
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 || k > MAX_K {
            return Err(Error::InvalidKmerSize { k }.into());
        }
        Ok(KmerEncoder {
            k,
            mask: (1u64 << (2 * k)) - 1,
        })
    }

    /// Encode exactly `k` bases.
    pub fn encode(&self, bases: &[u8]) -> Result<Kmer> {
        if bases.len() != self.k {
            return Err(Error::KmerLengthMismatch {
                len: bases.len(),
                k: self.k,
            }
            .into());
        }
        let mut key = 0;
        for (pos, &base) in bases.iter().enumerate() {
            let bits = encode_base(base).ok_or(Error::InvalidBase { base, pos })?;
            key = (key << 2) | bits;
        }
        Ok(Kmer(key))
    }

    pub fn decode(&self, kmer: Kmer) -> Vec<u8> {
        (0..self.k)
            .rev()
            .map(|i| BASES[((kmer.0 >> (2 * i)) & 3) as usize])
            .collect()
    }

    /// All kmers of the given sequence, in sequence order. A sequence shorter
    /// than `k` yields no kmers. Any base other than ACGT is an error.
    pub fn kmers(&self, seq: &[u8]) -> Result<Vec<Kmer>> {
        let mut kmers = Vec::with_capacity(seq.len().saturating_sub(self.k - 1));
        let mut key = 0;
        for (pos, &base) in seq.iter().enumerate() {
            let bits = encode_base(base).ok_or(Error::InvalidBase { base, pos })?;
            key = ((key << 2) | bits) & self.mask;
            if pos + 1 >= self.k {
                kmers.push(Kmer(key));
            }
        }
        Ok(kmers)
    }

    pub fn reverse_complement(&self, kmer: Kmer) -> Kmer {
        let mut fwd = kmer.0;
        let mut rc = 0;
        for _ in 0..self.k {
            rc = (rc << 2) | (3 - (fwd & 3));
            fwd >>= 2;
        }
        Kmer(rc)
    }

    pub fn canonical(&self, kmer: Kmer) -> CanonicalKmer {
        let rc = self.reverse_complement(kmer);
        if rc < kmer {
            CanonicalKmer {
                kmer: rc,
                reverse: true,
            }
        } else {
            CanonicalKmer {
                kmer,
                reverse: false,
            }
        }
    }

    /// Kmers that follow the given one with a (k-1) base overlap.
    pub fn successors(&self, kmer: Kmer) -> [Kmer; 4] {
        let shifted = (kmer.0 << 2) & self.mask;
        [
            Kmer(shifted),
            Kmer(shifted | 1),
            Kmer(shifted | 2),
            Kmer(shifted | 3),
        ]
    }

    /// Kmers that precede the given one with a (k-1) base overlap.
    pub fn predecessors(&self, kmer: Kmer) -> [Kmer; 4] {
        let shifted = kmer.0 >> 2;
        let top = 2 * (self.k - 1);
        [
            Kmer(shifted),
            Kmer(shifted | (1 << top)),
            Kmer(shifted | (2 << top)),
            Kmer(shifted | (3 << top)),
        ]
    }

    pub fn is_successor(&self, from: Kmer, to: Kmer) -> bool {
        (from.0 << 2) & self.mask == to.0 & !3
    }

    pub fn last_base(&self, kmer: Kmer) -> u8 {
        BASES[(kmer.0 & 3) as usize]
    }

    pub fn first_base(&self, kmer: Kmer) -> u8 {
        BASES[((kmer.0 >> (2 * (self.k - 1))) & 3) as usize]
    }

    /// Bases spelled by a walk through consecutive kmers: the first kmer in
    /// full, then the last base of every following kmer.
    pub fn spell<I: IntoIterator<Item = Kmer>>(&self, kmers: I) -> Vec<u8> {
        let mut seq = Vec::new();
        for kmer in kmers {
            if seq.is_empty() {
                seq.extend(self.decode(kmer));
            } else {
                seq.push(self.last_base(kmer));
            }
        }
        seq
    }
}
