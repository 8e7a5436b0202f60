// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid base '{}' at position {pos} of sequence, only A, C, G and T can be encoded", char::from(*.base))]
    InvalidBase { base: u8, pos: usize },
    #[error("sequence of length {len} cannot be encoded as a kmer of size {k}")]
    KmerLengthMismatch { len: usize, k: usize },
    #[error("invalid kmer size {k}, must be between 1 and 31 in order to fit into a 64 bit key")]
    InvalidKmerSize { k: usize },
    #[error("invalid BND record: ALT {spec} is not a valid breakend ({reason})")]
    InvalidBreakend { spec: String, reason: String },
    #[error("contig {name} is not contained in the reference dictionary")]
    UnknownContig { name: String },
    #[error("reference index {index} is not contained in the reference dictionary")]
    UnknownReferenceIndex { index: usize },
    #[error("soft clip evidence {id} declares {aligned} aligned bases but the read has {len} bases and needs at least one clipped base")]
    InvalidSoftClip { id: String, aligned: usize, len: usize },
    #[error("evidence {id} has {quals} base qualities for {len} bases")]
    QualityLengthMismatch { id: String, quals: usize, len: usize },
    #[error("evidence {id} belongs to partition {evidence_reference}/{evidence_direction} but was given to the assembler of {reference}/{direction}")]
    PartitionMismatch {
        id: String,
        evidence_reference: usize,
        evidence_direction: String,
        reference: usize,
        direction: String,
    },
    #[error("invalid assembly parameters: {msg}")]
    InvalidParameters { msg: String },
    #[error("invalid evidence record at line {line}: {msg}")]
    InvalidEvidenceRecord { line: usize, msg: String },
}

pub(crate) fn invalid_breakend(spec: &[u8], reason: &str) -> Error {
    Error::InvalidBreakend {
        spec: String::from_utf8_lossy(spec).into_owned(),
        reason: reason.to_owned(),
    }
}
