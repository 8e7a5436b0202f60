// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Evidence fragments that support a breakend and their decomposition into
//! kmers.

use anyhow::Result;
use bio::alphabets::dna;
use bio_types::genome::{AbstractLocus, Locus};
use derive_builder::Builder;

use crate::assembly::graph::GraphCapabilities;
use crate::assembly::kmer::{Kmer, KmerEncoder};
use crate::errors::Error;
use crate::variants::breakends::BreakendDirection;

pub mod metrics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceKind {
    /// A read with a soft clip at the breakend side. `sequence` is the whole
    /// read, `aligned_length` the number of bases aligned to the reference.
    SoftClip { aligned_length: usize },
    /// A pair whose reads map too far apart or to different contigs.
    DiscordantPair {
        max_fragment_distance: i64,
        #[serde(default)]
        remote: Option<RemoteMate>,
    },
    /// A pair with only one read mapped.
    OneEndAnchored { max_fragment_distance: i64 },
}

impl EvidenceKind {
    pub fn is_soft_clip(&self) -> bool {
        matches!(self, EvidenceKind::SoftClip { .. })
    }

    pub fn is_discordant_pair(&self) -> bool {
        matches!(self, EvidenceKind::DiscordantPair { .. })
    }
}

/// Where the far read of a discordant pair is mapped. `locus` is the
/// breakend-side end of that read and `direction` the direction of the
/// breakend it implies on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMate {
    pub locus: Locus,
    pub direction: BreakendDirection,
}

/// Remote side of a breakpoint, named by contig since the assembler works
/// without a sequence dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct RemoteBreakend {
    #[getset(get = "pub")]
    contig: String,
    #[getset(get_copy = "pub")]
    direction: BreakendDirection,
    #[getset(get_copy = "pub")]
    interval: (i64, i64),
}

impl RemoteBreakend {
    pub fn new(contig: &str, direction: BreakendDirection, interval: (i64, i64)) -> Self {
        RemoteBreakend {
            contig: contig.to_owned(),
            direction,
            interval,
        }
    }

    /// Common remote breakend of both, `None` if they lie on different
    /// contigs, point into different directions or do not overlap.
    pub fn intersect(&self, other: &RemoteBreakend) -> Option<RemoteBreakend> {
        if self.contig != other.contig || self.direction != other.direction {
            return None;
        }
        let start = self.interval.0.max(other.interval.0);
        let end = self.interval.1.min(other.interval.1);
        if start <= end {
            Some(RemoteBreakend::new(&self.contig, self.direction, (start, end)))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Display, IntoStaticStr)]
pub enum SkipReason {
    #[strum(serialize = "evidence with mapping quality below threshold")]
    LowMappingQuality,
    #[strum(serialize = "evidence with average base quality below threshold")]
    LowBaseQuality,
    #[strum(serialize = "evidence shorter than the kmer size")]
    ShorterThanKmer,
    #[strum(serialize = "evidence belonging to another partition")]
    WrongPartition,
    #[strum(serialize = "malformed evidence")]
    Malformed,
}

/// One kmer occurrence of an evidence sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct KmerSupport {
    kmer: Kmer,
    weight: u32,
    reference: bool,
    /// Reference position of the first base. Only the reference kmer next to
    /// the breakend carries it, so that every evidence votes once.
    anchor_vote: Option<i64>,
}

impl KmerSupport {
    pub fn new(kmer: Kmer, weight: u32, reference: bool, anchor_vote: Option<i64>) -> Self {
        KmerSupport {
            kmer,
            weight,
            reference,
            anchor_vote,
        }
    }
}

/// A single evidence fragment. Positions are 1-based reference coordinates.
///
/// For soft clips `anchor_position` is the first aligned base. For read pairs
/// it is the breakend-side end of the anchored read and `sequence` holds the
/// mate in reference orientation.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Getters, CopyGetters)]
#[builder(pattern = "owned")]
pub struct Evidence {
    #[builder(setter(into))]
    #[getset(get = "pub")]
    id: String,
    #[getset(get = "pub")]
    kind: EvidenceKind,
    #[getset(get_copy = "pub")]
    reference_index: usize,
    #[getset(get_copy = "pub")]
    anchor_position: i64,
    #[getset(get_copy = "pub")]
    direction: BreakendDirection,
    #[builder(setter(into))]
    #[getset(get = "pub")]
    sequence: Vec<u8>,
    /// Phred scaled, empty if unknown.
    #[builder(default)]
    #[getset(get = "pub")]
    qualities: Vec<u8>,
    #[builder(default = "60")]
    #[getset(get_copy = "pub")]
    mapq: u8,
}

impl Evidence {
    pub fn soft_clip(
        id: &str,
        reference_index: usize,
        direction: BreakendDirection,
        anchor_position: i64,
        aligned_length: usize,
        sequence: &[u8],
    ) -> Self {
        Evidence {
            id: id.to_owned(),
            kind: EvidenceKind::SoftClip { aligned_length },
            reference_index,
            anchor_position,
            direction,
            sequence: sequence.to_owned(),
            qualities: Vec::new(),
            mapq: 60,
        }
    }

    pub fn one_end_anchored(
        id: &str,
        reference_index: usize,
        direction: BreakendDirection,
        anchor_position: i64,
        max_fragment_distance: i64,
        mate_sequence: &[u8],
    ) -> Self {
        Evidence {
            id: id.to_owned(),
            kind: EvidenceKind::OneEndAnchored {
                max_fragment_distance,
            },
            reference_index,
            anchor_position,
            direction,
            sequence: mate_sequence.to_owned(),
            qualities: Vec::new(),
            mapq: 60,
        }
    }

    pub fn discordant_pair(
        id: &str,
        reference_index: usize,
        direction: BreakendDirection,
        anchor_position: i64,
        max_fragment_distance: i64,
        mate_sequence: &[u8],
        remote: Option<RemoteMate>,
    ) -> Self {
        Evidence {
            id: id.to_owned(),
            kind: EvidenceKind::DiscordantPair {
                max_fragment_distance,
                remote,
            },
            reference_index,
            anchor_position,
            direction,
            sequence: mate_sequence.to_owned(),
            qualities: Vec::new(),
            mapq: 60,
        }
    }

    pub fn with_qualities(mut self, qualities: &[u8]) -> Self {
        self.qualities = qualities.to_owned();
        self
    }

    pub fn with_mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    /// Mate sequence as it reads on the reference strand.
    pub fn oriented_mate(sequence: &[u8], reverse_complement: bool) -> Vec<u8> {
        if reverse_complement {
            dna::revcomp(sequence)
        } else {
            sequence.to_owned()
        }
    }

    pub fn read_length(&self) -> usize {
        self.sequence.len()
    }

    pub fn soft_clip_length(&self) -> usize {
        match self.kind {
            EvidenceKind::SoftClip { aligned_length } => {
                self.sequence.len().saturating_sub(aligned_length)
            }
            _ => 0,
        }
    }

    /// Interval within which the breakend lies, as `(start, end)`.
    pub fn breakend_interval(&self) -> (i64, i64) {
        let a = self.anchor_position;
        match (&self.kind, self.direction) {
            (EvidenceKind::SoftClip { aligned_length }, BreakendDirection::Forward) => {
                let pos = a + *aligned_length as i64 - 1;
                (pos, pos)
            }
            (EvidenceKind::SoftClip { .. }, BreakendDirection::Backward) => (a, a),
            (EvidenceKind::DiscordantPair { max_fragment_distance, .. }, direction)
            | (EvidenceKind::OneEndAnchored { max_fragment_distance }, direction) => {
                match direction {
                    BreakendDirection::Forward => (a, a + max_fragment_distance),
                    BreakendDirection::Backward => (a - max_fragment_distance, a),
                }
            }
        }
    }

    /// Largest reference coordinate this evidence can refer to.
    pub fn max_anchor(&self) -> i64 {
        match self.kind {
            EvidenceKind::SoftClip { aligned_length } => {
                self.anchor_position + aligned_length as i64 - 1
            }
            _ => self.breakend_interval().1,
        }
    }

    /// Implied reference position of the first base of kmer `i`. Read pairs
    /// have none.
    pub fn kmer_position(&self, i: usize) -> Option<i64> {
        match self.kind {
            EvidenceKind::SoftClip { .. } => match self.direction {
                BreakendDirection::Forward => Some(self.anchor_position + i as i64),
                BreakendDirection::Backward => Some(
                    self.anchor_position - self.soft_clip_length() as i64 + i as i64,
                ),
            },
            _ => None,
        }
    }

    /// Index of the aligned kmer adjacent to the breakend: the last aligned
    /// kmer of a forward clip, the first one of a backward clip.
    pub fn breakend_kmer(&self, k: usize) -> Option<usize> {
        match self.kind {
            EvidenceKind::SoftClip { aligned_length } => match self.direction {
                BreakendDirection::Forward => aligned_length.checked_sub(k),
                BreakendDirection::Backward => {
                    let clip = self.soft_clip_length();
                    if clip + k <= self.sequence.len() {
                        Some(clip)
                    } else {
                        None
                    }
                }
            },
            _ => None,
        }
    }

    /// Remote breakend implied by the far read of a discordant pair.
    pub fn remote_breakend(&self) -> Option<RemoteBreakend> {
        match &self.kind {
            EvidenceKind::DiscordantPair {
                max_fragment_distance,
                remote: Some(remote),
            } => {
                let pos = remote.locus.pos() as i64;
                let interval = match remote.direction {
                    BreakendDirection::Forward => (pos, pos + max_fragment_distance),
                    BreakendDirection::Backward => (pos - max_fragment_distance, pos),
                };
                Some(RemoteBreakend::new(
                    remote.locus.contig(),
                    remote.direction,
                    interval,
                ))
            }
            _ => None,
        }
    }

    /// Whether kmer `i` lies completely within the aligned bases.
    pub fn is_aligned_kmer(&self, i: usize, k: usize) -> bool {
        match self.kind {
            EvidenceKind::SoftClip { aligned_length } => match self.direction {
                BreakendDirection::Forward => i + k <= aligned_length,
                BreakendDirection::Backward => i >= self.soft_clip_length(),
            },
            _ => false,
        }
    }

    pub fn mean_base_quality(&self) -> Option<f64> {
        if self.qualities.is_empty() {
            None
        } else {
            let sum: u64 = self.qualities.iter().map(|q| u64::from(*q)).sum();
            Some(sum as f64 / self.qualities.len() as f64)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let EvidenceKind::SoftClip { aligned_length } = self.kind {
            if aligned_length == 0 || aligned_length >= self.sequence.len() {
                return Err(Error::InvalidSoftClip {
                    id: self.id.clone(),
                    aligned: aligned_length,
                    len: self.sequence.len(),
                }
                .into());
            }
        }
        if !self.qualities.is_empty() && self.qualities.len() != self.sequence.len() {
            return Err(Error::QualityLengthMismatch {
                id: self.id.clone(),
                quals: self.qualities.len(),
                len: self.sequence.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Decompose into kmer occurrences, in sequence order. Fails on any base
    /// that cannot be encoded.
    pub fn kmer_support(
        &self,
        encoder: &KmerEncoder,
        capabilities: &GraphCapabilities,
    ) -> Result<Vec<KmerSupport>> {
        let k = encoder.k();
        let kmers = encoder.kmers(&self.sequence)?;
        let breakend_kmer = self.breakend_kmer(k);
        Ok(kmers
            .into_iter()
            .enumerate()
            .map(|(i, kmer)| {
                let qualities = if self.qualities.is_empty() {
                    &[][..]
                } else {
                    &self.qualities[i..i + k]
                };
                let position = self.kmer_position(i);
                let reference = match (capabilities.reference(), position) {
                    (Some(window), Some(pos)) => window.matches(pos, &self.sequence[i..i + k]),
                    _ => self.is_aligned_kmer(i, k),
                };
                let vote = if reference && breakend_kmer == Some(i) {
                    position
                } else {
                    None
                };
                KmerSupport::new(kmer, capabilities.kmer_weight(qualities), reference, vote)
            })
            .collect())
    }

    pub fn summary(&self) -> EvidenceSummary {
        EvidenceSummary {
            id: self.id.clone(),
            soft_clip: self.kind.is_soft_clip(),
            discordant_pair: self.kind.is_discordant_pair(),
            read_length: self.read_length(),
            soft_clip_length: self.soft_clip_length(),
            breakend_interval: self.breakend_interval(),
            remote_breakend: self.remote_breakend(),
        }
    }
}

/// What the assembler remembers of an evidence fragment once its kmers are in
/// the graph.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct EvidenceSummary {
    #[getset(get = "pub")]
    id: String,
    #[getset(get_copy = "pub")]
    soft_clip: bool,
    #[getset(get_copy = "pub")]
    discordant_pair: bool,
    #[getset(get_copy = "pub")]
    read_length: usize,
    #[getset(get_copy = "pub")]
    soft_clip_length: usize,
    #[getset(get_copy = "pub")]
    breakend_interval: (i64, i64),
    #[getset(get = "pub")]
    remote_breakend: Option<RemoteBreakend>,
}

/// Line oriented JSON representation of an evidence fragment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceRecord {
    id: String,
    kind: EvidenceKind,
    reference_index: usize,
    anchor_position: i64,
    direction: BreakendDirection,
    sequence: String,
    #[serde(default)]
    qualities: Vec<u8>,
    #[serde(default)]
    mapq: Option<u8>,
    /// Sequence is given on the opposite strand of the reference.
    #[serde(default)]
    reverse_complement: bool,
}

impl EvidenceRecord {
    pub fn into_evidence(self) -> Result<Evidence> {
        let mut qualities = self.qualities;
        let sequence = if self.reverse_complement {
            qualities.reverse();
            Evidence::oriented_mate(self.sequence.as_bytes(), true)
        } else {
            self.sequence.into_bytes()
        };
        let mut builder = EvidenceBuilder::default()
            .id(self.id)
            .kind(self.kind)
            .reference_index(self.reference_index)
            .anchor_position(self.anchor_position)
            .direction(self.direction)
            .sequence(sequence)
            .qualities(qualities);
        if let Some(mapq) = self.mapq {
            builder = builder.mapq(mapq);
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Weighting;
    use crate::reference::ReferenceWindow;
    use std::sync::Arc;

    fn soft_clip(direction: BreakendDirection, anchor: i64, aligned: usize, seq: &[u8]) -> Evidence {
        Evidence::soft_clip("r1", 0, direction, anchor, aligned, seq)
    }

    #[test]
    fn test_forward_soft_clip() {
        let evidence = soft_clip(BreakendDirection::Forward, 10, 4, b"TAAAGTC");
        assert_eq!(evidence.soft_clip_length(), 3);
        assert_eq!(evidence.breakend_interval(), (13, 13));
        assert_eq!(evidence.max_anchor(), 13);

        let encoder = KmerEncoder::new(3).unwrap();
        let support = evidence
            .kmer_support(&encoder, &GraphCapabilities::default())
            .unwrap();
        let reference: Vec<_> = support.iter().map(|s| s.reference()).collect();
        assert_eq!(reference, vec![true, true, false, false, false]);
        let votes: Vec<_> = support.iter().map(|s| s.anchor_vote()).collect();
        assert_eq!(votes, vec![None, Some(11), None, None, None]);
        assert!(support.iter().all(|s| s.weight() == 1));
    }

    #[test]
    fn test_homopolymer_votes_once() {
        let evidence = soft_clip(BreakendDirection::Forward, 10, 4, b"AAAAGTCTT");
        let encoder = KmerEncoder::new(3).unwrap();
        let support = evidence
            .kmer_support(&encoder, &GraphCapabilities::default())
            .unwrap();
        // both AAA occurrences are reference kmers, only the inner one votes
        assert!(support[0].reference() && support[1].reference());
        assert_eq!(support[0].kmer(), support[1].kmer());
        let votes: Vec<_> = support.iter().filter_map(|s| s.anchor_vote()).collect();
        assert_eq!(votes, vec![11]);

        // no kmer fits into the aligned bases
        let short = soft_clip(BreakendDirection::Forward, 10, 2, b"AAGTC");
        assert_eq!(short.breakend_kmer(3), None);
        let short = soft_clip(BreakendDirection::Backward, 10, 2, b"GTCAA");
        assert_eq!(short.breakend_kmer(3), None);
    }

    #[test]
    fn test_backward_soft_clip() {
        let evidence = soft_clip(BreakendDirection::Backward, 10, 3, b"TTATG");
        assert_eq!(evidence.breakend_interval(), (10, 10));
        assert_eq!(evidence.max_anchor(), 12);
        assert_eq!(evidence.kmer_position(0), Some(8));

        let encoder = KmerEncoder::new(3).unwrap();
        let support = evidence
            .kmer_support(&encoder, &GraphCapabilities::default())
            .unwrap();
        let reference: Vec<_> = support.iter().map(|s| s.reference()).collect();
        assert_eq!(reference, vec![false, false, true]);
        let votes: Vec<_> = support.iter().map(|s| s.anchor_vote()).collect();
        assert_eq!(votes, vec![None, None, Some(10)]);
        assert_eq!(evidence.breakend_kmer(3), Some(2));
    }

    #[test]
    fn test_read_pair() {
        let evidence =
            Evidence::one_end_anchored("p1", 0, BreakendDirection::Forward, 13, 300, b"GTCTAG");
        assert_eq!(evidence.breakend_interval(), (13, 313));
        assert_eq!(evidence.max_anchor(), 313);
        assert_eq!(evidence.soft_clip_length(), 0);

        let backward =
            Evidence::one_end_anchored("p2", 0, BreakendDirection::Backward, 400, 300, b"GTCTAG");
        assert_eq!(backward.breakend_interval(), (100, 400));
        assert_eq!(backward.max_anchor(), 400);

        let encoder = KmerEncoder::new(3).unwrap();
        let support = evidence
            .kmer_support(&encoder, &GraphCapabilities::default())
            .unwrap();
        assert!(support.iter().all(|s| !s.reference() && s.anchor_vote().is_none()));
        assert!(evidence.remote_breakend().is_none());
    }

    #[test]
    fn test_oriented_mate() {
        assert_eq!(Evidence::oriented_mate(b"AACG", true), b"CGTT".to_vec());
        assert_eq!(Evidence::oriented_mate(b"AACG", false), b"AACG".to_vec());
    }

    #[test]
    fn test_base_quality_weighting() {
        let evidence = soft_clip(BreakendDirection::Forward, 1, 2, b"ACGT").with_qualities(&[30, 10, 20, 40]);
        let encoder = KmerEncoder::new(2).unwrap();
        let capabilities = GraphCapabilities::new(Weighting::BaseQuality, None);
        let weights: Vec<_> = evidence
            .kmer_support(&encoder, &capabilities)
            .unwrap()
            .iter()
            .map(|s| s.weight())
            .collect();
        assert_eq!(weights, vec![10, 10, 20]);
        assert_eq!(evidence.mean_base_quality(), Some(25.0));
    }

    #[test]
    fn test_reference_window_membership() {
        let window = Arc::new(ReferenceWindow::new(1, Arc::new(b"GGGGGGGGGTAAAGGGG".to_vec())));
        let capabilities = GraphCapabilities::new(Weighting::Count, Some(window));
        let evidence = soft_clip(BreakendDirection::Forward, 10, 4, b"TAAAGTC");
        let encoder = KmerEncoder::new(3).unwrap();
        let support = evidence.kmer_support(&encoder, &capabilities).unwrap();
        let reference: Vec<_> = support.iter().map(|s| s.reference()).collect();
        // AAG at 12 matches the reference although it overlaps the clip
        assert_eq!(reference, vec![true, true, true, false, false]);
        let votes: Vec<_> = support.iter().map(|s| s.anchor_vote()).collect();
        assert_eq!(votes, vec![None, Some(11), None, None, None]);
    }

    #[test]
    fn test_validate() {
        assert!(soft_clip(BreakendDirection::Forward, 1, 4, b"ACGT").validate().is_err());
        assert!(soft_clip(BreakendDirection::Forward, 1, 0, b"ACGT").validate().is_err());
        let err = soft_clip(BreakendDirection::Forward, 1, 2, b"ACGT")
            .with_qualities(&[1, 2])
            .validate()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::QualityLengthMismatch { .. })
        ));
        let encoder = KmerEncoder::new(3).unwrap();
        assert!(soft_clip(BreakendDirection::Forward, 1, 2, b"ACNT")
            .kmer_support(&encoder, &GraphCapabilities::default())
            .is_err());
    }

    #[test]
    fn test_record() {
        let record: EvidenceRecord = serde_json::from_str(
            r#"{"id": "m1", "kind": {"OneEndAnchored": {"max_fragment_distance": 300}},
                "reference_index": 0, "anchor_position": 13, "direction": "Forward",
                "sequence": "CTAGAC", "reverse_complement": true}"#,
        )
        .unwrap();
        let evidence = record.into_evidence().unwrap();
        assert_eq!(evidence.sequence(), b"GTCTAG");
        assert_eq!(evidence.mapq(), 60);
        assert_eq!(evidence.breakend_interval(), (13, 313));
    }

    #[test]
    fn test_remote_breakend() {
        let record: EvidenceRecord = serde_json::from_str(
            r#"{"id": "d1", "kind": {"DiscordantPair": {"max_fragment_distance": 300,
                "remote": {"locus": {"contig": "chr2", "pos": 500}, "direction": "Backward"}}},
                "reference_index": 0, "anchor_position": 13, "direction": "Forward",
                "sequence": "GTCTAG"}"#,
        )
        .unwrap();
        let evidence = record.into_evidence().unwrap();
        let remote = evidence.remote_breakend().unwrap();
        assert_eq!(remote.contig(), "chr2");
        assert_eq!(remote.direction(), BreakendDirection::Backward);
        assert_eq!(remote.interval(), (200, 500));
        assert!(evidence.summary().discordant_pair());
        assert_eq!(evidence.summary().remote_breakend(), &Some(remote.clone()));

        let other = RemoteBreakend::new("chr2", BreakendDirection::Backward, (450, 600));
        assert_eq!(
            remote.intersect(&other),
            Some(RemoteBreakend::new("chr2", BreakendDirection::Backward, (450, 500)))
        );
        let disjoint = RemoteBreakend::new("chr2", BreakendDirection::Backward, (501, 600));
        assert!(remote.intersect(&disjoint).is_none());
        let flipped = RemoteBreakend::new("chr2", BreakendDirection::Forward, (200, 500));
        assert!(remote.intersect(&flipped).is_none());
    }
}
