// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Streaming assembly of one partition, i.e. one reference sequence and
//! breakend direction.
//!
//! Evidence is added roughly in position order. Whenever the caller moves the
//! watermark forward, all components of the graph that no later evidence can
//! touch are compressed, their contigs extracted and converted into
//! [`AssembledBreakend`]s, and their kmers evicted.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use itertools::Itertools;

use crate::assembly::contig::{extract_contigs, Anchor, Contig, SelectionPolicy};
use crate::assembly::graph::{EvidenceId, GraphCapabilities, KmerGraph};
use crate::assembly::path::PathGraph;
use crate::assembly::subgraph::{Subgraph, SubgraphTracker};
use crate::assembly::{AssembledBreakend, AssemblyFilter};
use crate::errors::Error;
use crate::evidence::metrics::{EvidenceMetric, EvidenceMetrics};
use crate::evidence::{Evidence, EvidenceSummary, RemoteBreakend, SkipReason};
use crate::params::AssemblyParameters;
use crate::reference::ReferenceWindow;
use crate::utils::SimpleCounter;
use crate::variants::breakends::{BreakendDirection, BreakendSummary};

/// Evidence that was not added to the graph.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct SkippedEvidence {
    pub id: String,
    pub reason: SkipReason,
    /// Error message for malformed evidence.
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub added: usize,
    pub skipped: Vec<SkippedEvidence>,
}

type Rejection = (SkipReason, Option<anyhow::Error>);

pub struct BreakendAssembler {
    reference_index: usize,
    direction: BreakendDirection,
    params: AssemblyParameters,
    policy: Box<dyn SelectionPolicy + Send + Sync>,
    graph: KmerGraph,
    tracker: SubgraphTracker,
    evidence: HashMap<EvidenceId, EvidenceSummary>,
    next_evidence: EvidenceId,
    skips: SimpleCounter<SkipReason>,
}

impl BreakendAssembler {
    /// Assembler using the selection policy configured in `params`. If a
    /// reference window is given, kmers are classified by comparison with it
    /// and anchors are checked for identity.
    pub fn new(
        reference_index: usize,
        direction: BreakendDirection,
        params: &AssemblyParameters,
        reference: Option<Arc<ReferenceWindow>>,
    ) -> Result<Self> {
        Self::with_policy(
            reference_index,
            direction,
            params,
            reference,
            params.assembly_order().policy(),
        )
    }

    pub fn with_policy(
        reference_index: usize,
        direction: BreakendDirection,
        params: &AssemblyParameters,
        reference: Option<Arc<ReferenceWindow>>,
        policy: Box<dyn SelectionPolicy + Send + Sync>,
    ) -> Result<Self> {
        params.validate()?;
        let capabilities = GraphCapabilities::new(params.weighting(), reference);
        Ok(BreakendAssembler {
            reference_index,
            direction,
            params: params.clone(),
            policy,
            graph: KmerGraph::new(params.encoder()?, capabilities),
            tracker: SubgraphTracker::new(),
            evidence: HashMap::new(),
            next_evidence: 0,
            skips: SimpleCounter::default(),
        })
    }

    pub fn reference_index(&self) -> usize {
        self.reference_index
    }

    pub fn direction(&self) -> BreakendDirection {
        self.direction
    }

    pub fn graph(&self) -> &KmerGraph {
        &self.graph
    }

    pub fn tracker(&self) -> &SubgraphTracker {
        &self.tracker
    }

    pub fn skips(&self) -> &SimpleCounter<SkipReason> {
        &self.skips
    }

    /// Add the kmers of the given evidence to the graph. Returns `false` if the
    /// evidence was skipped by one of the quality filters and an error if it
    /// is malformed or belongs to another partition.
    pub fn add_evidence(&mut self, evidence: &Evidence) -> Result<bool> {
        match self.try_add(evidence) {
            Ok(()) => Ok(true),
            Err((reason, error)) => {
                self.skips.incr(reason);
                match error {
                    Some(error) => Err(error),
                    None => Ok(false),
                }
            }
        }
    }

    /// Add all given evidence. Skipped and malformed items are logged and
    /// reported without affecting the rest of the batch.
    pub fn add_evidence_batch<'a, I>(&mut self, evidence: I) -> BatchReport
    where
        I: IntoIterator<Item = &'a Evidence>,
    {
        let mut report = BatchReport::default();
        for item in evidence {
            match self.try_add(item) {
                Ok(()) => report.added += 1,
                Err((reason, error)) => {
                    self.skips.incr(reason);
                    let message = error.map(|error| error.to_string());
                    match &message {
                        Some(message) => warn!("Skipping evidence {}: {}", item.id(), message),
                        None => warn!("Skipping evidence {}: {}.", item.id(), reason),
                    }
                    report
                        .skipped
                        .push(SkippedEvidence::new(item.id().clone(), reason, message));
                }
            }
        }
        report
    }

    fn try_add(&mut self, evidence: &Evidence) -> std::result::Result<(), Rejection> {
        if evidence.reference_index() != self.reference_index
            || evidence.direction() != self.direction
        {
            let error = Error::PartitionMismatch {
                id: evidence.id().clone(),
                evidence_reference: evidence.reference_index(),
                evidence_direction: evidence.direction().to_string(),
                reference: self.reference_index,
                direction: self.direction.to_string(),
            };
            return Err((SkipReason::WrongPartition, Some(error.into())));
        }
        evidence
            .validate()
            .map_err(|error| (SkipReason::Malformed, Some(error)))?;

        if evidence.mapq() < self.params.min_mapq() {
            return Err((SkipReason::LowMappingQuality, None));
        }
        if let Some(quality) = evidence.mean_base_quality() {
            if quality < self.params.min_average_base_quality() {
                return Err((SkipReason::LowBaseQuality, None));
            }
        }
        if evidence.read_length() < self.graph.encoder().k() {
            return Err((SkipReason::ShorterThanKmer, None));
        }
        let support = evidence
            .kmer_support(self.graph.encoder(), self.graph.capabilities())
            .map_err(|error| (SkipReason::Malformed, Some(error)))?;

        let max_anchor = evidence.max_anchor();
        if let Some(watermark) = self.tracker.watermark() {
            if max_anchor < watermark {
                debug!(
                    "Evidence {} ends at {}, behind the watermark {}.",
                    evidence.id(),
                    max_anchor,
                    watermark
                );
            }
        }

        let id = self.next_evidence;
        self.next_evidence += 1;
        let read_length = evidence.read_length();
        for kmer in &support {
            let insertion = self.graph.insert(kmer, id, read_length, max_anchor);
            self.tracker.add(&insertion, max_anchor);
        }
        self.evidence.insert(id, evidence.summary());
        Ok(())
    }

    /// Assemble all components whose evidence lies entirely before `position`
    /// and release their kmers. Breakends are returned in position order.
    pub fn assemble_contigs_before(&mut self, position: i64) -> Vec<AssembledBreakend> {
        self.tracker.advance(position);
        let pending = self.tracker.take_pending();
        if pending.is_empty() {
            return Vec::new();
        }

        let breakends: Vec<_> = pending
            .iter()
            .flat_map(|subgraph| self.assemble_subgraph(subgraph))
            .sorted_by(|a, b| {
                (a.summary().start(), a.summary().end(), a.contig())
                    .cmp(&(b.summary().start(), b.summary().end(), b.contig()))
            })
            .collect();

        let watermark = self.tracker.watermark().unwrap_or(position);
        let tracker = &self.tracker;
        let evicted = self.graph.evict(watermark, |node| tracker.contains(node));
        let live: HashSet<EvidenceId> = self
            .graph
            .node_indices()
            .flat_map(|node| self.graph.node(node).evidence().iter().copied())
            .collect();
        self.evidence.retain(|id, _| live.contains(id));
        if cfg!(debug_assertions) {
            self.graph.check_invariants();
        }

        info!(
            "Assembled {} breakends from {} subgraphs of partition {}/{} before {}, evicted {} kmers.",
            breakends.len(),
            pending.len(),
            self.reference_index,
            self.direction,
            watermark,
            evicted.len()
        );
        breakends
    }

    /// Assemble everything that is left.
    pub fn flush(&mut self) -> Vec<AssembledBreakend> {
        self.assemble_contigs_before(i64::MAX)
    }

    fn assemble_subgraph(&self, subgraph: &Subgraph) -> Vec<AssembledBreakend> {
        let mut paths = PathGraph::collapse(&self.graph, subgraph.nodes());
        let max_mismatch = self.params.max_base_mismatch_for_collapse();
        let merged = if max_mismatch > 0 {
            paths.collapse_similar(max_mismatch)
        } else {
            0
        };
        let contigs = extract_contigs(&paths, self.policy.as_ref(), self.direction);
        debug!(
            "Subgraph {} ({}..={}) with {} kmers in {} path nodes ({} merged) yielded {} contigs.",
            subgraph.id(),
            subgraph.min_anchor(),
            subgraph.max_anchor(),
            subgraph.nodes().len(),
            paths.len(),
            merged,
            contigs.len()
        );

        contigs
            .iter()
            .map(|contig| self.to_breakend(contig))
            .collect()
    }

    fn to_breakend(&self, contig: &Contig) -> AssembledBreakend {
        let k = self.graph.encoder().k();
        let sequence = contig.sequence(&self.graph);
        let evidence: Vec<&EvidenceSummary> = contig
            .supporting_kmers()
            .flat_map(|node| self.graph.node(node).evidence().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|id| {
                self.evidence
                    .get(&id)
                    .unwrap_or_else(|| panic!("bug: evidence {} of a live kmer is unknown", id))
            })
            .collect();

        let (direction, start, end) = match contig.anchor() {
            Anchor::Reference {
                direction,
                breakend_position,
                ..
            } => (direction, breakend_position, breakend_position),
            Anchor::Unanchored => {
                let (start, end) = evidence_window(&evidence);
                (self.direction, start, end)
            }
        };

        let anchor_length = contig.anchor_length(k);
        let qualities = contig.base_qualities(&self.graph);
        let (anchor, breakpoint, breakpoint_quality) = match direction {
            BreakendDirection::Forward => {
                let (anchor, breakpoint) = sequence.split_at(anchor_length);
                (anchor, breakpoint, &qualities[anchor_length..])
            }
            BreakendDirection::Backward => {
                let split = sequence.len() - anchor_length;
                let (breakpoint, anchor) = sequence.split_at(split);
                (anchor, breakpoint, &qualities[..split])
            }
        };

        let mut metrics = EvidenceMetrics::default();
        metrics.set(EvidenceMetric::AssemblyLength, sequence.len() as i64);
        metrics.set(EvidenceMetric::AssemblyReads, evidence.len() as i64);
        metrics.set(EvidenceMetric::AssemblyBases, 0);
        metrics.set(EvidenceMetric::AssemblySoftClipReads, 0);
        metrics.set(EvidenceMetric::AssemblyReadPairs, 0);
        metrics.set(EvidenceMetric::AssemblyMaxSoftClip, 0);
        metrics.set(EvidenceMetric::AssemblyLongestRead, 0);
        for item in &evidence {
            metrics.add(EvidenceMetric::AssemblyBases, item.read_length() as i64);
            if item.soft_clip() {
                metrics.add(EvidenceMetric::AssemblySoftClipReads, 1);
            } else {
                metrics.add(EvidenceMetric::AssemblyReadPairs, 1);
            }
            metrics.max(
                EvidenceMetric::AssemblyMaxSoftClip,
                item.soft_clip_length() as i64,
            );
            metrics.max(EvidenceMetric::AssemblyLongestRead, item.read_length() as i64);
        }
        metrics.set(EvidenceMetric::AssemblyKmerWeight, contig.weight() as i64);

        let mut filters = Vec::new();
        if contig.too_short() {
            filters.push(AssemblyFilter::TooShort);
        }
        if sequence.len() < self.params.min_contig_length() {
            filters.push(AssemblyFilter::BelowMinLength);
        }
        if let (Some(window), false) = (self.graph.capabilities().reference(), anchor.is_empty()) {
            let first = match direction {
                BreakendDirection::Forward => start - anchor.len() as i64 + 1,
                BreakendDirection::Backward => start,
            };
            if window.identity(first, anchor) < self.params.min_anchor_identity() {
                filters.push(AssemblyFilter::LowAnchorIdentity);
            }
        }

        let summary = BreakendSummary::new(self.reference_index, direction, start, end, metrics);
        let evidence_ids = evidence.iter().map(|item| item.id().clone()).collect();
        AssembledBreakend::new(sequence.clone(), summary, anchor, breakpoint, filters, evidence_ids)
            .with_breakpoint_quality(breakpoint_quality.to_vec())
            .with_remote(remote_consensus(&evidence))
    }
}

/// Remote breakend shared by all supporting discordant pairs. `None` if there
/// are none, one of them lacks a mapped mate or they disagree.
fn remote_consensus(evidence: &[&EvidenceSummary]) -> Option<RemoteBreakend> {
    let mut pairs = evidence.iter().filter(|item| item.discordant_pair());
    let first = pairs.next()?.remote_breakend().clone()?;
    pairs.try_fold(first, |agreed, item| {
        item.remote_breakend()
            .as_ref()
            .and_then(|remote| agreed.intersect(remote))
    })
}

/// Interval consistent with all evidence windows, or spanning all of them if
/// they do not overlap.
fn evidence_window(evidence: &[&EvidenceSummary]) -> (i64, i64) {
    let windows = evidence.iter().map(|item| item.breakend_interval());
    let (start, end) = windows
        .clone()
        .fold((i64::MIN, i64::MAX), |(start, end), (s, e)| {
            (start.max(s), end.min(e))
        });
    if start <= end {
        (start, end)
    } else {
        windows.fold((i64::MAX, i64::MIN), |(start, end), (s, e)| {
            (start.min(s), end.max(e))
        })
    }
}
