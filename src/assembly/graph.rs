// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::assembly::kmer::{Kmer, KmerEncoder};
use crate::evidence::KmerSupport;
use crate::params::Weighting;
use crate::reference::ReferenceWindow;

pub type EvidenceId = usize;

/// Pluggable behaviour of the graph: how kmer occurrences are weighted and
/// whether reference membership is decided by the alignment or by an actual
/// reference sequence.
#[derive(Debug, Clone, Default)]
pub struct GraphCapabilities {
    weighting: Weighting,
    reference: Option<Arc<ReferenceWindow>>,
}

impl GraphCapabilities {
    pub fn new(weighting: Weighting, reference: Option<Arc<ReferenceWindow>>) -> Self {
        GraphCapabilities {
            weighting,
            reference,
        }
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    pub fn reference(&self) -> Option<&ReferenceWindow> {
        self.reference.as_deref()
    }

    pub fn kmer_weight(&self, qualities: &[u8]) -> u32 {
        self.weighting.kmer_weight(qualities)
    }
}

#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct KmerNode {
    #[getset(get_copy = "pub")]
    kmer: Kmer,
    #[getset(get_copy = "pub")]
    weight: u32,
    /// Whether any occurrence of this kmer lies on the reference.
    #[getset(get_copy = "pub")]
    reference: bool,
    /// Anchor votes: weight per reference position of this kmer, cast by
    /// evidence whose breakend lies directly after (forward) or before
    /// (backward) it.
    #[getset(get = "pub")]
    anchor_votes: BTreeMap<i64, u32>,
    #[getset(get_copy = "pub")]
    max_read_length: usize,
    #[getset(get_copy = "pub")]
    max_anchor: i64,
    #[getset(get = "pub")]
    evidence: Vec<EvidenceId>,
}

impl KmerNode {
    fn new(kmer: Kmer, max_anchor: i64) -> Self {
        KmerNode {
            kmer,
            weight: 0,
            reference: false,
            anchor_votes: BTreeMap::new(),
            max_read_length: 0,
            max_anchor,
            evidence: Vec::new(),
        }
    }

    fn add_support(
        &mut self,
        support: &KmerSupport,
        evidence: EvidenceId,
        read_length: usize,
        max_anchor: i64,
    ) {
        self.weight += support.weight();
        if support.reference() {
            self.reference = true;
        }
        if let Some(pos) = support.anchor_vote() {
            *self.anchor_votes.entry(pos).or_insert(0) += support.weight();
        }
        self.max_read_length = self.max_read_length.max(read_length);
        self.max_anchor = self.max_anchor.max(max_anchor);
        if self.evidence.last() != Some(&evidence) {
            self.evidence.push(evidence);
        }
    }
}

/// Outcome of inserting a kmer occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub node: NodeIndex,
    pub created: bool,
    /// Adjacent nodes of a newly created node, excluding itself.
    pub neighbours: Vec<NodeIndex>,
}

/// De Bruijn graph over stranded kmers. Edges exist between every pair of
/// present kmers with a (k-1) base overlap.
#[derive(Debug, Clone)]
pub struct KmerGraph {
    encoder: KmerEncoder,
    capabilities: GraphCapabilities,
    graph: StableDiGraph<KmerNode, ()>,
    index: HashMap<Kmer, NodeIndex>,
}

impl KmerGraph {
    pub fn new(encoder: KmerEncoder, capabilities: GraphCapabilities) -> Self {
        KmerGraph {
            encoder,
            capabilities,
            graph: StableDiGraph::default(),
            index: HashMap::new(),
        }
    }

    pub fn encoder(&self) -> &KmerEncoder {
        &self.encoder
    }

    pub fn capabilities(&self) -> &GraphCapabilities {
        &self.capabilities
    }

    pub fn insert(
        &mut self,
        support: &KmerSupport,
        evidence: EvidenceId,
        read_length: usize,
        max_anchor: i64,
    ) -> Insertion {
        let kmer = support.kmer();
        if let Some(&node) = self.index.get(&kmer) {
            self.graph[node].add_support(support, evidence, read_length, max_anchor);
            return Insertion {
                node,
                created: false,
                neighbours: Vec::new(),
            };
        }

        let mut data = KmerNode::new(kmer, max_anchor);
        data.add_support(support, evidence, read_length, max_anchor);
        let node = self.graph.add_node(data);
        self.index.insert(kmer, node);

        let mut neighbours = Vec::new();
        for succ in self.encoder.successors(kmer).iter() {
            if let Some(&other) = self.index.get(succ) {
                self.graph.add_edge(node, other, ());
                if other != node {
                    neighbours.push(other);
                }
            }
        }
        for pred in self.encoder.predecessors(kmer).iter() {
            if *pred == kmer {
                // self loop already added above
                continue;
            }
            if let Some(&other) = self.index.get(pred) {
                self.graph.add_edge(other, node, ());
                if !neighbours.contains(&other) {
                    neighbours.push(other);
                }
            }
        }

        Insertion {
            node,
            created: true,
            neighbours,
        }
    }

    /// Remove a node together with its edges.
    pub fn remove(&mut self, node: NodeIndex) -> KmerNode {
        let data = self
            .graph
            .remove_node(node)
            .unwrap_or_else(|| panic!("bug: removing node {:?} that is not part of the graph", node));
        self.index.remove(&data.kmer);
        data
    }

    /// Remove all nodes whose evidence lies entirely before `before` and which
    /// are not retained.
    pub fn evict<F>(&mut self, before: i64, retained: F) -> Vec<KmerNode>
    where
        F: Fn(NodeIndex) -> bool,
    {
        let evictable: Vec<_> = self
            .graph
            .node_indices()
            .filter(|node| self.graph[*node].max_anchor < before && !retained(*node))
            .collect();
        evictable.into_iter().map(|node| self.remove(node)).collect()
    }

    pub fn get(&self, kmer: Kmer) -> Option<NodeIndex> {
        self.index.get(&kmer).copied()
    }

    pub fn is_reference(&self, kmer: Kmer) -> bool {
        self.index
            .get(&kmer)
            .map_or(false, |node| self.graph[*node].reference)
    }

    /// Panics if the node has been removed.
    pub fn node(&self, node: NodeIndex) -> &KmerNode {
        &self.graph[node]
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.graph.contains_node(node)
    }

    pub fn successors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    pub fn predecessors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Incoming)
    }

    pub fn out_degree(&self, node: NodeIndex) -> usize {
        self.successors(node).count()
    }

    pub fn in_degree(&self, node: NodeIndex) -> usize {
        self.predecessors(node).count()
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Sequence spelled by consecutive nodes.
    pub fn spell(&self, nodes: &[NodeIndex]) -> Vec<u8> {
        self.encoder
            .spell(nodes.iter().map(|node| self.graph[*node].kmer))
    }

    /// Panics on any structural inconsistency.
    pub fn check_invariants(&self) {
        assert_eq!(
            self.index.len(),
            self.graph.node_count(),
            "bug: kmer index out of sync with graph"
        );
        for node in self.graph.node_indices() {
            let data = &self.graph[node];
            assert!(data.weight >= 1, "bug: kmer node {} without support", data.kmer);
            assert_eq!(
                self.index.get(&data.kmer),
                Some(&node),
                "bug: kmer {} not indexed",
                data.kmer
            );
            assert!(
                data.anchor_votes.values().sum::<u32>() <= data.weight,
                "bug: anchor votes of kmer {} exceed its weight",
                data.kmer
            );
            assert!(
                data.reference || data.anchor_votes.is_empty(),
                "bug: anchor votes on non reference kmer {}",
                data.kmer
            );
        }
        for edge in self.graph.edge_indices() {
            let (source, target) = self
                .graph
                .edge_endpoints(edge)
                .unwrap_or_else(|| panic!("bug: dangling edge {:?}", edge));
            assert!(
                self.encoder
                    .is_successor(self.graph[source].kmer, self.graph[target].kmer),
                "bug: edge between kmers {} and {} without overlap",
                self.graph[source].kmer,
                self.graph[target].kmer
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(k: usize) -> KmerGraph {
        KmerGraph::new(KmerEncoder::new(k).unwrap(), GraphCapabilities::default())
    }

    fn add(graph: &mut KmerGraph, seq: &[u8], evidence: EvidenceId, anchor: i64) -> Vec<Insertion> {
        let kmers = graph.encoder().kmers(seq).unwrap();
        kmers
            .into_iter()
            .map(|kmer| graph.insert(&KmerSupport::new(kmer, 1, false, None), evidence, seq.len(), anchor))
            .collect()
    }

    #[test]
    fn test_insert_and_edges() {
        let mut graph = graph(3);
        let insertions = add(&mut graph, b"TAAAGTC", 0, 13);
        assert_eq!(graph.len(), 5);
        // includes the AAA self loop
        assert_eq!(graph.edge_count(), 5);
        assert!(insertions.iter().all(|i| i.created));
        assert_eq!(insertions[1].neighbours, vec![insertions[0].node]);

        let again = add(&mut graph, b"AAAGTCT", 1, 13);
        assert!(!again[0].created);
        assert!(again[4].created);
        assert_eq!(graph.len(), 6);

        let aaa = graph.get(graph.encoder().encode(b"AAA").unwrap()).unwrap();
        assert_eq!(graph.node(aaa).weight(), 2);
        assert_eq!(graph.node(aaa).evidence(), &vec![0, 1]);
        assert_eq!(graph.node(aaa).max_read_length(), 7);
        graph.check_invariants();
    }

    #[test]
    fn test_homopolymer_self_loop() {
        let mut graph = graph(3);
        add(&mut graph, b"AAAAA", 0, 1);
        assert_eq!(graph.len(), 1);
        let aaa = graph.get(graph.encoder().encode(b"AAA").unwrap()).unwrap();
        assert_eq!(graph.out_degree(aaa), 1);
        assert_eq!(graph.in_degree(aaa), 1);
        assert_eq!(graph.node(aaa).weight(), 3);
        graph.check_invariants();
    }

    #[test]
    fn test_implicit_edges() {
        let mut graph = graph(3);
        add(&mut graph, b"TAAC", 0, 1);
        // AAC-ACG is joined although never seen consecutively
        add(&mut graph, b"ACGG", 1, 1);
        let aac = graph.get(graph.encoder().encode(b"AAC").unwrap()).unwrap();
        assert_eq!(graph.out_degree(aac), 1);
        graph.check_invariants();
    }

    #[test]
    fn test_anchor_votes() {
        let mut graph = graph(3);
        let kmer = graph.encoder().encode(b"AAG").unwrap();
        graph.insert(&KmerSupport::new(kmer, 1, true, Some(12)), 0, 6, 12);
        graph.insert(&KmerSupport::new(kmer, 2, true, Some(11)), 1, 6, 12);
        // reference occurrence away from the breakend does not vote
        graph.insert(&KmerSupport::new(kmer, 1, true, None), 2, 6, 12);
        let node = graph.get(kmer).unwrap();
        assert!(graph.is_reference(kmer));
        let votes: Vec<_> = graph
            .node(node)
            .anchor_votes()
            .iter()
            .map(|(pos, weight)| (*pos, *weight))
            .collect();
        assert_eq!(votes, vec![(11, 2), (12, 1)]);
        graph.insert(&KmerSupport::new(kmer, 1, false, None), 3, 6, 12);
        assert_eq!(graph.node(node).weight(), 5);
        assert!(!graph.is_reference(graph.encoder().encode(b"AAT").unwrap()));
        graph.check_invariants();
    }

    #[test]
    fn test_remove_and_evict() {
        let mut graph = graph(3);
        add(&mut graph, b"TAAAG", 0, 5);
        add(&mut graph, b"CCGTT", 1, 50);
        assert_eq!(graph.len(), 6);

        let taa = graph.get(graph.encoder().encode(b"TAA").unwrap()).unwrap();
        let removed = graph.evict(10, |node| node == taa);
        assert_eq!(removed.len(), 2);
        assert_eq!(graph.len(), 4);
        assert!(graph.contains(taa));
        assert_eq!(graph.out_degree(taa), 0);

        let data = graph.remove(taa);
        assert_eq!(graph.encoder().decode(data.kmer()), b"TAA".to_vec());
        assert!(graph.get(data.kmer()).is_none());
        graph.check_invariants();
    }

    #[test]
    #[should_panic(expected = "bug")]
    fn test_remove_missing() {
        let mut graph = graph(3);
        let insertions = add(&mut graph, b"TAA", 0, 1);
        graph.remove(insertions[0].node);
        graph.remove(insertions[0].node);
    }
}
