// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Greedy selection of contigs from a compressed graph.
//!
//! Contigs are grown from the best supported path node containing non
//! reference sequence, extended in both directions and anchored on the
//! reference run at one of their ends.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet, VecDeque};

use petgraph::stable_graph::NodeIndex;

use crate::assembly::graph::KmerGraph;
use crate::assembly::path::{PathGraph, PathNode};
use crate::variants::breakends::BreakendDirection;

/// Decides which path node to start a contig from and how to continue at
/// branches. Both orderings put the preferred path node first.
pub trait SelectionPolicy {
    fn seed_order(&self, paths: &PathGraph<'_>, a: usize, b: usize) -> Ordering;

    fn extension_order(&self, paths: &PathGraph<'_>, a: usize, b: usize) -> Ordering;
}

/// Always follow the path node with the highest kmer support.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyMaxKmer;

fn earliest_first(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl SelectionPolicy for GreedyMaxKmer {
    fn seed_order(&self, paths: &PathGraph<'_>, a: usize, b: usize) -> Ordering {
        let (a, b) = (paths.path(a), paths.path(b));
        b.weight()
            .cmp(&a.weight())
            .then(b.len().cmp(&a.len()))
            .then(earliest_first(a.earliest_position(), b.earliest_position()))
            .then(a.first_kmer().cmp(&b.first_kmer()))
    }

    fn extension_order(&self, paths: &PathGraph<'_>, a: usize, b: usize) -> Ordering {
        let (a, b) = (paths.path(a), paths.path(b));
        b.weight()
            .cmp(&a.weight())
            .then(b.reference_count().cmp(&a.reference_count()))
            .then(a.first_kmer().cmp(&b.first_kmer()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `kmers` reference kmers at the start (forward) or end (backward) of the
    /// contig. `breakend_position` is the last anchored base.
    Reference {
        direction: BreakendDirection,
        kmers: usize,
        breakend_position: i64,
    },
    Unanchored,
}

#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Contig {
    /// Indices of the path nodes the contig was built from.
    #[getset(get = "pub")]
    paths: Vec<usize>,
    /// The path nodes, the outermost ones possibly trimmed.
    #[getset(get = "pub")]
    fragments: Vec<PathNode>,
    #[getset(get_copy = "pub")]
    anchor: Anchor,
    #[getset(get_copy = "pub")]
    max_read_length: usize,
    /// Free of reference kmers and no longer than the longest supporting
    /// read.
    #[getset(get_copy = "pub")]
    too_short: bool,
}

impl Contig {
    pub fn kmers(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.fragments
            .iter()
            .flat_map(|fragment| fragment.kmers().iter().copied())
    }

    /// Own kmers plus those absorbed from merged siblings.
    pub fn supporting_kmers(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.fragments
            .iter()
            .flat_map(|fragment| fragment.supporting_kmers().copied())
    }

    pub fn kmer_count(&self) -> usize {
        self.fragments.iter().map(|fragment| fragment.len()).sum()
    }

    pub fn weight(&self) -> u64 {
        self.fragments.iter().map(|fragment| fragment.weight()).sum()
    }

    pub fn sequence(&self, graph: &KmerGraph) -> Vec<u8> {
        let kmers: Vec<NodeIndex> = self.kmers().collect();
        graph.spell(&kmers)
    }

    /// Quality of every contig base: the mean weight of the kmers covering
    /// it, saturating at 255.
    pub fn base_qualities(&self, graph: &KmerGraph) -> Vec<u8> {
        let k = graph.encoder().k();
        let weights: Vec<u64> = self
            .kmers()
            .map(|node| u64::from(graph.node(node).weight()))
            .collect();
        if weights.is_empty() {
            return Vec::new();
        }
        (0..weights.len() + k - 1)
            .map(|base| {
                let first = (base + 1).saturating_sub(k);
                let last = base.min(weights.len() - 1);
                let covering = &weights[first..=last];
                let mean = covering.iter().sum::<u64>() / covering.len() as u64;
                mean.min(u64::from(u8::MAX)) as u8
            })
            .collect()
    }

    pub fn is_anchored(&self) -> bool {
        self.anchor != Anchor::Unanchored
    }

    /// Number of anchored bases.
    pub fn anchor_length(&self, k: usize) -> usize {
        match self.anchor {
            Anchor::Reference { kmers, .. } => kmers + k - 1,
            Anchor::Unanchored => 0,
        }
    }
}

/// Extract contigs from the path graph until no path node with non reference
/// kmers is left. `direction` breaks ties between equally supported anchors.
pub fn extract_contigs<P>(
    paths: &PathGraph<'_>,
    policy: &P,
    direction: BreakendDirection,
) -> Vec<Contig>
where
    P: SelectionPolicy + ?Sized,
{
    let mut consumed = vec![false; paths.capacity()];
    let mut contigs = Vec::new();
    loop {
        let seed = paths
            .paths()
            .filter(|(i, path)| !consumed[*i] && path.contains_non_reference_kmer())
            .map(|(i, _)| i)
            .min_by(|a, b| policy.seed_order(paths, *a, *b));
        let seed = match seed {
            Some(seed) => seed,
            None => break,
        };

        let mut members = HashSet::new();
        members.insert(seed);
        let mut walk = VecDeque::new();
        walk.push_back(seed);
        let mut current = seed;
        while let Some(next) =
            best_candidate(paths, policy, paths.successors(current), &consumed, &members)
        {
            members.insert(next);
            walk.push_back(next);
            current = next;
        }
        current = seed;
        while let Some(prev) =
            best_candidate(paths, policy, paths.predecessors(current), &consumed, &members)
        {
            members.insert(prev);
            walk.push_front(prev);
            current = prev;
        }

        let contig = anchor_contig(paths, walk.into_iter().collect(), direction);
        consumed[seed] = true;
        for i in contig.paths() {
            consumed[*i] = true;
        }
        contigs.push(contig);
    }
    contigs
}

fn best_candidate<P>(
    paths: &PathGraph<'_>,
    policy: &P,
    candidates: &[usize],
    consumed: &[bool],
    members: &HashSet<usize>,
) -> Option<usize>
where
    P: SelectionPolicy + ?Sized,
{
    candidates
        .iter()
        .copied()
        .filter(|i| !consumed[*i] && !members.contains(i))
        .min_by(|a, b| policy.extension_order(paths, *a, *b))
}

fn anchor_contig(paths: &PathGraph<'_>, walk: Vec<usize>, direction: BreakendDirection) -> Contig {
    let graph = paths.graph();
    let k = graph.encoder().k();
    let mut fragments: Vec<(usize, PathNode)> = walk
        .into_iter()
        .map(|i| (i, paths.path(i).clone()))
        .collect();

    let kmers = |fragments: &[(usize, PathNode)]| -> Vec<NodeIndex> {
        fragments
            .iter()
            .flat_map(|(_, fragment)| fragment.kmers().iter().copied())
            .collect()
    };
    let run_weight = |nodes: &[NodeIndex]| -> u64 {
        nodes
            .iter()
            .map(|node| u64::from(graph.node(*node).weight()))
            .sum()
    };

    let all = kmers(&fragments);
    let leading = all
        .iter()
        .take_while(|node| graph.node(**node).reference())
        .count();
    let trailing = all
        .iter()
        .rev()
        .take_while(|node| graph.node(**node).reference())
        .count();
    assert!(
        leading < all.len(),
        "bug: contig without non reference kmers"
    );

    let side = match (leading > 0, trailing > 0) {
        (true, true) => Some(
            match run_weight(&all[..leading]).cmp(&run_weight(&all[all.len() - trailing..])) {
                Ordering::Greater => BreakendDirection::Forward,
                Ordering::Less => BreakendDirection::Backward,
                Ordering::Equal => direction,
            },
        ),
        (true, false) => Some(BreakendDirection::Forward),
        (false, true) => Some(BreakendDirection::Backward),
        (false, false) => None,
    };
    match side {
        Some(BreakendDirection::Forward) if trailing > 0 => {
            trim_back(&mut fragments, trailing, graph)
        }
        Some(BreakendDirection::Backward) if leading > 0 => {
            trim_front(&mut fragments, leading, graph)
        }
        _ => (),
    }

    let kept = kmers(&fragments);
    let anchor = match side {
        Some(BreakendDirection::Forward) => {
            // distance d from the innermost anchor kmer shifts a vote outwards
            let ballot = tally(graph, (0..leading).map(|d| (kept[leading - 1 - d], d as i64)));
            elect(&ballot).map(|pos| Anchor::Reference {
                direction: BreakendDirection::Forward,
                kmers: leading,
                breakend_position: pos + k as i64 - 1,
            })
        }
        Some(BreakendDirection::Backward) => {
            let start = kept.len() - trailing;
            let ballot = tally(graph, (0..trailing).map(|d| (kept[start + d], -(d as i64))));
            elect(&ballot).map(|pos| Anchor::Reference {
                direction: BreakendDirection::Backward,
                kmers: trailing,
                breakend_position: pos,
            })
        }
        None => None,
    }
    .unwrap_or(Anchor::Unanchored);

    let (path_indices, fragments): (Vec<usize>, Vec<PathNode>) = fragments.into_iter().unzip();
    let max_read_length = fragments
        .iter()
        .flat_map(|fragment| fragment.supporting_kmers())
        .map(|node| graph.node(*node).max_read_length())
        .max()
        .unwrap_or(0);
    let reference_free = fragments.iter().all(|fragment| fragment.reference_count() == 0);
    let too_short = reference_free && kept.len() + k - 1 <= max_read_length;

    Contig {
        paths: path_indices,
        fragments,
        anchor,
        max_read_length,
        too_short,
    }
}

/// Sum the anchor votes of the given kmers, each shifted by its offset to the
/// innermost anchor kmer.
fn tally<I>(graph: &KmerGraph, kmers: I) -> BTreeMap<i64, u64>
where
    I: Iterator<Item = (NodeIndex, i64)>,
{
    let mut ballot = BTreeMap::new();
    for (node, offset) in kmers {
        for (pos, weight) in graph.node(node).anchor_votes() {
            *ballot.entry(pos + offset).or_insert(0) += u64::from(*weight);
        }
    }
    ballot
}

/// Position with the most votes, the smaller one on ties.
fn elect(ballot: &BTreeMap<i64, u64>) -> Option<i64> {
    ballot
        .iter()
        .max_by(|(pos_a, weight_a), (pos_b, weight_b)| {
            weight_a.cmp(weight_b).then(pos_b.cmp(pos_a))
        })
        .map(|(pos, _)| *pos)
}

fn trim_back(fragments: &mut Vec<(usize, PathNode)>, mut count: usize, graph: &KmerGraph) {
    while count > 0 {
        let (index, last) = match fragments.pop() {
            Some(fragment) => fragment,
            None => panic!("bug: trimming more kmers than the contig has"),
        };
        if last.len() <= count {
            count -= last.len();
        } else {
            let (head, _) = last.split_at(last.len() - count, graph);
            fragments.push((index, head));
            count = 0;
        }
    }
}

fn trim_front(fragments: &mut Vec<(usize, PathNode)>, mut count: usize, graph: &KmerGraph) {
    while count > 0 {
        assert!(
            !fragments.is_empty(),
            "bug: trimming more kmers than the contig has"
        );
        let (index, first) = fragments.remove(0);
        if first.len() <= count {
            count -= first.len();
        } else {
            let (_, tail) = first.split_at(count, graph);
            fragments.insert(0, (index, tail));
            count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::graph::GraphCapabilities;
    use crate::assembly::kmer::KmerEncoder;
    use crate::evidence::KmerSupport;

    /// Insert kmers of `seq`; kmer i is a reference kmer if `reference(i)`
    /// holds and the kmers listed in `votes` vote for position `pos + i`.
    fn add<F: Fn(usize) -> bool>(
        graph: &mut KmerGraph,
        seq: &[u8],
        pos: i64,
        evidence: usize,
        reference: F,
        votes: &[usize],
    ) {
        let kmers = graph.encoder().kmers(seq).unwrap();
        for (i, kmer) in kmers.into_iter().enumerate() {
            let vote = if votes.contains(&i) { Some(pos + i as i64) } else { None };
            graph.insert(&KmerSupport::new(kmer, 1, reference(i), vote), evidence, seq.len(), pos);
        }
    }

    fn graph(k: usize) -> KmerGraph {
        KmerGraph::new(KmerEncoder::new(k).unwrap(), GraphCapabilities::default())
    }

    fn contigs(graph: &KmerGraph, direction: BreakendDirection) -> Vec<(Vec<u8>, Anchor, bool)> {
        let nodes: Vec<_> = graph.node_indices().collect();
        let paths = PathGraph::collapse(graph, &nodes);
        extract_contigs(&paths, &GreedyMaxKmer, direction)
            .iter()
            .map(|contig| (contig.sequence(graph), contig.anchor(), contig.too_short()))
            .collect()
    }

    #[test]
    fn test_forward_anchor() {
        let mut graph = graph(3);
        add(&mut graph, b"TAAAGTC", 10, 0, |i| i + 3 <= 4, &[1]);
        add(&mut graph, b"AAAGTCT", 11, 1, |i| i + 3 <= 3, &[0]);
        assert_eq!(
            contigs(&graph, BreakendDirection::Forward),
            vec![(
                b"TAAAGTCT".to_vec(),
                Anchor::Reference {
                    direction: BreakendDirection::Forward,
                    kmers: 2,
                    breakend_position: 13
                },
                false
            )]
        );
    }

    #[test]
    fn test_backward_anchor() {
        let mut graph = graph(3);
        // 1S3M and 2S3M at 10
        add(&mut graph, b"TATG", 9, 0, |i| i >= 1, &[1]);
        add(&mut graph, b"TTATG", 8, 1, |i| i >= 2, &[2]);
        assert_eq!(
            contigs(&graph, BreakendDirection::Backward),
            vec![(
                b"TTATG".to_vec(),
                Anchor::Reference {
                    direction: BreakendDirection::Backward,
                    kmers: 1,
                    breakend_position: 10
                },
                false
            )]
        );
    }

    #[test]
    fn test_unanchored_too_short() {
        let mut graph = graph(3);
        add(&mut graph, b"GTCTAG", 1, 0, |_| false, &[]);
        let result = contigs(&graph, BreakendDirection::Forward);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1, Anchor::Unanchored);
        // contig is exactly as long as the read
        assert!(result[0].2);
    }

    #[test]
    fn test_both_runs_heavier_wins() {
        let mut graph = graph(4);
        // reference GACC at 1 and AGCA at 7 flank the novel CTTAG
        add(&mut graph, b"GACCTTAGCA", 1, 0, |i| i == 0 || i == 6, &[0, 6]);
        add(&mut graph, b"TAGCA", 6, 1, |i| i == 1, &[1]);
        assert_eq!(
            contigs(&graph, BreakendDirection::Forward),
            vec![(
                b"ACCTTAGCA".to_vec(),
                Anchor::Reference {
                    direction: BreakendDirection::Backward,
                    kmers: 1,
                    breakend_position: 7
                },
                false
            )]
        );
    }

    #[test]
    fn test_tie_uses_graph_direction() {
        let mut graph = graph(4);
        add(&mut graph, b"GACCTTAGCA", 1, 0, |i| i == 0 || i == 6, &[0, 6]);
        let forward = contigs(&graph, BreakendDirection::Forward);
        assert_eq!(forward[0].0, b"GACCTTAGC".to_vec());
        assert!(matches!(
            forward[0].1,
            Anchor::Reference {
                direction: BreakendDirection::Forward,
                breakend_position: 4,
                ..
            }
        ));
        let backward = contigs(&graph, BreakendDirection::Backward);
        assert_eq!(backward[0].0, b"ACCTTAGCA".to_vec());
    }

    #[test]
    fn test_branch_prefers_heavier_path() {
        let mut graph = graph(4);
        for evidence in 0..3 {
            add(&mut graph, b"ACGTTGCA", 1, evidence, |i| i < 2, &[1]);
        }
        add(&mut graph, b"ACGTTGGG", 1, 3, |i| i < 2, &[1]);
        let result = contigs(&graph, BreakendDirection::Forward);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, b"ACGTTGCA".to_vec());
        // the weaker branch is emitted on its own, unanchored
        assert_eq!(result[1].0, b"TTGGG".to_vec());
        assert_eq!(result[1].1, Anchor::Unanchored);
        assert!(result[1].2);
    }

    #[test]
    fn test_seed_order() {
        let mut graph = graph(3);
        add(&mut graph, b"GGGTT", 1, 0, |_| false, &[]);
        add(&mut graph, b"CCCAA", 1, 1, |_| false, &[]);
        let nodes: Vec<_> = graph.node_indices().collect();
        let paths = PathGraph::collapse(&graph, &nodes);
        let mut order: Vec<_> = paths.paths().map(|(i, _)| i).collect();
        order.sort_by(|a, b| GreedyMaxKmer.seed_order(&paths, *a, *b));
        // equal weight and length, CCA sorts before GGT
        assert_eq!(paths.path(order[0]).sequence(&graph), b"CCAA".to_vec());
    }

    #[test]
    fn test_votes_of_outer_anchor_kmers() {
        let mut graph = graph(3);
        // the first read aligns TAAAG, the others only TAAA
        add(&mut graph, b"TAAAGTC", 10, 0, |i| i < 3, &[2]);
        add(&mut graph, b"TAAAGTC", 10, 1, |i| i < 2, &[1]);
        add(&mut graph, b"TAAAGTC", 10, 2, |i| i < 2, &[1]);
        let result = contigs(&graph, BreakendDirection::Forward);
        assert_eq!(result.len(), 1);
        // AAA at 11 is one kmer away from the innermost anchor kmer AAG, so
        // its two votes count for 12 together with the vote of AAG
        assert_eq!(
            result[0].1,
            Anchor::Reference {
                direction: BreakendDirection::Forward,
                kmers: 3,
                breakend_position: 14
            }
        );
    }

    #[test]
    fn test_internal_reference_kmers_are_not_noise() {
        let mut graph = graph(3);
        // CGC matches the reference but lies inside the contig
        add(&mut graph, b"TTCGCAA", 1, 0, |i| i == 2, &[]);
        let result = contigs(&graph, BreakendDirection::Forward);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1, Anchor::Unanchored);
        assert!(!result[0].2);
    }

    #[test]
    fn test_base_qualities() {
        let mut graph = graph(3);
        add(&mut graph, b"TAAAGTC", 10, 0, |i| i < 2, &[1]);
        add(&mut graph, b"AAGTC", 11, 1, |_| false, &[]);
        let nodes: Vec<_> = graph.node_indices().collect();
        let paths = PathGraph::collapse(&graph, &nodes);
        let contigs = extract_contigs(&paths, &GreedyMaxKmer, BreakendDirection::Forward);
        assert_eq!(contigs.len(), 1);
        // kmer weights are 1 1 2 2 2 for TAA AAA AAG AGT GTC
        assert_eq!(contigs[0].base_qualities(&graph), vec![1, 1, 1, 1, 2, 2, 2]);
    }
}
