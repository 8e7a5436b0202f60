// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Compression of unbranched kmer runs into path nodes.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use petgraph::stable_graph::NodeIndex;

use crate::assembly::graph::KmerGraph;
use crate::assembly::kmer::Kmer;

/// A maximal run of kmers with internal in- and out-degree one.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct PathNode {
    #[getset(get = "pub")]
    kmers: Vec<NodeIndex>,
    /// Kmers of merged sibling paths whose support was added to this one.
    #[getset(get = "pub")]
    absorbed: Vec<NodeIndex>,
    #[getset(get_copy = "pub")]
    weight: u64,
    #[getset(get_copy = "pub")]
    reference_count: usize,
    #[getset(get_copy = "pub")]
    first_kmer: Kmer,
    #[getset(get_copy = "pub")]
    last_kmer: Kmer,
    /// Smallest anchor position voted for on any kmer.
    #[getset(get_copy = "pub")]
    earliest_position: Option<i64>,
}

impl PathNode {
    /// Panics on an empty kmer run.
    pub fn new(kmers: Vec<NodeIndex>, graph: &KmerGraph) -> Self {
        assert!(!kmers.is_empty(), "bug: empty path node");
        let mut weight = 0;
        let mut reference_count = 0;
        let mut earliest_position: Option<i64> = None;
        for node in &kmers {
            let data = graph.node(*node);
            weight += u64::from(data.weight());
            if data.reference() {
                reference_count += 1;
            }
            if let Some(pos) = data.anchor_votes().keys().next() {
                earliest_position = Some(earliest_position.map_or(*pos, |p| p.min(*pos)));
            }
        }
        PathNode {
            first_kmer: graph.node(kmers[0]).kmer(),
            last_kmer: graph.node(kmers[kmers.len() - 1]).kmer(),
            kmers,
            absorbed: Vec::new(),
            weight,
            reference_count,
            earliest_position,
        }
    }

    pub fn len(&self) -> usize {
        self.kmers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kmers.is_empty()
    }

    pub fn contains_reference_kmer(&self) -> bool {
        self.reference_count > 0
    }

    pub fn contains_non_reference_kmer(&self) -> bool {
        self.reference_count < self.kmers.len()
    }

    /// Split into `[0, offset)` and `[offset, len)`. Each fragment is rescanned
    /// from its own kmers. Absorbed support stays with the first fragment.
    pub fn split_at(&self, offset: usize, graph: &KmerGraph) -> (PathNode, PathNode) {
        assert!(
            offset > 0 && offset < self.len(),
            "bug: splitting path node of length {} at {}",
            self.len(),
            offset
        );
        let mut head = PathNode::new(self.kmers[..offset].to_vec(), graph);
        let tail = PathNode::new(self.kmers[offset..].to_vec(), graph);
        head.absorb_kmers(&self.absorbed, graph);
        (head, tail)
    }

    pub fn sequence(&self, graph: &KmerGraph) -> Vec<u8> {
        graph.spell(&self.kmers)
    }

    /// Own and absorbed kmers.
    pub fn supporting_kmers(&self) -> impl Iterator<Item = &NodeIndex> {
        self.kmers.iter().chain(self.absorbed.iter())
    }

    fn absorb(&mut self, other: &PathNode, graph: &KmerGraph) {
        self.absorb_kmers(&other.kmers, graph);
        self.absorb_kmers(&other.absorbed, graph);
    }

    fn absorb_kmers(&mut self, kmers: &[NodeIndex], graph: &KmerGraph) {
        for node in kmers {
            self.weight += u64::from(graph.node(*node).weight());
            self.absorbed.push(*node);
        }
    }
}

/// The path nodes of a set of kmer nodes together with their adjacency.
#[derive(Debug)]
pub struct PathGraph<'a> {
    graph: &'a KmerGraph,
    paths: Vec<PathNode>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    live: Vec<bool>,
}

impl<'a> PathGraph<'a> {
    /// Compress the given nodes into path nodes. Edges to nodes outside the
    /// set are ignored.
    pub fn collapse(graph: &'a KmerGraph, nodes: &[NodeIndex]) -> Self {
        let members: HashSet<NodeIndex> = nodes.iter().copied().collect();
        let successors = |node: NodeIndex| -> Vec<NodeIndex> {
            graph
                .successors(node)
                .filter(|n| members.contains(n))
                .collect()
        };
        let predecessors = |node: NodeIndex| -> Vec<NodeIndex> {
            graph
                .predecessors(node)
                .filter(|n| members.contains(n))
                .collect()
        };

        let ordered: Vec<NodeIndex> = nodes
            .iter()
            .copied()
            .unique()
            .sorted_by_key(|node| graph.node(*node).kmer())
            .collect();

        let is_start = |node: NodeIndex| {
            let preds = predecessors(node);
            preds.len() != 1 || preds[0] == node || successors(preds[0]).len() != 1
        };

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut runs: Vec<Vec<NodeIndex>> = Vec::new();
        let mut walk = |start: NodeIndex, visited: &mut HashSet<NodeIndex>| {
            let mut run = vec![start];
            visited.insert(start);
            let mut current = start;
            loop {
                let succs = successors(current);
                if succs.len() != 1 {
                    break;
                }
                let next = succs[0];
                if visited.contains(&next) || predecessors(next).len() != 1 {
                    break;
                }
                visited.insert(next);
                run.push(next);
                current = next;
            }
            runs.push(run);
        };
        for node in ordered.iter().copied().filter(|node| is_start(*node)) {
            walk(node, &mut visited);
        }
        // whatever is left forms pure cycles
        for node in ordered.iter().copied() {
            if !visited.contains(&node) {
                walk(node, &mut visited);
            }
        }

        let paths: Vec<PathNode> = runs
            .into_iter()
            .map(|run| PathNode::new(run, graph))
            .collect();
        let first_of: HashMap<NodeIndex, usize> = paths
            .iter()
            .enumerate()
            .map(|(i, path)| (path.kmers[0], i))
            .collect();

        let mut path_successors = vec![Vec::new(); paths.len()];
        let mut path_predecessors = vec![Vec::new(); paths.len()];
        for (i, path) in paths.iter().enumerate() {
            let last = path.kmers[path.kmers.len() - 1];
            for succ in successors(last) {
                let j = *first_of.get(&succ).unwrap_or_else(|| {
                    panic!("bug: successor of a path end does not start a path")
                });
                path_successors[i].push(j);
                path_predecessors[j].push(i);
            }
        }
        for adjacency in path_successors
            .iter_mut()
            .chain(path_predecessors.iter_mut())
        {
            adjacency.sort_unstable();
            adjacency.dedup();
        }

        let live = vec![true; paths.len()];
        PathGraph {
            graph,
            paths,
            successors: path_successors,
            predecessors: path_predecessors,
            live,
        }
    }

    pub fn graph(&self) -> &'a KmerGraph {
        self.graph
    }

    /// Panics if `i` was never a path of this graph.
    pub fn path(&self, i: usize) -> &PathNode {
        &self.paths[i]
    }

    /// Path nodes that have not been merged into a sibling, with their index.
    pub fn paths(&self) -> impl Iterator<Item = (usize, &PathNode)> {
        self.paths
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.live[*i])
    }

    pub fn is_live(&self, i: usize) -> bool {
        self.live[i]
    }

    /// Upper bound of path indices, including merged ones.
    pub fn capacity(&self) -> usize {
        self.paths.len()
    }

    pub fn len(&self) -> usize {
        self.live.iter().filter(|live| **live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn successors(&self, i: usize) -> &[usize] {
        &self.successors[i]
    }

    pub fn predecessors(&self, i: usize) -> &[usize] {
        &self.predecessors[i]
    }

    /// Merge sibling paths (same predecessors and successors, same length, no
    /// reference kmers) whose sequences differ in at most `max_mismatch` bases.
    /// The better supported sibling absorbs the other. Returns the number of
    /// merged paths.
    pub fn collapse_similar(&mut self, max_mismatch: usize) -> usize {
        if max_mismatch == 0 {
            return 0;
        }
        let mut merged = 0;
        loop {
            let candidates: Vec<usize> = self
                .paths()
                .filter(|(_, path)| !path.contains_reference_kmer())
                .map(|(i, _)| i)
                .collect();
            let pair = candidates
                .iter()
                .tuple_combinations()
                .map(|(a, b)| (*a, *b))
                .find(|(a, b)| self.are_similar_siblings(*a, *b, max_mismatch));
            let (a, b) = match pair {
                Some(pair) => pair,
                None => break,
            };
            let (keep, gone) = if self.support_key(a) >= self.support_key(b) {
                (a, b)
            } else {
                (b, a)
            };
            debug!(
                "Merging path node of {} kmers into similar sibling.",
                self.paths[gone].len()
            );
            let absorbed = self.paths[gone].clone();
            self.paths[keep].absorb(&absorbed, self.graph);
            self.live[gone] = false;
            for adjacency in self
                .successors
                .iter_mut()
                .chain(self.predecessors.iter_mut())
            {
                adjacency.retain(|i| *i != gone);
            }
            self.successors[gone].clear();
            self.predecessors[gone].clear();
            merged += 1;
        }
        merged
    }

    fn support_key(&self, i: usize) -> (u64, std::cmp::Reverse<Kmer>) {
        (self.paths[i].weight, std::cmp::Reverse(self.paths[i].first_kmer))
    }

    fn are_similar_siblings(&self, a: usize, b: usize, max_mismatch: usize) -> bool {
        let (path_a, path_b) = (&self.paths[a], &self.paths[b]);
        if path_a.len() != path_b.len()
            || self.predecessors[a] != self.predecessors[b]
            || self.successors[a] != self.successors[b]
            || (self.predecessors[a].is_empty() && self.successors[a].is_empty())
        {
            return false;
        }
        let seq_a = path_a.sequence(self.graph);
        let seq_b = path_b.sequence(self.graph);
        seq_a.iter().zip(seq_b.iter()).filter(|(x, y)| x != y).count() <= max_mismatch
    }

    /// Bases spelled by the given consecutive paths.
    pub fn sequence(&self, paths: &[usize]) -> Vec<u8> {
        let kmers: Vec<NodeIndex> = paths
            .iter()
            .flat_map(|i| self.paths[*i].kmers.iter().copied())
            .collect();
        self.graph.spell(&kmers)
    }
}
