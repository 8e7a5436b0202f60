// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Bookkeeping of weakly connected components of the kmer graph and of when
//! they are ready to be assembled.

use std::collections::HashMap;

use itertools::Itertools;
use petgraph::stable_graph::NodeIndex;

use crate::assembly::graph::Insertion;

pub type SubgraphId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SubgraphState {
    /// May still receive evidence.
    Open,
    /// Behind the watermark, assembled with the next `take_pending`.
    PendingFinalize,
    /// Handed out for assembly, no longer tracked.
    Finalized,
}

#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Subgraph {
    #[getset(get_copy = "pub")]
    id: SubgraphId,
    #[getset(get_copy = "pub")]
    state: SubgraphState,
    /// Smallest and largest anchor coordinate of the contributing evidence.
    #[getset(get_copy = "pub")]
    min_anchor: i64,
    #[getset(get_copy = "pub")]
    max_anchor: i64,
    #[getset(get = "pub")]
    nodes: Vec<NodeIndex>,
}

impl Subgraph {
    fn extend_anchor(&mut self, anchor: i64) {
        self.min_anchor = self.min_anchor.min(anchor);
        self.max_anchor = self.max_anchor.max(anchor);
    }
}

#[derive(Debug, Default)]
pub struct SubgraphTracker {
    next_id: SubgraphId,
    subgraphs: HashMap<SubgraphId, Subgraph>,
    membership: HashMap<NodeIndex, SubgraphId>,
    watermark: Option<i64>,
}

impl SubgraphTracker {
    pub fn new() -> Self {
        SubgraphTracker::default()
    }

    /// Register a kmer insertion made on behalf of evidence with the given
    /// anchor coordinate. Returns the subgraph the kmer belongs to afterwards.
    pub fn add(&mut self, insertion: &Insertion, anchor: i64) -> SubgraphId {
        let mut id = match self.membership.get(&insertion.node) {
            Some(&id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.subgraphs.insert(
                    id,
                    Subgraph {
                        id,
                        state: SubgraphState::Open,
                        min_anchor: anchor,
                        max_anchor: anchor,
                        nodes: vec![insertion.node],
                    },
                );
                self.membership.insert(insertion.node, id);
                id
            }
        };
        self.extend(id, anchor);

        for neighbour in &insertion.neighbours {
            if let Some(&other) = self.membership.get(neighbour) {
                if other != id {
                    id = self.merge(id, other);
                }
            }
        }
        id
    }

    fn extend(&mut self, id: SubgraphId, anchor: i64) {
        let watermark = self.watermark;
        let subgraph = self.subgraph_mut(id);
        subgraph.extend_anchor(anchor);
        if subgraph.state == SubgraphState::PendingFinalize
            && watermark.map_or(true, |watermark| subgraph.max_anchor >= watermark)
        {
            debug!("Reopening subgraph {} at anchor {}.", id, anchor);
            subgraph.state = SubgraphState::Open;
        }
    }

    /// Merge two subgraphs into the larger one, which is open afterwards.
    fn merge(&mut self, a: SubgraphId, b: SubgraphId) -> SubgraphId {
        let size = |id: SubgraphId| self.subgraphs[&id].nodes.len();
        let (keep, gone) = if (size(b), a) > (size(a), b) {
            (b, a)
        } else {
            (a, b)
        };
        let gone = self
            .subgraphs
            .remove(&gone)
            .unwrap_or_else(|| panic!("bug: merging unknown subgraph {}", gone));
        for node in &gone.nodes {
            self.membership.insert(*node, keep);
        }
        let subgraph = self.subgraph_mut(keep);
        assert!(
            subgraph.state != SubgraphState::Finalized && gone.state != SubgraphState::Finalized,
            "bug: merging finalized subgraph"
        );
        subgraph.nodes.extend(gone.nodes);
        subgraph.extend_anchor(gone.min_anchor);
        subgraph.extend_anchor(gone.max_anchor);
        subgraph.state = SubgraphState::Open;
        keep
    }

    fn subgraph_mut(&mut self, id: SubgraphId) -> &mut Subgraph {
        self.subgraphs
            .get_mut(&id)
            .unwrap_or_else(|| panic!("bug: unknown subgraph {}", id))
    }

    /// Mark all open subgraphs whose evidence lies entirely before the
    /// watermark as pending. Returns the number of newly pending subgraphs.
    pub fn advance(&mut self, watermark: i64) -> usize {
        let watermark = self.watermark.map_or(watermark, |w| w.max(watermark));
        self.watermark = Some(watermark);
        let mut count = 0;
        for subgraph in self.subgraphs.values_mut() {
            if subgraph.state == SubgraphState::Open && subgraph.max_anchor < watermark {
                subgraph.state = SubgraphState::PendingFinalize;
                count += 1;
            }
        }
        count
    }

    /// Hand out all pending subgraphs in position order. They are finalized
    /// and their nodes are no longer tracked.
    pub fn take_pending(&mut self) -> Vec<Subgraph> {
        let pending: Vec<_> = self
            .subgraphs
            .values()
            .filter(|subgraph| subgraph.state == SubgraphState::PendingFinalize)
            .map(|subgraph| subgraph.id)
            .collect();
        pending
            .into_iter()
            .map(|id| {
                let mut subgraph = self
                    .subgraphs
                    .remove(&id)
                    .unwrap_or_else(|| panic!("bug: unknown subgraph {}", id));
                for node in &subgraph.nodes {
                    self.membership.remove(node);
                }
                subgraph.state = SubgraphState::Finalized;
                subgraph
            })
            .sorted_by_key(|subgraph| (subgraph.min_anchor, subgraph.max_anchor, subgraph.id))
            .collect()
    }

    /// State of a tracked subgraph. Subgraphs that have been finalized or
    /// merged away are no longer tracked.
    pub fn state(&self, id: SubgraphId) -> Option<SubgraphState> {
        self.subgraphs.get(&id).map(|subgraph| subgraph.state)
    }

    pub fn subgraph_of(&self, node: NodeIndex) -> Option<SubgraphId> {
        self.membership.get(&node).copied()
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.membership.contains_key(&node)
    }

    pub fn watermark(&self) -> Option<i64> {
        self.watermark
    }

    pub fn len(&self) -> usize {
        self.subgraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subgraphs.is_empty()
    }
}
