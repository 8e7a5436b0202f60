// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Partitioned assembly of an evidence stream.
//!
//! Evidence is split by reference sequence and breakend direction. Every
//! partition is assembled by its own [`BreakendAssembler`] on the rayon thread
//! pool, with the watermark trailing the stream position by the configured
//! out-of-order horizon.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use derive_builder::Builder;
use itertools::Itertools;
use rayon::prelude::*;

use crate::assembly::read_graph::{BreakendAssembler, SkippedEvidence};
use crate::assembly::AssembledBreakend;
use crate::evidence::{Evidence, SkipReason};
use crate::params::AssemblyParameters;
use crate::reference::ReferenceWindow;
use crate::utils::SimpleCounter;
use crate::variants::breakends::BreakendDirection;

pub type Partition = (usize, BreakendDirection);

#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Caller {
    params: AssemblyParameters,
    /// Reference windows by reference index. Partitions without a window
    /// classify kmers by their alignment.
    #[builder(default)]
    references: HashMap<usize, Arc<ReferenceWindow>>,
}

#[derive(Debug, Default)]
pub struct CallResult {
    /// All breakends, ordered by reference index, position and direction.
    pub breakends: Vec<AssembledBreakend>,
    pub skipped: Vec<SkippedEvidence>,
    pub skips: SimpleCounter<SkipReason>,
}

impl Caller {
    pub fn call<I>(&self, evidence: I) -> Result<CallResult>
    where
        I: IntoIterator<Item = Evidence>,
    {
        let mut partitions: BTreeMap<Partition, Vec<Evidence>> = BTreeMap::new();
        for item in evidence {
            partitions
                .entry((item.reference_index(), item.direction()))
                .or_insert_with(Vec::new)
                .push(item);
        }
        info!("Assembling {} partitions.", partitions.len());

        let results = partitions
            .into_par_iter()
            .map(|(partition, evidence)| self.call_partition(partition, &evidence))
            .collect::<Result<Vec<_>>>()?;

        let mut result = CallResult::default();
        for (breakends, skipped, skips) in results {
            result.breakends.extend(breakends);
            result.skipped.extend(skipped);
            result.skips.merge(skips);
        }
        result.breakends = result
            .breakends
            .into_iter()
            .sorted_by_key(|breakend| {
                let summary = breakend.summary();
                (
                    summary.reference_index(),
                    summary.start(),
                    summary.end(),
                    summary.direction(),
                )
            })
            .collect();
        result.skips.log_counts();
        Ok(result)
    }

    /// Stream the evidence of one partition through its assembler.
    fn call_partition(
        &self,
        (reference_index, direction): Partition,
        evidence: &[Evidence],
    ) -> Result<(
        Vec<AssembledBreakend>,
        Vec<SkippedEvidence>,
        SimpleCounter<SkipReason>,
    )> {
        let mut assembler = BreakendAssembler::new(
            reference_index,
            direction,
            &self.params,
            self.references.get(&reference_index).cloned(),
        )?;
        let horizon = self.params.out_of_order_horizon();
        let mut breakends = Vec::new();
        let mut skipped = Vec::new();
        let mut watermark = i64::MIN;
        for item in evidence {
            let position = item.anchor_position().saturating_sub(horizon);
            if position > watermark {
                watermark = position;
                breakends.extend(assembler.assemble_contigs_before(watermark));
            }
            skipped.extend(assembler.add_evidence_batch(Some(item)).skipped);
        }
        breakends.extend(assembler.flush());
        debug!(
            "Partition {}/{} yielded {} breakends.",
            reference_index,
            direction,
            breakends.len()
        );
        Ok((breakends, skipped, assembler.skips().clone()))
    }
}
