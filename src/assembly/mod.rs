// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! De Bruijn graph assembly of breakend contigs.

use std::str;

use anyhow::Result;

use crate::errors::Error;
use crate::evidence::RemoteBreakend;
use crate::reference::ReferenceDictionary;
use crate::variants::breakends::{
    BreakendLocation, BreakendSummary, BreakpointSummary, DirectedBreakend,
};
use crate::variants::{InfoValue, VcfRecord};

pub mod contig;
pub mod graph;
pub mod kmer;
pub mod path;
pub mod read_graph;
pub mod subgraph;

/// INFO key holding the full assembled sequence.
pub const CONSENSUS_KEY: &str = "ASSEMBLY_CONSENSUS";
/// INFO key holding the mean quality of the breakpoint bases.
pub const QUALITY_KEY: &str = "ASSEMBLY_QUALITY";
pub const PROGRAM_KEY: &str = "ASSEMBLY_PROGRAM";
pub const ASSEMBLER_PROGRAM: &str = "debruijn-s";

/// Reasons for marking an assembled breakend as unreliable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr,
)]
pub enum AssemblyFilter {
    /// Free of reference kmers and no longer than the longest supporting read.
    #[strum(serialize = "ASSEMBLY_TOO_SHORT")]
    TooShort,
    #[strum(serialize = "ASSEMBLY_BELOW_MIN_LENGTH")]
    BelowMinLength,
    #[strum(serialize = "LOW_ANCHOR_IDENTITY")]
    LowAnchorIdentity,
}

/// A finalized contig, split into the bases anchored on the reference and the
/// novel breakpoint sequence.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct AssembledBreakend {
    contig: Vec<u8>,
    breakend: DirectedBreakend,
    /// Remote side all supporting discordant pairs agree on.
    remote: Option<RemoteBreakend>,
    /// Per base quality of the breakpoint sequence.
    breakpoint_quality: Vec<u8>,
    filters: Vec<AssemblyFilter>,
    /// Ids of all evidence that contributed kmers.
    evidence_ids: Vec<String>,
}

impl AssembledBreakend {
    pub(crate) fn new(
        contig: Vec<u8>,
        summary: BreakendSummary,
        anchor: &[u8],
        breakpoint: &[u8],
        filters: Vec<AssemblyFilter>,
        evidence_ids: Vec<String>,
    ) -> Self {
        AssembledBreakend {
            contig,
            breakend: DirectedBreakend::new(BreakendLocation::Breakend(summary), anchor, breakpoint),
            remote: None,
            breakpoint_quality: Vec::new(),
            filters,
            evidence_ids,
        }
    }

    pub(crate) fn with_remote(mut self, remote: Option<RemoteBreakend>) -> Self {
        self.remote = remote;
        self
    }

    /// Panics if the qualities do not match the breakpoint sequence.
    pub(crate) fn with_breakpoint_quality(mut self, breakpoint_quality: Vec<u8>) -> Self {
        assert_eq!(
            breakpoint_quality.len(),
            self.breakpoint().len(),
            "bug: breakpoint quality of wrong length"
        );
        self.breakpoint_quality = breakpoint_quality;
        self
    }

    pub fn summary(&self) -> &BreakendSummary {
        self.breakend.summary()
    }

    pub fn anchor(&self) -> &[u8] {
        self.breakend.anchor()
    }

    pub fn breakpoint(&self) -> &[u8] {
        self.breakend.breakpoint()
    }

    pub fn is_filtered(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn is_anchored(&self) -> bool {
        !self.anchor().is_empty()
    }

    pub fn is_breakpoint(&self) -> bool {
        self.remote.is_some()
    }

    /// Mean breakpoint base quality, zero without breakpoint bases.
    pub fn quality(&self) -> f64 {
        if self.breakpoint_quality.is_empty() {
            0.0
        } else {
            let sum: u64 = self.breakpoint_quality.iter().map(|q| u64::from(*q)).sum();
            sum as f64 / self.breakpoint_quality.len() as f64
        }
    }

    /// The breakend with its remote side resolved against the dictionary.
    pub fn directed_breakend(&self, dict: &ReferenceDictionary) -> Result<DirectedBreakend> {
        let remote = match &self.remote {
            None => return Ok(self.breakend.clone()),
            Some(remote) => remote,
        };
        let remote_index = dict
            .index_of(remote.contig())
            .ok_or_else(|| Error::UnknownContig {
                name: remote.contig().clone(),
            })?;
        let (start, end) = remote.interval();
        Ok(DirectedBreakend::new(
            BreakendLocation::Breakpoint(BreakpointSummary::new(
                self.summary().clone(),
                remote_index,
                remote.direction(),
                start,
                end,
            )),
            self.anchor(),
            self.breakpoint(),
        ))
    }

    /// Record for the VCF writer, with filters, the assembled sequence and
    /// its quality attached.
    pub fn to_vcf_record(&self, dict: &ReferenceDictionary) -> Result<VcfRecord> {
        let mut record = self.directed_breakend(dict)?.encode(dict)?;
        for filter in &self.filters {
            record.push_filter(filter.to_string());
        }
        record.set_info(
            CONSENSUS_KEY,
            InfoValue::String(str::from_utf8(&self.contig)?.to_owned()),
        );
        record.set_info(QUALITY_KEY, InfoValue::Float(vec![self.quality()]));
        record.set_info(PROGRAM_KEY, InfoValue::String(ASSEMBLER_PROGRAM.to_owned()));
        Ok(record)
    }
}
