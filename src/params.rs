// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use derive_builder::Builder;

use crate::assembly::contig::{GreedyMaxKmer, SelectionPolicy};
use crate::assembly::kmer::KmerEncoder;
use crate::errors::Error;

/// Strategy used to pick the next path node when a contig branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum ContigAssemblyOrder {
    GreedyMaxKmer,
}

impl ContigAssemblyOrder {
    pub fn policy(self) -> Box<dyn SelectionPolicy + Send + Sync> {
        match self {
            ContigAssemblyOrder::GreedyMaxKmer => Box::new(GreedyMaxKmer),
        }
    }
}

impl Default for ContigAssemblyOrder {
    fn default() -> Self {
        ContigAssemblyOrder::GreedyMaxKmer
    }
}

/// How much support a single kmer occurrence contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum Weighting {
    /// Every occurrence counts one.
    Count,
    /// An occurrence counts the lowest base quality of its bases.
    BaseQuality,
}

impl Default for Weighting {
    fn default() -> Self {
        Weighting::Count
    }
}

impl Weighting {
    /// Weight of a kmer occurrence given the qualities of its bases. Reads
    /// without qualities count one.
    pub fn kmer_weight(self, qualities: &[u8]) -> u32 {
        match self {
            Weighting::Count => 1,
            Weighting::BaseQuality => qualities
                .iter()
                .min()
                .map_or(1, |q| u32::from(*q).max(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, CopyGetters, Setters)]
#[serde(default, deny_unknown_fields)]
#[builder(pattern = "owned", default)]
#[getset(get_copy = "pub")]
pub struct AssemblyParameters {
    /// Kmer size, between 1 and 31.
    #[getset(set = "pub")]
    k: usize,
    /// Maximum number of differing bases for which sibling paths are merged.
    /// Zero disables the merge.
    max_base_mismatch_for_collapse: usize,
    assembly_order: ContigAssemblyOrder,
    /// Contigs shorter than this are reported with ASSEMBLY_BELOW_MIN_LENGTH.
    min_contig_length: usize,
    min_average_base_quality: f64,
    min_mapq: u8,
    /// Minimal fraction of anchor bases matching the reference.
    min_anchor_identity: f64,
    weighting: Weighting,
    /// Evidence may arrive this many bases behind the stream position.
    out_of_order_horizon: i64,
}

impl Default for AssemblyParameters {
    fn default() -> Self {
        AssemblyParameters {
            k: 25,
            max_base_mismatch_for_collapse: 0,
            assembly_order: ContigAssemblyOrder::default(),
            min_contig_length: 0,
            min_average_base_quality: 0.0,
            min_mapq: 0,
            min_anchor_identity: 0.0,
            weighting: Weighting::default(),
            out_of_order_horizon: 1000,
        }
    }
}

impl AssemblyParameters {
    /// Load from a YAML or JSON file (chosen by extension, YAML otherwise) and validate.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read parameters from {}", path.display()))?;
        let params: AssemblyParameters = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(Error::InvalidParameters { msg }.into()) };
        KmerEncoder::new(self.k)?;
        if !(0.0..=1.0).contains(&self.min_anchor_identity) {
            return invalid(format!(
                "min_anchor_identity must be within [0, 1], got {}",
                self.min_anchor_identity
            ));
        }
        if self.min_average_base_quality < 0.0 {
            return invalid(format!(
                "min_average_base_quality must not be negative, got {}",
                self.min_average_base_quality
            ));
        }
        if self.out_of_order_horizon < 0 {
            return invalid(format!(
                "out_of_order_horizon must not be negative, got {}",
                self.out_of_order_horizon
            ));
        }
        Ok(())
    }

    pub fn encoder(&self) -> Result<KmerEncoder> {
        KmerEncoder::new(self.k)
    }
}
