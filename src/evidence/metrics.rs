// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;

use strum::IntoEnumIterator;

/// Named counters describing the evidence behind a call.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum EvidenceMetric {
    #[strum(serialize = "ASSEMBLY_LENGTH")]
    AssemblyLength,
    #[strum(serialize = "ASSEMBLY_READS")]
    AssemblyReads,
    #[strum(serialize = "ASSEMBLY_BASES")]
    AssemblyBases,
    #[strum(serialize = "ASSEMBLY_MAX_SOFTCLIP")]
    AssemblyMaxSoftClip,
    #[strum(serialize = "ASSEMBLY_LONGEST_READ")]
    AssemblyLongestRead,
    #[strum(serialize = "ASSEMBLY_SOFTCLIP_READS")]
    AssemblySoftClipReads,
    #[strum(serialize = "ASSEMBLY_READPAIRS")]
    AssemblyReadPairs,
    #[strum(serialize = "ASSEMBLY_KMER_WEIGHT")]
    AssemblyKmerWeight,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMetrics {
    values: BTreeMap<EvidenceMetric, i64>,
}

impl EvidenceMetrics {
    /// Value of the given metric, zero if it has never been set.
    pub fn get(&self, metric: EvidenceMetric) -> i64 {
        self.values.get(&metric).copied().unwrap_or(0)
    }

    pub fn set(&mut self, metric: EvidenceMetric, value: i64) {
        self.values.insert(metric, value);
    }

    pub fn add(&mut self, metric: EvidenceMetric, value: i64) {
        *self.values.entry(metric).or_insert(0) += value;
    }

    pub fn max(&mut self, metric: EvidenceMetric, value: i64) {
        let entry = self.values.entry(metric).or_insert(value);
        if value > *entry {
            *entry = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EvidenceMetric, i64)> + '_ {
        self.values.iter().map(|(metric, value)| (*metric, *value))
    }

    /// Collect all known metrics from integer INFO fields. Unknown fields are
    /// ignored, missing ones stay unset.
    pub fn from_info<'a, F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<&'a [i64]>,
    {
        let mut metrics = EvidenceMetrics::default();
        for metric in EvidenceMetric::iter() {
            let name: &'static str = metric.into();
            if let Some(value) = lookup(name).and_then(|values| values.first()) {
                metrics.set(metric, *value);
            }
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;

    #[test]
    fn test_metric_names() {
        assert_eq!(EvidenceMetric::AssemblyLength.to_string(), "ASSEMBLY_LENGTH");
        assert_eq!(
            EvidenceMetric::from_str("ASSEMBLY_MAX_SOFTCLIP").unwrap(),
            EvidenceMetric::AssemblyMaxSoftClip
        );
    }

    #[test]
    fn test_accumulate() {
        let mut metrics = EvidenceMetrics::default();
        assert_eq!(metrics.get(EvidenceMetric::AssemblyReads), 0);
        metrics.add(EvidenceMetric::AssemblyReads, 2);
        metrics.add(EvidenceMetric::AssemblyReads, 1);
        metrics.max(EvidenceMetric::AssemblyLongestRead, 7);
        metrics.max(EvidenceMetric::AssemblyLongestRead, 5);
        assert_eq!(metrics.get(EvidenceMetric::AssemblyReads), 3);
        assert_eq!(metrics.get(EvidenceMetric::AssemblyLongestRead), 7);
    }

    #[test]
    fn test_from_info() {
        let mut info: HashMap<String, Vec<i64>> = HashMap::new();
        info.insert("ASSEMBLY_BASES".to_owned(), vec![14]);
        info.insert("SOMETHING_ELSE".to_owned(), vec![1]);
        let metrics = EvidenceMetrics::from_info(|name| info.get(name).map(|v| v.as_slice()));
        assert_eq!(metrics.get(EvidenceMetric::AssemblyBases), 14);
        assert_eq!(metrics.iter().count(), 1);
    }
}
