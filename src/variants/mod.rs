// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;

use crate::reference::ReferenceDictionary;

pub mod breakends;

use self::breakends::{BreakendSummary, BreakpointSummary, DirectedBreakend};

/// INFO key of the confidence interval around the breakend position.
pub const CI_KEY: &str = "CILEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoValue {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    String(String),
}

/// The columns of a VCF record that matter for breakends, as handed over to
/// and received from the VCF writing and reading collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, CopyGetters, Setters)]
pub struct VcfRecord {
    #[getset(get = "pub", set = "pub")]
    #[serde(default)]
    id: Option<String>,
    #[getset(get = "pub")]
    contig: String,
    #[getset(get_copy = "pub")]
    pos: i64,
    #[getset(get = "pub")]
    ref_allele: String,
    #[getset(get = "pub")]
    alt_alleles: Vec<String>,
    #[getset(get = "pub")]
    #[serde(default)]
    filters: Vec<String>,
    #[getset(get = "pub")]
    #[serde(default)]
    info: BTreeMap<String, InfoValue>,
}

impl VcfRecord {
    pub fn new(contig: &str, pos: i64, ref_allele: &str, alt_alleles: Vec<String>) -> Self {
        VcfRecord {
            id: None,
            contig: contig.to_owned(),
            pos,
            ref_allele: ref_allele.to_owned(),
            alt_alleles,
            filters: Vec::new(),
            info: BTreeMap::new(),
        }
    }

    pub fn set_info<K: Into<String>>(&mut self, key: K, value: InfoValue) {
        self.info.insert(key.into(), value);
    }

    pub fn push_filter<F: Into<String>>(&mut self, filter: F) {
        self.filters.push(filter.into());
    }

    /// PASS if no filter has been recorded.
    pub fn filter_column(&self) -> String {
        if self.filters.is_empty() {
            "PASS".to_owned()
        } else {
            self.filters.join(";")
        }
    }
}

/// A variant record, classified by whether its ALT allele describes a breakend.
#[derive(Debug, Clone, PartialEq)]
pub enum VariantRecord {
    /// Any record that is not a valid breakend.
    Plain(VcfRecord),
    /// A single breakend without known partner.
    DirectedEvidence {
        record: VcfRecord,
        breakend: DirectedBreakend,
    },
    /// A breakend with a partner on the remote side.
    DirectedBreakpoint {
        record: VcfRecord,
        breakend: DirectedBreakend,
    },
}

impl VariantRecord {
    pub fn new(record: VcfRecord, dict: &ReferenceDictionary) -> Self {
        match DirectedBreakend::decode(&record, dict) {
            Ok(breakend) if breakend.is_breakpoint() => {
                VariantRecord::DirectedBreakpoint { record, breakend }
            }
            Ok(breakend) => VariantRecord::DirectedEvidence { record, breakend },
            Err(e) => {
                debug!(
                    "Treating record at {}:{} as plain variant: {}",
                    record.contig(),
                    record.pos(),
                    e
                );
                VariantRecord::Plain(record)
            }
        }
    }

    pub fn record(&self) -> &VcfRecord {
        match self {
            VariantRecord::Plain(record)
            | VariantRecord::DirectedEvidence { record, .. }
            | VariantRecord::DirectedBreakpoint { record, .. } => record,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, VariantRecord::Plain(_))
    }

    pub fn breakend(&self) -> Option<&DirectedBreakend> {
        match self {
            VariantRecord::Plain(_) => None,
            VariantRecord::DirectedEvidence { breakend, .. }
            | VariantRecord::DirectedBreakpoint { breakend, .. } => Some(breakend),
        }
    }

    fn expect_breakend(&self) -> &DirectedBreakend {
        match self.breakend() {
            Some(breakend) => breakend,
            None => panic!(
                "record at {}:{} is not a valid breakend",
                self.record().contig(),
                self.record().pos()
            ),
        }
    }

    /// Panics if the record is not a valid breakend.
    pub fn breakend_summary(&self) -> &BreakendSummary {
        self.expect_breakend().summary()
    }

    /// Panics if the record is not a valid breakend, `None` for breakends
    /// without partner.
    pub fn breakpoint_summary(&self) -> Option<&BreakpointSummary> {
        self.expect_breakend().location().breakpoint()
    }

    /// Panics if the record is not a valid breakend.
    pub fn anchor_sequence(&self) -> &[u8] {
        self.expect_breakend().anchor()
    }

    /// Panics if the record is not a valid breakend.
    pub fn breakpoint_sequence(&self) -> &[u8] {
        self.expect_breakend().breakpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> ReferenceDictionary {
        ReferenceDictionary::new(vec!["polyA".to_owned(), "chr2".to_owned()])
    }

    #[test]
    fn test_classification() {
        let plain = VariantRecord::new(VcfRecord::new("polyA", 1, "A", vec!["C".to_owned()]), &dict());
        assert!(!plain.is_valid());
        assert!(plain.breakend().is_none());

        let evidence = VariantRecord::new(VcfRecord::new("polyA", 1, "A", vec!["AC.".to_owned()]), &dict());
        assert!(matches!(evidence, VariantRecord::DirectedEvidence { .. }));
        assert_eq!(evidence.anchor_sequence(), b"A");
        assert_eq!(evidence.breakpoint_sequence(), b"C");
        assert!(evidence.breakpoint_summary().is_none());

        let breakpoint =
            VariantRecord::new(VcfRecord::new("polyA", 1, "A", vec!["AC[chr2:5[".to_owned()]), &dict());
        assert!(matches!(breakpoint, VariantRecord::DirectedBreakpoint { .. }));
        assert_eq!(breakpoint.breakpoint_summary().unwrap().remote_start(), 5);
    }

    #[test]
    fn test_unknown_contig_is_plain() {
        let record = VariantRecord::new(VcfRecord::new("chrUn", 1, "A", vec!["AC.".to_owned()]), &dict());
        assert!(!record.is_valid());
    }

    #[test]
    #[should_panic(expected = "not a valid breakend")]
    fn test_plain_summary_access() {
        let plain = VariantRecord::new(VcfRecord::new("polyA", 1, "A", vec!["C".to_owned()]), &dict());
        plain.breakend_summary();
    }

    #[test]
    #[should_panic(expected = "not a valid breakend")]
    fn test_plain_sequence_access() {
        let plain = VariantRecord::new(VcfRecord::new("polyA", 1, "A", vec!["<DEL>".to_owned()]), &dict());
        plain.breakpoint_sequence();
    }

    #[test]
    fn test_filter_column() {
        let mut record = VcfRecord::new("polyA", 1, "A", vec!["AC.".to_owned()]);
        assert_eq!(record.filter_column(), "PASS");
        record.push_filter("ASSEMBLY_TOO_SHORT");
        assert_eq!(record.filter_column(), "ASSEMBLY_TOO_SHORT");
    }

    #[test]
    fn test_json_shape() {
        let mut record = VcfRecord::new("polyA", 1, "A", vec!["AC.".to_owned()]);
        record.set_info("SVTYPE", InfoValue::String("BND".to_owned()));
        record.set_info(CI_KEY, InfoValue::Integer(vec![0, 3]));
        let json = serde_json::to_string(&record).unwrap();
        let parsed: VcfRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert!(json.contains("\"CILEN\":[0,3]"));

        record.set_info("ASSEMBLY_QUALITY", InfoValue::Float(vec![4.0]));
        let parsed: VcfRecord = serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(
            parsed.info().get("ASSEMBLY_QUALITY"),
            Some(&InfoValue::Float(vec![4.0]))
        );
        assert_eq!(parsed.info().get(CI_KEY), Some(&InfoValue::Integer(vec![0, 3])));
    }
}
