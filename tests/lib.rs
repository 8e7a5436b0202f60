// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

#[macro_use]
extern crate serde_derive;

use std::path::Path;

use breakasm::evidence::Evidence;
use breakasm::reference::ReferenceDictionary;
use breakasm::variants::{VariantRecord, VcfRecord};
use breakasm::{AssemblyParameters, BreakendAssembler, BreakendDirection};

mod common;

use common::load_testcase;

macro_rules! testcase {
    ($name:ident) => {
        #[test]
        fn $name() {
            let _ = env_logger::builder().is_test(true).try_init();
            let name = stringify!($name);
            let testcase = load_testcase(
                &Path::new(file!())
                    .parent()
                    .unwrap()
                    .join("resources/testcases")
                    .join(name),
            )
            .unwrap();
            let records = testcase.run().unwrap();
            testcase.check(&records);
        }
    };
}

testcase!(test01);
testcase!(test02);
testcase!(test03);
testcase!(test04);
testcase!(test05);

fn params(k: usize) -> AssemblyParameters {
    breakasm::params::AssemblyParametersBuilder::default()
        .k(k)
        .build()
        .unwrap()
}

#[test]
fn test_assembled_breakend_decodes() {
    let dict = ReferenceDictionary::new(vec!["chr1".to_owned()]);
    let mut assembler =
        BreakendAssembler::new(0, BreakendDirection::Forward, &params(3), None).unwrap();
    for (id, anchor, aligned, seq) in &[
        ("r1", 10, 4, &b"TAAAGTC"[..]),
        ("r2", 11, 3, &b"AAAGTCT"[..]),
    ] {
        let evidence = Evidence::soft_clip(id, 0, BreakendDirection::Forward, *anchor, *aligned, seq);
        assert!(assembler.add_evidence(&evidence).unwrap());
    }
    let breakends = assembler.flush();
    assert_eq!(breakends.len(), 1);

    let record = breakends[0].to_vcf_record(&dict).unwrap();
    let decoded = VariantRecord::new(record, &dict);
    assert!(decoded.is_valid());
    assert_eq!(decoded.breakend_summary(), breakends[0].summary());
    assert_eq!(decoded.anchor_sequence(), b"TAAA");
    assert_eq!(decoded.breakpoint_sequence(), b"GTCT");
}

#[test]
fn test_plain_record() {
    let dict = ReferenceDictionary::new(vec!["chr1".to_owned()]);
    let record = VariantRecord::new(
        VcfRecord::new("chr1", 5, "A", vec!["T".to_owned(), "G".to_owned()]),
        &dict,
    );
    assert!(!record.is_valid());
    assert!(record.breakend().is_none());
}

#[test]
#[should_panic(expected = "not a valid breakend")]
fn test_plain_record_access() {
    let dict = ReferenceDictionary::new(vec!["chr1".to_owned()]);
    let record = VariantRecord::new(VcfRecord::new("chr1", 5, "A", vec!["AT".to_owned()]), &dict);
    record.breakend_summary();
}
