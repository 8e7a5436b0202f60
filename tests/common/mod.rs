// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::NamedTempFile;

use breakasm::cli::{read_records, run, Breakasm, Command};
use breakasm::params::AssemblyParameters;
use breakasm::variants::{InfoValue, VcfRecord, CI_KEY};

#[derive(Debug, Deserialize)]
pub(crate) struct ExpectedRecord {
    pos: i64,
    #[serde(rename = "ref")]
    ref_allele: String,
    alt: String,
    #[serde(default)]
    filters: Vec<String>,
    #[serde(default)]
    cilen: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Testcase {
    #[serde(default)]
    contigs: Vec<String>,
    #[serde(default)]
    params: AssemblyParameters,
    evidence: Vec<serde_yaml::Value>,
    expected: Vec<ExpectedRecord>,
    #[serde(skip)]
    path: PathBuf,
}

pub(crate) fn load_testcase(path: impl AsRef<Path>) -> Result<Testcase> {
    let reader = File::open(path.as_ref().join("testcase.yaml"))?;
    let mut testcase: Testcase = serde_yaml::from_reader(reader)?;
    testcase.path = path.as_ref().to_owned();
    Ok(testcase)
}

impl Testcase {
    pub(crate) fn run(&self) -> Result<Vec<VcfRecord>> {
        let mut evidence = NamedTempFile::new()?;
        for item in &self.evidence {
            writeln!(evidence, "{}", serde_json::to_string(item)?)?;
        }
        let mut params = NamedTempFile::new()?;
        serde_yaml::to_writer(&mut params, &self.params)?;
        let output = NamedTempFile::new()?;

        run(Breakasm {
            verbose: false,
            command: Command::Assemble {
                evidence: Some(evidence.path().to_owned()),
                output: Some(output.path().to_owned()),
                params: Some(params.path().to_owned()),
                k: None,
                reference: None,
                contigs: self.contigs.clone(),
                reference_buffer_size: 1,
                threads: 1,
            },
        })?;
        read_records(output.path())
    }

    pub(crate) fn check(&self, records: &[VcfRecord]) {
        assert_eq!(
            records.len(),
            self.expected.len(),
            "unexpected number of records in {}: {:?}",
            self.path.display(),
            records
        );
        for (record, expected) in records.iter().zip(&self.expected) {
            assert_eq!(record.pos(), expected.pos);
            assert_eq!(record.ref_allele(), &expected.ref_allele);
            assert_eq!(record.alt_alleles(), &vec![expected.alt.clone()]);
            assert_eq!(record.filters(), &expected.filters);
            if let Some(cilen) = &expected.cilen {
                assert_eq!(
                    record.info().get(CI_KEY),
                    Some(&InfoValue::Integer(cilen.clone()))
                );
            }
        }
    }
}
