// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str;
use std::sync::Arc;

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::calling::CallerBuilder;
use crate::errors::Error;
use crate::evidence::{Evidence, EvidenceRecord};
use crate::params::AssemblyParameters;
use crate::reference::{self, ReferenceDictionary};
use crate::variants::breakends::BreakendLocation;
use crate::variants::{VariantRecord, VcfRecord};

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "breakasm",
    about = "Local de Bruijn graph assembly of structural variant breakends.",
    setting = structopt::clap::AppSettings::ColoredHelp
)]
pub struct Breakasm {
    #[structopt(long, short, help = "Print debug messages.")]
    pub verbose: bool,
    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt, Clone)]
pub enum Command {
    #[structopt(
        name = "assemble",
        about = "Assemble breakend contigs from evidence given as JSON lines and write one \
                 BND record per contig as JSON lines.",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    Assemble {
        #[structopt(
            parse(from_os_str),
            help = "JSON lines file with evidence in reference position order (if omitted, read from STDIN)."
        )]
        evidence: Option<PathBuf>,
        #[structopt(
            long,
            parse(from_os_str),
            help = "File that shall contain the records (if omitted, write to STDOUT)."
        )]
        output: Option<PathBuf>,
        #[structopt(
            long,
            parse(from_os_str),
            help = "YAML or JSON file with assembly parameters."
        )]
        params: Option<PathBuf>,
        #[structopt(long, help = "Kmer size, overrides the parameter file.")]
        k: Option<usize>,
        #[structopt(
            long,
            parse(from_os_str),
            help = "FASTA file with the reference genome, indexed with samtools faidx. \
                    If given, kmers are classified by comparison with the reference."
        )]
        reference: Option<PathBuf>,
        #[structopt(
            long = "contig",
            help = "Names of the reference sequences in index order, if no reference is given."
        )]
        contigs: Vec<String>,
        #[structopt(
            long = "reference-buffer-size",
            short = "b",
            default_value = "10",
            help = "Number of reference sequences to keep in buffer."
        )]
        reference_buffer_size: usize,
        #[structopt(long, short, default_value = "1", help = "Number of threads to use.")]
        threads: usize,
    },
    #[structopt(
        name = "decode-bnd",
        about = "Decode a BND record and print the breakend as JSON.",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    DecodeBnd {
        #[structopt(help = "Reference sequence name of the record.")]
        contig: String,
        #[structopt(help = "POS column of the record.")]
        pos: i64,
        #[structopt(name = "ref", help = "REF allele.")]
        ref_allele: String,
        #[structopt(help = "ALT allele.")]
        alt: String,
        #[structopt(
            long = "contig",
            help = "Names of the reference sequences in index order (defaults to the record's contig)."
        )]
        contigs: Vec<String>,
    },
}

#[derive(Serialize)]
struct DecodedBreakend<'a> {
    valid: bool,
    location: Option<&'a BreakendLocation>,
    anchor: Option<&'a str>,
    breakpoint: Option<&'a str>,
}

pub fn run(opt: Breakasm) -> Result<()> {
    match opt.command {
        Command::Assemble {
            evidence,
            output,
            params,
            k,
            reference,
            contigs,
            reference_buffer_size,
            threads,
        } => {
            if let Err(e) = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
            {
                debug!("Reusing existing thread pool: {}", e);
            }

            let mut params = match params {
                Some(path) => AssemblyParameters::from_path(path)?,
                None => AssemblyParameters::default(),
            };
            if let Some(k) = k {
                params.set_k(k);
                params.validate()?;
            }

            let evidence = match evidence {
                Some(path) => read_evidence(BufReader::new(
                    File::open(&path)
                        .with_context(|| format!("unable to open evidence file {}", path.display()))?,
                ))?,
                None => read_evidence(io::stdin().lock())?,
            };

            let (dict, references) = match reference {
                Some(path) => {
                    let buffer = reference::Buffer::from_path(&path, reference_buffer_size)?;
                    let dict = buffer.dictionary();
                    let indices: BTreeSet<usize> =
                        evidence.iter().map(|item| item.reference_index()).collect();
                    let mut windows = HashMap::new();
                    for index in indices {
                        windows.insert(index, Arc::new(buffer.window(&dict, index)?));
                    }
                    (dict, windows)
                }
                None => (ReferenceDictionary::new(contigs), HashMap::new()),
            };
            if let Some(item) = evidence
                .iter()
                .find(|item| dict.name(item.reference_index()).is_none())
            {
                return Err(Error::UnknownReferenceIndex {
                    index: item.reference_index(),
                }
                .into());
            }

            let caller = CallerBuilder::default()
                .params(params)
                .references(references)
                .build()?;
            let result = caller.call(evidence)?;

            let records = result
                .breakends
                .iter()
                .map(|breakend| breakend.to_vcf_record(&dict))
                .collect::<Result<Vec<VcfRecord>>>()?;
            match output {
                Some(path) => write_records(
                    BufWriter::new(File::create(&path).with_context(|| {
                        format!("unable to create output file {}", path.display())
                    })?),
                    &records,
                )?,
                None => write_records(BufWriter::new(io::stdout()), &records)?,
            }
            info!(
                "Wrote {} breakends, {} evidence records were skipped.",
                records.len(),
                result.skipped.len()
            );
        }
        Command::DecodeBnd {
            contig,
            pos,
            ref_allele,
            alt,
            contigs,
        } => {
            let dict = if contigs.is_empty() {
                ReferenceDictionary::new(vec![contig.clone()])
            } else {
                ReferenceDictionary::new(contigs)
            };
            let record = VariantRecord::new(
                VcfRecord::new(&contig, pos, &ref_allele, vec![alt]),
                &dict,
            );
            let breakend = record.breakend();
            let decoded = DecodedBreakend {
                valid: record.is_valid(),
                location: breakend.map(|breakend| breakend.location()),
                anchor: breakend
                    .map(|breakend| str::from_utf8(breakend.anchor()))
                    .transpose()?,
                breakpoint: breakend
                    .map(|breakend| str::from_utf8(breakend.breakpoint()))
                    .transpose()?,
            };
            println!("{}", serde_json::to_string(&decoded)?);
        }
    }
    Ok(())
}

/// Parse evidence from JSON lines. Blank lines are ignored, malformed ones are
/// reported and skipped.
pub fn read_evidence<R: BufRead>(reader: R) -> Result<Vec<Evidence>> {
    let mut evidence = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<EvidenceRecord>(&line)
            .map_err(anyhow::Error::from)
            .and_then(|record| record.into_evidence());
        match parsed {
            Ok(item) => evidence.push(item),
            Err(e) => warn!(
                "{}",
                Error::InvalidEvidenceRecord {
                    line: i + 1,
                    msg: e.to_string(),
                }
            ),
        }
    }
    Ok(evidence)
}

fn write_records<W: Write>(mut writer: W, records: &[VcfRecord]) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read records written by `assemble`.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<VcfRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            records.push(serde_json::from_str(&line)?);
        }
    }
    Ok(records)
}
