// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Directed breakends and their BND ALT notation.
//!
//! Supported ALT forms (SEQ is the anchor plus any novel breakpoint sequence):
//!
//! ```text
//! .SEQ                   backward breakend
//! SEQ.                   forward breakend
//! [chr:pos[SEQ ]chr:pos]SEQ   backward breakpoint
//! SEQ[chr:pos[ SEQ]chr:pos]   forward breakpoint
//! ```
//!
//! `[` marks a forward remote side, `]` a backward one. Only the outer bracket
//! counts, the inner one may be either.

use std::str;

use anyhow::Result;
use regex::Regex;

use crate::errors::{invalid_breakend, Error};
use crate::evidence::metrics::EvidenceMetrics;
use crate::reference::ReferenceDictionary;
use crate::variants::{InfoValue, VcfRecord, CI_KEY};

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
    Serialize,
    Deserialize,
)]
pub enum BreakendDirection {
    /// Anchored bases on the left, breakpoint sequence extends rightwards.
    Forward,
    /// Anchored bases on the right, breakpoint sequence extends leftwards.
    Backward,
}

impl BreakendDirection {
    pub fn reverse(self) -> Self {
        match self {
            BreakendDirection::Forward => BreakendDirection::Backward,
            BreakendDirection::Backward => BreakendDirection::Forward,
        }
    }

    fn bracket(self) -> char {
        match self {
            BreakendDirection::Forward => '[',
            BreakendDirection::Backward => ']',
        }
    }

    fn from_bracket(bracket: &str) -> Self {
        if bracket == "[" {
            BreakendDirection::Forward
        } else {
            BreakendDirection::Backward
        }
    }
}

/// One side of a structural variant. `start..=end` is the confidence interval
/// of the position of the last anchored base.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters, Serialize)]
pub struct BreakendSummary {
    #[getset(get_copy = "pub")]
    reference_index: usize,
    #[getset(get_copy = "pub")]
    direction: BreakendDirection,
    #[getset(get_copy = "pub")]
    start: i64,
    #[getset(get_copy = "pub")]
    end: i64,
    #[getset(get = "pub")]
    evidence: EvidenceMetrics,
}

impl BreakendSummary {
    /// Panics if `start > end`.
    pub fn new(
        reference_index: usize,
        direction: BreakendDirection,
        start: i64,
        end: i64,
        evidence: EvidenceMetrics,
    ) -> Self {
        assert!(
            start <= end,
            "bug: breakend interval start {} after end {}",
            start,
            end
        );
        BreakendSummary {
            reference_index,
            direction,
            start,
            end,
            evidence,
        }
    }

    pub fn width(&self) -> i64 {
        self.end - self.start
    }

    /// Position written to the POS column: the centre of the interval.
    pub fn nominal_position(&self) -> i64 {
        self.start + (self.end - self.start) / 2
    }
}

/// A breakend with a known partner.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters, Serialize)]
pub struct BreakpointSummary {
    #[getset(get = "pub")]
    local: BreakendSummary,
    #[getset(get_copy = "pub")]
    remote_reference_index: usize,
    #[getset(get_copy = "pub")]
    remote_direction: BreakendDirection,
    #[getset(get_copy = "pub")]
    remote_start: i64,
    #[getset(get_copy = "pub")]
    remote_end: i64,
}

impl BreakpointSummary {
    pub fn new(
        local: BreakendSummary,
        remote_reference_index: usize,
        remote_direction: BreakendDirection,
        remote_start: i64,
        remote_end: i64,
    ) -> Self {
        assert!(
            remote_start <= remote_end,
            "bug: remote interval start {} after end {}",
            remote_start,
            remote_end
        );
        BreakpointSummary {
            local,
            remote_reference_index,
            remote_direction,
            remote_start,
            remote_end,
        }
    }

    /// The same breakpoint seen from the remote side.
    pub fn remote(&self) -> BreakendSummary {
        BreakendSummary::new(
            self.remote_reference_index,
            self.remote_direction,
            self.remote_start,
            self.remote_end,
            self.local.evidence.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BreakendLocation {
    Breakend(BreakendSummary),
    Breakpoint(BreakpointSummary),
}

impl BreakendLocation {
    pub fn breakend(&self) -> &BreakendSummary {
        match self {
            BreakendLocation::Breakend(summary) => summary,
            BreakendLocation::Breakpoint(summary) => summary.local(),
        }
    }

    pub fn breakpoint(&self) -> Option<&BreakpointSummary> {
        match self {
            BreakendLocation::Breakend(_) => None,
            BreakendLocation::Breakpoint(summary) => Some(summary),
        }
    }
}

/// A decoded breakend: its location plus the anchored and novel bases.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct DirectedBreakend {
    location: BreakendLocation,
    anchor: Vec<u8>,
    breakpoint: Vec<u8>,
}

lazy_static! {
    static ref BACKWARD_BREAKPOINT: Regex =
        Regex::new(r"^(?P<bracket1>[\[\]])(?P<contig>[^\[\]]+):(?P<pos>\d+)(?P<bracket2>[\[\]])(?P<seq>[^\[\]]+)$")
            .unwrap();
    static ref FORWARD_BREAKPOINT: Regex =
        Regex::new(r"^(?P<seq>[^\[\]]+)(?P<bracket1>[\[\]])(?P<contig>[^\[\]]+):(?P<pos>\d+)(?P<bracket2>[\[\]])$")
            .unwrap();
}

struct Remote {
    contig: String,
    position: i64,
    direction: BreakendDirection,
}

impl DirectedBreakend {
    pub fn new(location: BreakendLocation, anchor: &[u8], breakpoint: &[u8]) -> Self {
        DirectedBreakend {
            location,
            anchor: anchor.to_owned(),
            breakpoint: breakpoint.to_owned(),
        }
    }

    pub fn summary(&self) -> &BreakendSummary {
        self.location.breakend()
    }

    pub fn is_breakpoint(&self) -> bool {
        self.location.breakpoint().is_some()
    }

    /// Decode the breakend described by the given record. Any record that does
    /// not follow the BND grammar yields `Error::InvalidBreakend`.
    pub fn decode(record: &VcfRecord, dict: &ReferenceDictionary) -> Result<Self> {
        let ref_allele = record.ref_allele().as_bytes();
        let alt = match record.alt_alleles().as_slice() {
            [alt] => alt.as_bytes(),
            alts => {
                return Err(Error::InvalidBreakend {
                    spec: alts.join(","),
                    reason: format!("expected exactly one ALT allele, found {}", alts.len()),
                }
                .into())
            }
        };
        if ref_allele.is_empty() {
            return Err(invalid_breakend(alt, "empty reference allele").into());
        }
        if alt.len() < 2 {
            return Err(invalid_breakend(alt, "ALT allele shorter than two characters").into());
        }
        if alt.len() <= ref_allele.len() {
            return Err(invalid_breakend(alt, "ALT allele not longer than REF allele").into());
        }

        let (direction, seq, remote) = parse_alt(alt)?;
        if seq.len() < ref_allele.len() {
            return Err(invalid_breakend(alt, "local sequence shorter than REF allele").into());
        }
        if seq.iter().any(|b| !b.is_ascii_alphabetic()) {
            return Err(invalid_breakend(alt, "unexpected character in local sequence").into());
        }
        let (anchor, breakpoint, local_position) = match direction {
            BreakendDirection::Forward => {
                let (anchor, breakpoint) = seq.split_at(ref_allele.len());
                (
                    anchor,
                    breakpoint,
                    record.pos() + ref_allele.len() as i64 - 1,
                )
            }
            BreakendDirection::Backward => {
                let (breakpoint, anchor) = seq.split_at(seq.len() - ref_allele.len());
                (anchor, breakpoint, record.pos())
            }
        };

        let reference_index = dict.index_of(record.contig()).ok_or_else(|| Error::UnknownContig {
            name: record.contig().to_owned(),
        })?;
        let (ci_before, ci_after) = match record.info().get(CI_KEY) {
            None => (0, 0),
            Some(InfoValue::Integer(values)) if values.len() == 2 => (values[0], values[1]),
            Some(_) => return Err(invalid_breakend(alt, "malformed CILEN attribute").into()),
        };
        let evidence = EvidenceMetrics::from_info(|name| match record.info().get(name) {
            Some(InfoValue::Integer(values)) => Some(values.as_slice()),
            _ => None,
        });

        let (start, end) = widen(local_position, ci_before, ci_after);
        let local = BreakendSummary::new(reference_index, direction, start, end, evidence);
        let location = match remote {
            None => BreakendLocation::Breakend(local),
            Some(remote) => {
                let remote_index = dict
                    .index_of(&remote.contig)
                    .ok_or(Error::UnknownContig { name: remote.contig })?;
                let (remote_start, remote_end) = widen(remote.position, ci_before, ci_after);
                BreakendLocation::Breakpoint(BreakpointSummary::new(
                    local,
                    remote_index,
                    remote.direction,
                    remote_start,
                    remote_end,
                ))
            }
        };

        Ok(DirectedBreakend {
            location,
            anchor: anchor.to_owned(),
            breakpoint: breakpoint.to_owned(),
        })
    }

    /// Encode into the BND notation. An empty anchor is written as a single
    /// `N` so that REF is never empty, decoding such a record yields the
    /// anchor `N`.
    pub fn encode(&self, dict: &ReferenceDictionary) -> Result<VcfRecord> {
        let local = self.summary();
        let contig = dict
            .name(local.reference_index())
            .ok_or(Error::UnknownReferenceIndex {
                index: local.reference_index(),
            })?;
        let anchor: &[u8] = if self.anchor.is_empty() {
            b"N"
        } else {
            &self.anchor
        };
        let anchor = str::from_utf8(anchor)?;
        let breakpoint = str::from_utf8(&self.breakpoint)?;

        let position = local.nominal_position();
        let ci = (position - local.start(), local.end() - position);

        let remote = match self.location.breakpoint() {
            None => ".".to_owned(),
            Some(summary) => {
                let remote_contig =
                    dict.name(summary.remote_reference_index())
                        .ok_or(Error::UnknownReferenceIndex {
                            index: summary.remote_reference_index(),
                        })?;
                let bracket = summary.remote_direction().bracket();
                let remote_position = summary.remote_start()
                    + (summary.remote_end() - summary.remote_start()) / 2;
                format!("{}{}:{}{}", bracket, remote_contig, remote_position, bracket)
            }
        };

        let (pos, alt) = match local.direction() {
            BreakendDirection::Forward => (
                position - anchor.len() as i64 + 1,
                format!("{}{}{}", anchor, breakpoint, remote),
            ),
            BreakendDirection::Backward => {
                (position, format!("{}{}{}", remote, breakpoint, anchor))
            }
        };

        let mut record = VcfRecord::new(contig, pos, anchor, vec![alt]);
        record.set_info("SVTYPE", InfoValue::String("BND".to_owned()));
        if ci != (0, 0) {
            record.set_info(CI_KEY, InfoValue::Integer(vec![ci.0, ci.1]));
        }
        for (metric, value) in local.evidence().iter() {
            record.set_info(metric.to_string(), InfoValue::Integer(vec![value]));
        }
        Ok(record)
    }
}

/// Interval `(pos - before, pos + after)` of a signed CILEN pair, ordered so
/// that start never exceeds end.
fn widen(pos: i64, before: i64, after: i64) -> (i64, i64) {
    let (start, end) = (pos - before, pos + after);
    (start.min(end), start.max(end))
}

fn parse_alt(alt: &[u8]) -> Result<(BreakendDirection, &[u8], Option<Remote>)> {
    if alt[0] == b'.' {
        return Ok((BreakendDirection::Backward, &alt[1..], None));
    }
    if alt[alt.len() - 1] == b'.' {
        return Ok((BreakendDirection::Forward, &alt[..alt.len() - 1], None));
    }

    let spec = str::from_utf8(alt).map_err(|_| invalid_breakend(alt, "not valid UTF-8"))?;
    let (direction, caps) = if let Some(caps) = BACKWARD_BREAKPOINT.captures(spec) {
        (BreakendDirection::Backward, caps)
    } else if let Some(caps) = FORWARD_BREAKPOINT.captures(spec) {
        (BreakendDirection::Forward, caps)
    } else {
        return Err(invalid_breakend(alt, "no breakend notation matches").into());
    };

    // the outer bracket gives the remote direction
    let bracket = match direction {
        BreakendDirection::Backward => caps.name("bracket1"),
        BreakendDirection::Forward => caps.name("bracket2"),
    }
    .unwrap()
    .as_str();
    let position: i64 = caps
        .name("pos")
        .unwrap()
        .as_str()
        .parse()
        .map_err(|_| invalid_breakend(alt, "remote position cannot be parsed"))?;
    let seq = caps.name("seq").unwrap();

    Ok((
        direction,
        &alt[seq.start()..seq.end()],
        Some(Remote {
            contig: caps.name("contig").unwrap().as_str().to_owned(),
            position,
            direction: BreakendDirection::from_bracket(bracket),
        }),
    ))
}
