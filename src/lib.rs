// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Local assembly of structural variant breakends.
//!
//! Soft clipped reads, discordant read pairs and one-end-anchored pairs that
//! cluster around a candidate breakpoint are decomposed into kmers, assembled in
//! a de Bruijn graph and turned into directed breakend records.

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate getset;
#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate strum_macros;

pub mod assembly;
pub mod calling;
pub mod cli;
pub mod errors;
pub mod evidence;
pub mod params;
pub mod reference;
pub mod utils;
pub mod variants;

pub use crate::assembly::read_graph::BreakendAssembler;
pub use crate::assembly::{AssembledBreakend, AssemblyFilter};
pub use crate::errors::Error;
pub use crate::evidence::{Evidence, EvidenceKind};
pub use crate::params::AssemblyParameters;
pub use crate::variants::breakends::{BreakendDirection, BreakendSummary, BreakpointSummary};
