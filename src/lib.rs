//! Read-management core of a variant caller: genomic interval primitives,
//! interval-indexed containers, reader backends for aligned-read files, and
//! the thread-safe, bounded-resource [`ReadManager`](io::read::ReadManager)
//! that mediates all random-access queries against them.

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate getset;

pub mod containers;
pub mod errors;
pub mod genome;
pub mod io;

pub use crate::genome::{AlignedRead, ContigRegion, GenomicRegion, Mappable};
pub use crate::io::read::{ReadManager, SampleReadMap};

/// Identifier of a reference contig (chromosome or scaffold).
pub type ContigName = String;

/// Identifier of a biological sample.
pub type SampleName = String;
