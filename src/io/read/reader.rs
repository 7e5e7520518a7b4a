// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::containers::ContigMap;
use crate::genome::{AlignedRead, GenomicRegion};
use crate::SampleName;

/// Capabilities a concrete aligned-read file format must provide.
///
/// A query on a contig the backend does not know yields a zero or empty
/// result, not an error.
pub trait ReadBackend: Send {
    /// Samples hosted by this file.
    fn samples(&self) -> Vec<SampleName>;

    /// Conservative per-contig union of intervals this file could contain,
    /// read once when the file is admitted.
    fn possible_regions(&mut self) -> Result<ContigMap>;

    /// Number of records from `samples` overlapping `region`.
    fn count_reads(&mut self, samples: &[SampleName], region: &GenomicRegion) -> Result<u64>;

    /// Records from `samples` overlapping `region`, in the backend's native
    /// order.
    fn fetch_reads(
        &mut self,
        samples: &[SampleName],
        region: &GenomicRegion,
    ) -> Result<Vec<AlignedRead>>;

    /// Begin positions of records from `samples` overlapping `region`,
    /// ascending.
    fn read_positions(
        &mut self,
        samples: &[SampleName],
        region: &GenomicRegion,
    ) -> Result<Vec<u32>> {
        let mut positions: Vec<u32> = self
            .fetch_reads(samples, region)?
            .iter()
            .map(|read| read.region().begin())
            .collect();
        positions.sort_unstable();
        Ok(positions)
    }
}

/// An open connection to one aligned-read file.
pub struct ReadReader {
    path: PathBuf,
    backend: Box<dyn ReadBackend>,
}

impl ReadReader {
    pub fn new(path: impl Into<PathBuf>, backend: Box<dyn ReadBackend>) -> Self {
        ReadReader {
            path: path.into(),
            backend,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples(&self) -> Vec<SampleName> {
        self.backend.samples()
    }

    pub fn possible_regions(&mut self) -> Result<ContigMap> {
        self.backend.possible_regions()
    }

    pub fn count_reads(&mut self, samples: &[SampleName], region: &GenomicRegion) -> Result<u64> {
        self.backend.count_reads(samples, region)
    }

    pub fn fetch_reads(
        &mut self,
        samples: &[SampleName],
        region: &GenomicRegion,
    ) -> Result<Vec<AlignedRead>> {
        self.backend.fetch_reads(samples, region)
    }

    pub fn read_positions(
        &mut self,
        samples: &[SampleName],
        region: &GenomicRegion,
    ) -> Result<Vec<u32>> {
        self.backend.read_positions(samples, region)
    }
}

impl fmt::Debug for ReadReader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ReadReader({})", self.path.display())
    }
}

/// Opens a [`ReadReader`] for a path. The manager uses this to admit files
/// into the open pool, both at construction and when re-opening an evicted
/// file under query pressure.
pub trait ReaderFactory: Send + Sync {
    fn open(&self, path: &Path) -> Result<ReadReader>;
}
