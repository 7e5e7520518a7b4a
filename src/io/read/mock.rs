//! Scripted in-memory readers for manager tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::containers::ContigMap;
use crate::genome::{AlignedRead, GenomicRegion};
use crate::io::read::reader::{ReadBackend, ReadReader, ReaderFactory};
use crate::SampleName;

#[derive(Debug, Clone, Default)]
pub(crate) struct MockFile {
    pub(crate) samples: Vec<SampleName>,
    pub(crate) reads: Vec<AlignedRead>,
    pub(crate) fail_fetches: bool,
}

pub(crate) struct MockBackend {
    file: MockFile,
}

impl MockBackend {
    fn overlapping<'a>(
        &'a self,
        samples: &'a [SampleName],
        region: &'a GenomicRegion,
    ) -> impl Iterator<Item = &'a AlignedRead> {
        let requested: HashSet<&str> = samples.iter().map(String::as_str).collect();
        self.file.reads.iter().filter(move |read| {
            requested.contains(read.sample().as_str())
                && read.region().contig() == region.contig()
                && read.region().region().overlaps(&region.region())
        })
    }
}

impl ReadBackend for MockBackend {
    fn samples(&self) -> Vec<SampleName> {
        self.file.samples.clone()
    }

    fn possible_regions(&mut self) -> Result<ContigMap> {
        let mut regions = ContigMap::new();
        for read in &self.file.reads {
            regions.insert(read.region().contig().clone(), read.region().region());
        }
        Ok(regions)
    }

    fn count_reads(&mut self, samples: &[SampleName], region: &GenomicRegion) -> Result<u64> {
        Ok(self.overlapping(samples, region).count() as u64)
    }

    fn fetch_reads(
        &mut self,
        samples: &[SampleName],
        region: &GenomicRegion,
    ) -> Result<Vec<AlignedRead>> {
        if self.file.fail_fetches {
            return Err(anyhow!("scripted fetch failure"));
        }
        Ok(self.overlapping(samples, region).cloned().collect())
    }
}

/// Dispenses scripted readers and records every open event.
#[derive(Default)]
pub(crate) struct MockFactory {
    files: HashMap<PathBuf, MockFile>,
    opens: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFactory {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn register(&mut self, path: impl Into<PathBuf>, file: MockFile) {
        self.files.insert(path.into(), file);
    }

    pub(crate) fn open_log(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        Arc::clone(&self.opens)
    }
}

impl ReaderFactory for MockFactory {
    fn open(&self, path: &Path) -> Result<ReadReader> {
        let file = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted file registered for {}", path.display()))?;
        self.opens.lock().unwrap().push(path.to_path_buf());
        Ok(ReadReader::new(path, Box::new(MockBackend { file })))
    }
}
