// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::slice;
use std::sync::{Mutex, Once};

use anyhow::Result;
use itertools::Itertools;

use crate::containers::ContigMap;
use crate::errors::Error;
use crate::genome::{AlignedRead, GenomicRegion};
use crate::io::read::htslib_facade::HtslibReaderFactory;
use crate::io::read::reader::{ReadReader, ReaderFactory};
use crate::SampleName;

/// Default bound on simultaneously open read-file handles.
pub const DEFAULT_MAX_OPEN_FILES: usize = 200;

/// Reads bucketed per sample, as returned by the fetch operations.
pub type SampleReadMap = HashMap<SampleName, Vec<AlignedRead>>;

/// Eviction-priority key of the open-reader pool: ascending file size, ties
/// by path, so the largest open file is always the last key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ReaderKey {
    file_size: u64,
    path: PathBuf,
}

#[derive(Debug, Default)]
struct ReaderPool {
    open: BTreeMap<ReaderKey, ReadReader>,
    closed: HashSet<PathBuf>,
}

/// Thread-safe façade mediating all random-access queries against a set of
/// aligned-read files, with bounded file-handle consumption.
///
/// Construction opens every file once, in ascending file-size order, to
/// record its sample list and region-possibility summary, then closes down
/// to `max_open_files`. The resulting indexes are immutable; afterwards
/// only the open pool mutates, behind a single mutex, so queries are
/// logically read-only and may be issued concurrently from any thread.
///
/// Under query pressure, files are re-opened on demand; when the pool is
/// full, the largest open file is closed first, since small files re-open
/// cheaply and amortize better over bursty queries.
pub struct ReadManager {
    max_open_files: usize,
    file_sizes: HashMap<PathBuf, u64>,
    reader_paths_with_sample: HashMap<SampleName, Vec<PathBuf>>,
    possible_regions_in_readers: HashMap<PathBuf, ContigMap>,
    samples: Vec<SampleName>,
    factory: Box<dyn ReaderFactory>,
    pool: Mutex<ReaderPool>,
}

impl ReadManager {
    /// Opens the given files with the default htslib backend and the
    /// default open-file bound.
    pub fn from_paths(paths: Vec<PathBuf>) -> Result<Self> {
        Self::new(paths, DEFAULT_MAX_OPEN_FILES)
    }

    /// Opens the given files with the default htslib backend.
    pub fn new(paths: Vec<PathBuf>, max_open_files: usize) -> Result<Self> {
        Self::with_factory(paths, max_open_files, Box::new(HtslibReaderFactory::new()))
    }

    /// Opens the given files with a custom reader factory. Duplicate paths
    /// are dropped after normalization.
    pub fn with_factory(
        paths: Vec<PathBuf>,
        max_open_files: usize,
        factory: Box<dyn ReaderFactory>,
    ) -> Result<Self> {
        if max_open_files == 0 {
            return Err(Error::InvalidMaxOpenFiles.into());
        }
        let mut paths = normalize_paths(paths);
        if paths.is_empty() {
            return Err(Error::NoReadFiles.into());
        }

        let mut file_sizes = HashMap::new();
        for path in &paths {
            let size = fs::metadata(path).map(|metadata| metadata.len()).map_err(
                |cause| Error::ReaderOpen {
                    path: path.clone(),
                    cause: cause.into(),
                },
            )?;
            file_sizes.insert(path.clone(), size);
        }
        // smallest first, so that small files land in the pool and survive
        // eviction
        paths.sort_by_key(|path| (file_sizes[path], path.clone()));

        let mut pool = ReaderPool::default();
        let mut reader_paths_with_sample: HashMap<SampleName, Vec<PathBuf>> = HashMap::new();
        let mut possible_regions_in_readers = HashMap::new();

        for path in &paths {
            let mut reader = open_with(&*factory, path)?;
            for sample in reader.samples() {
                reader_paths_with_sample
                    .entry(sample)
                    .or_default()
                    .push(path.clone());
            }
            let regions = reader
                .possible_regions()
                .map_err(|cause| Error::ReaderFetch {
                    path: path.clone(),
                    cause,
                })?;
            possible_regions_in_readers.insert(path.clone(), regions);
            if pool.open.len() < max_open_files {
                pool.open.insert(
                    ReaderKey {
                        file_size: file_sizes[path],
                        path: path.clone(),
                    },
                    reader,
                );
            } else {
                pool.closed.insert(path.clone());
            }
        }

        let samples: Vec<SampleName> = reader_paths_with_sample.keys().cloned().sorted().collect();

        info!(
            "managing {} read file(s) hosting {} sample(s), at most {} open",
            paths.len(),
            samples.len(),
            max_open_files
        );

        Ok(ReadManager {
            max_open_files,
            file_sizes,
            reader_paths_with_sample,
            possible_regions_in_readers,
            samples,
            factory,
            pool: Mutex::new(pool),
        })
    }

    /// The deduplicated, sorted union of sample names across all files.
    pub fn samples(&self) -> &[SampleName] {
        &self.samples
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn num_files(&self) -> usize {
        self.file_sizes.len()
    }

    /// `true` iff at least one read file is known.
    pub fn good(&self) -> bool {
        self.num_files() > 0
    }

    /// Whether any reads from `samples` overlap `region`. Short-circuits on
    /// the first file with a non-zero count.
    pub fn has_reads(&self, samples: &[SampleName], region: &GenomicRegion) -> Result<bool> {
        let mut found = false;
        self.with_candidate_readers(samples, region, |reader| {
            if reader.count_reads(samples, region)? > 0 {
                found = true;
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    pub fn has_sample_reads(&self, sample: &SampleName, region: &GenomicRegion) -> Result<bool> {
        self.has_reads(slice::from_ref(sample), region)
    }

    pub fn has_any_reads(&self, region: &GenomicRegion) -> Result<bool> {
        self.has_reads(&self.samples, region)
    }

    /// Total number of reads from `samples` overlapping `region`, summed
    /// across all candidate files. Saturates at `u64::MAX`.
    pub fn count_reads(&self, samples: &[SampleName], region: &GenomicRegion) -> Result<u64> {
        let mut total: u64 = 0;
        self.with_candidate_readers(samples, region, |reader| {
            total = saturating_count_add(total, reader.count_reads(samples, region)?);
            Ok(true)
        })?;
        Ok(total)
    }

    pub fn count_sample_reads(&self, sample: &SampleName, region: &GenomicRegion) -> Result<u64> {
        self.count_reads(slice::from_ref(sample), region)
    }

    pub fn count_all_reads(&self, region: &GenomicRegion) -> Result<u64> {
        self.count_reads(&self.samples, region)
    }

    /// The largest prefix `[begin, p)` of `region` such that at most
    /// `max_reads` reads from `samples` overlap it. If `region` itself
    /// satisfies the bound it is returned unchanged; if even a single-base
    /// prefix exceeds the bound, the prefix of length one is returned.
    pub fn find_covered_subregion(
        &self,
        samples: &[SampleName],
        region: &GenomicRegion,
        max_reads: usize,
    ) -> Result<GenomicRegion> {
        let mut positions_per_file: Vec<Vec<u32>> = Vec::new();
        self.with_candidate_readers(samples, region, |reader| {
            positions_per_file.push(reader.read_positions(samples, region)?);
            Ok(true)
        })?;
        // Every fetched read overlaps `region`, so the count over a prefix
        // ending at `p` is the number of merged begin positions < `p`; the
        // cut point is therefore the (max_reads + 1)-th smallest begin.
        match positions_per_file.into_iter().kmerge().nth(max_reads) {
            None => Ok(region.clone()),
            Some(position) => {
                let end = cmp::min(
                    cmp::max(position, region.begin().saturating_add(1)),
                    region.end(),
                );
                GenomicRegion::new(region.contig().clone(), region.begin(), end)
            }
        }
    }

    pub fn find_sample_covered_subregion(
        &self,
        sample: &SampleName,
        region: &GenomicRegion,
        max_reads: usize,
    ) -> Result<GenomicRegion> {
        self.find_covered_subregion(slice::from_ref(sample), region, max_reads)
    }

    pub fn find_all_covered_subregion(
        &self,
        region: &GenomicRegion,
        max_reads: usize,
    ) -> Result<GenomicRegion> {
        self.find_covered_subregion(&self.samples, region, max_reads)
    }

    /// Reads from `samples` overlapping `region`, bucketed by sample.
    ///
    /// The result has exactly the requested samples as keys, with empty
    /// buckets for samples without reads in `region`. Each bucket holds the
    /// backend-native order per file, concatenated across files in
    /// ascending file-size order (ties by path); no further cross-file
    /// ordering is guaranteed.
    pub fn fetch_reads(
        &self,
        samples: &[SampleName],
        region: &GenomicRegion,
    ) -> Result<SampleReadMap> {
        let mut result: SampleReadMap = samples
            .iter()
            .map(|sample| (sample.clone(), Vec::new()))
            .collect();
        self.with_candidate_readers(samples, region, |reader| {
            for read in reader.fetch_reads(samples, region)? {
                if let Some(bucket) = result.get_mut(read.sample()) {
                    bucket.push(read);
                }
            }
            Ok(true)
        })?;
        Ok(result)
    }

    pub fn fetch_sample_reads(
        &self,
        sample: &SampleName,
        region: &GenomicRegion,
    ) -> Result<Vec<AlignedRead>> {
        let mut result = self.fetch_reads(slice::from_ref(sample), region)?;
        Ok(result.remove(sample).unwrap_or_default())
    }

    pub fn fetch_all_reads(&self, region: &GenomicRegion) -> Result<SampleReadMap> {
        self.fetch_reads(&self.samples, region)
    }

    /// Files that could host reads for `samples` in `region`: the union of
    /// the per-sample file sets, pruned by the region-possibility
    /// summaries, in ascending file-size order (ties by path). This is the
    /// documented aggregation order of all multi-file queries.
    fn candidate_paths(
        &self,
        samples: &[SampleName],
        region: &GenomicRegion,
    ) -> Result<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for sample in samples {
            let paths = self
                .reader_paths_with_sample
                .get(sample)
                .ok_or_else(|| Error::UnknownSample {
                    name: sample.clone(),
                })?;
            for path in paths {
                if seen.insert(path) && self.could_contain(path, region) {
                    candidates.push(path.clone());
                }
            }
        }
        candidates.sort_by_key(|path| (self.file_sizes[path], path.clone()));
        Ok(candidates)
    }

    fn could_contain(&self, path: &Path, region: &GenomicRegion) -> bool {
        self.possible_regions_in_readers
            .get(path)
            .map_or(false, |regions| {
                regions.has_overlapped(region.contig(), region.region())
            })
    }

    /// Drives `visit` over every candidate reader for `samples` × `region`:
    /// already-open readers first, then closed readers admitted in batches
    /// bounded by the free pool space. Stops early once `visit` returns
    /// `false`. A reader whose visit fails is closed before the error
    /// propagates, restoring the pool invariants.
    fn with_candidate_readers<F>(
        &self,
        samples: &[SampleName],
        region: &GenomicRegion,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(&mut ReadReader) -> Result<bool>,
    {
        let candidates = self.candidate_paths(samples, region)?;
        let mut pool = self.pool.lock().unwrap();
        let (open_paths, mut closed_paths): (Vec<PathBuf>, Vec<PathBuf>) = candidates
            .into_iter()
            .partition(|path| !pool.closed.contains(path));
        for path in &open_paths {
            if !self.visit_reader(&mut pool, path, &mut visit)? {
                return Ok(());
            }
        }
        while !closed_paths.is_empty() {
            let spaces = cmp::max(1, self.max_open_files.saturating_sub(pool.open.len()));
            let batch: Vec<PathBuf> = closed_paths
                .drain(..cmp::min(spaces, closed_paths.len()))
                .collect();
            for path in &batch {
                self.open_reader(&mut pool, path)?;
                if !self.visit_reader(&mut pool, path, &mut visit)? {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn visit_reader<F>(&self, pool: &mut ReaderPool, path: &Path, visit: &mut F) -> Result<bool>
    where
        F: FnMut(&mut ReadReader) -> Result<bool>,
    {
        let key = self.reader_key(path);
        let reader = pool
            .open
            .get_mut(&key)
            .expect("bug: candidate reader not open");
        match visit(reader) {
            Ok(proceed) => Ok(proceed),
            Err(cause) => {
                self.close_reader(pool, path);
                Err(Error::ReaderFetch {
                    path: path.to_path_buf(),
                    cause,
                }
                .into())
            }
        }
    }

    fn reader_key(&self, path: &Path) -> ReaderKey {
        ReaderKey {
            file_size: self.file_sizes[path],
            path: path.to_path_buf(),
        }
    }

    fn open_reader(&self, pool: &mut ReaderPool, path: &Path) -> Result<()> {
        while pool.open.len() >= self.max_open_files {
            self.close_largest(pool);
        }
        let reader = open_with(&*self.factory, path)?;
        pool.closed.remove(path);
        pool.open.insert(self.reader_key(path), reader);
        Ok(())
    }

    fn close_reader(&self, pool: &mut ReaderPool, path: &Path) {
        pool.open.remove(&self.reader_key(path));
        pool.closed.insert(path.to_path_buf());
    }

    fn close_largest(&self, pool: &mut ReaderPool) {
        if let Some(key) = pool.open.keys().next_back().cloned() {
            debug!(
                "closing {} to honour the open-file bound",
                key.path.display()
            );
            pool.open.remove(&key);
            pool.closed.insert(key.path);
        }
    }
}

impl fmt::Debug for ReadManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReadManager")
            .field("num_files", &self.num_files())
            .field("num_samples", &self.num_samples())
            .field("max_open_files", &self.max_open_files)
            .finish()
    }
}

fn open_with(factory: &dyn ReaderFactory, path: &Path) -> Result<ReadReader> {
    factory.open(path).map_err(|cause| {
        Error::ReaderOpen {
            path: path.to_path_buf(),
            cause,
        }
        .into()
    })
}

fn normalize_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for path in paths {
        let normalized = fs::canonicalize(&path).unwrap_or(path);
        if seen.insert(normalized.clone()) {
            unique.push(normalized);
        }
    }
    unique
}

fn saturating_count_add(total: u64, count: u64) -> u64 {
    match total.checked_add(count) {
        Some(sum) => sum,
        None => {
            static OVERFLOW_WARNING: Once = Once::new();
            OVERFLOW_WARNING.call_once(|| warn!("read count exceeds u64::MAX, saturating"));
            u64::MAX
        }
    }
}
