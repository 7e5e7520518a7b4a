// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp;
use std::collections::{HashMap, HashSet};
use std::ffi;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use itertools::Itertools;
use linear_map::LinearMap;
use rust_htslib::bam::{self, Read};
use rust_htslib::htslib;

use crate::containers::ContigMap;
use crate::genome::{AlignedRead, ContigRegion, GenomicRegion};
use crate::io::read::reader::{ReadBackend, ReadReader, ReaderFactory};
use crate::SampleName;

/// Backend for indexed BAM/CRAM/SAM files via htslib.
///
/// Samples are taken from the `@RG SM` header records; reads are assigned
/// the sample of their `RG` aux tag. A file without read groups contributes
/// its file stem as its single sample.
pub struct HtslibFacade {
    path: PathBuf,
    reader: bam::IndexedReader,
    samples: Vec<SampleName>,
    rg_samples: HashMap<String, SampleName>,
}

impl HtslibFacade {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = bam::IndexedReader::from_path(&path)?;
        let (mut samples, rg_samples) = read_group_samples(reader.header());
        if samples.is_empty() {
            samples.push(
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            );
        }
        Ok(HtslibFacade {
            path,
            reader,
            samples,
            rg_samples,
        })
    }

    fn tid(&self, contig: &str) -> Option<u32> {
        self.reader.header().tid(contig.as_bytes())
    }

    /// Positions the reader on `region`; `None` if the contig is unknown to
    /// this file.
    fn fetch(&mut self, region: &GenomicRegion) -> Result<Option<()>> {
        let tid = match self.tid(region.contig()) {
            Some(tid) => tid,
            None => return Ok(None),
        };
        self.reader.fetch((
            tid as i32,
            i64::from(region.begin()),
            i64::from(region.end()),
        ))?;
        Ok(Some(()))
    }
}

impl ReadBackend for HtslibFacade {
    fn samples(&self) -> Vec<SampleName> {
        self.samples.clone()
    }

    fn possible_regions(&mut self) -> Result<ContigMap> {
        let mut regions = ContigMap::new();
        match linear_index_stats(&self.path)? {
            Some(stats) => {
                for (contig, len, mapped) in stats {
                    if mapped > 0 && len > 0 {
                        regions.insert(contig, ContigRegion::new(0, len)?);
                    }
                }
            }
            None => {
                // No standalone index statistics: degrade to one
                // whole-contig placeholder per header contig.
                let header = self.reader.header();
                for tid in 0..header.target_count() {
                    let contig =
                        String::from_utf8_lossy(header.target_names()[tid as usize]).into_owned();
                    let len = clamp_contig_len(header.target_len(tid).unwrap_or(0));
                    if len > 0 {
                        regions.insert(contig, ContigRegion::new(0, len)?);
                    }
                }
            }
        }
        Ok(regions)
    }

    fn count_reads(&mut self, samples: &[SampleName], region: &GenomicRegion) -> Result<u64> {
        if self.fetch(region)?.is_none() {
            return Ok(0);
        }
        let requested = sample_set(samples);
        let mut count: u64 = 0;
        let mut record = bam::Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result?;
            if record.is_unmapped() {
                continue;
            }
            if requested.contains(record_sample(&self.rg_samples, &self.samples, &record).as_str())
            {
                count += 1;
            }
        }
        Ok(count)
    }

    fn fetch_reads(
        &mut self,
        samples: &[SampleName],
        region: &GenomicRegion,
    ) -> Result<Vec<AlignedRead>> {
        if self.fetch(region)?.is_none() {
            return Ok(Vec::new());
        }
        let requested = sample_set(samples);
        let mut reads = Vec::new();
        let mut record = bam::Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result?;
            if record.is_unmapped() {
                continue;
            }
            let sample = record_sample(&self.rg_samples, &self.samples, &record);
            if !requested.contains(sample.as_str()) {
                continue;
            }
            let begin = record.pos() as u32;
            let end = cmp::max(begin, record.cigar().end_pos() as u32);
            reads.push(AlignedRead::new(
                String::from_utf8_lossy(record.qname()).into_owned(),
                sample,
                GenomicRegion::new(region.contig().clone(), begin, end)?,
                record.mapq(),
            ));
        }
        Ok(reads)
    }

    fn read_positions(
        &mut self,
        samples: &[SampleName],
        region: &GenomicRegion,
    ) -> Result<Vec<u32>> {
        if self.fetch(region)?.is_none() {
            return Ok(Vec::new());
        }
        // coordinate-sorted input, so fetch yields ascending positions
        let requested = sample_set(samples);
        let mut positions = Vec::new();
        let mut record = bam::Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result?;
            if record.is_unmapped() {
                continue;
            }
            if requested.contains(record_sample(&self.rg_samples, &self.samples, &record).as_str())
            {
                positions.push(record.pos() as u32);
            }
        }
        Ok(positions)
    }
}

/// Default factory: selects a backend by file extension.
#[derive(Debug, Default, new)]
pub struct HtslibReaderFactory;

impl ReaderFactory for HtslibReaderFactory {
    fn open(&self, path: &Path) -> Result<ReadReader> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("bam") | Some("cram") | Some("sam") => Ok(ReadReader::new(
                path,
                Box::new(HtslibFacade::from_path(path)?),
            )),
            _ => Err(anyhow!("unsupported read file format: {}", path.display())),
        }
    }
}

fn read_group_samples(
    header: &bam::HeaderView,
) -> (Vec<SampleName>, HashMap<String, SampleName>) {
    let records: HashMap<String, Vec<LinearMap<String, String>>> =
        bam::Header::from_template(header).to_hashmap();
    let mut rg_samples = HashMap::new();
    if let Some(read_groups) = records.get("RG") {
        for read_group in read_groups {
            if let (Some(id), Some(sample)) = (read_group.get("ID"), read_group.get("SM")) {
                rg_samples.insert(id.clone(), sample.clone());
            }
        }
    }
    let samples = rg_samples.values().cloned().sorted().dedup().collect();
    (samples, rg_samples)
}

fn sample_set(samples: &[SampleName]) -> HashSet<&str> {
    samples.iter().map(String::as_str).collect()
}

fn record_sample(
    rg_samples: &HashMap<String, SampleName>,
    samples: &[SampleName],
    record: &bam::Record,
) -> SampleName {
    if let Ok(bam::record::Aux::String(rg)) = record.aux(b"RG") {
        if let Some(sample) = rg_samples.get(rg) {
            return sample.clone();
        }
    }
    samples[0].clone()
}

/// Per-contig `(name, length, mapped count)` statistics from the file's
/// index, or `None` if no index could be loaded standalone.
fn linear_index_stats(path: &Path) -> Result<Option<Vec<(String, u32, u64)>>> {
    let reader = bam::Reader::from_path(path)?;
    let c_path = ffi::CString::new(path.to_string_lossy().to_string())?;
    unsafe {
        let idx = htslib::sam_index_load(reader.htsfile(), c_path.as_ptr());
        if idx.is_null() {
            return Ok(None);
        }
        let header = reader.header();
        let stats = (0..header.target_count())
            .map(|tid| {
                let (mut mapped, mut unmapped) = (0, 0);
                htslib::hts_idx_get_stat(idx, tid as i32, &mut mapped, &mut unmapped);
                let name = String::from_utf8_lossy(header.target_names()[tid as usize]).into_owned();
                (name, clamp_contig_len(header.target_len(tid).unwrap_or(0)), mapped)
            })
            .collect();
        htslib::hts_idx_destroy(idx);
        Ok(Some(stats))
    }
}

fn clamp_contig_len(len: u64) -> u32 {
    cmp::min(len, u64::from(u32::MAX)) as u32
}
