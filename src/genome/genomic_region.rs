// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use regex::Regex;

use crate::errors::Error;
use crate::genome::ContigRegion;
use crate::ContigName;

/// A [`ContigRegion`] placed on a named contig.
///
/// Regions on different contigs are not comparable; the predicate helpers
/// fail with [`Error::ContigMismatch`] instead of guessing an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters, CopyGetters)]
pub struct GenomicRegion {
    #[getset(get = "pub")]
    contig: ContigName,
    #[getset(get_copy = "pub")]
    region: ContigRegion,
}

impl GenomicRegion {
    pub fn new(contig: impl Into<ContigName>, begin: u32, end: u32) -> Result<Self> {
        Ok(GenomicRegion {
            contig: contig.into(),
            region: ContigRegion::new(begin, end)?,
        })
    }

    pub fn from_contig_region(contig: impl Into<ContigName>, region: ContigRegion) -> Self {
        GenomicRegion {
            contig: contig.into(),
            region,
        }
    }

    pub fn begin(&self) -> u32 {
        self.region.begin()
    }

    pub fn end(&self) -> u32 {
        self.region.end()
    }

    pub fn size(&self) -> u32 {
        self.region.size()
    }

    pub fn overlaps(&self, other: &GenomicRegion) -> Result<bool> {
        self.require_same_contig(other)?;
        Ok(self.region.overlaps(&other.region))
    }

    pub fn contains(&self, other: &GenomicRegion) -> Result<bool> {
        self.require_same_contig(other)?;
        Ok(self.region.contains(&other.region))
    }

    pub fn ends_before(&self, other: &GenomicRegion) -> Result<bool> {
        self.require_same_contig(other)?;
        Ok(self.region.ends_before(&other.region))
    }

    fn require_same_contig(&self, other: &GenomicRegion) -> Result<()> {
        if self.contig != other.contig {
            return Err(Error::ContigMismatch {
                lhs: self.to_string(),
                rhs: other.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.contig, self.region)
    }
}

lazy_static! {
    static ref REGION_RE: Regex = Regex::new(r"^([^:\s]+)(?::([0-9,]+)-([0-9,]+))?$").unwrap();
}

impl FromStr for GenomicRegion {
    type Err = anyhow::Error;

    /// Parses samtools-style region syntax: `CONTIG` or `CONTIG:BEGIN-END`,
    /// with optional digit-grouping commas in positions. Positions are taken
    /// verbatim as the half-open `[begin, end)`. A bare contig denotes the
    /// whole contig.
    fn from_str(s: &str) -> Result<Self> {
        let captures = REGION_RE.captures(s).ok_or_else(|| Error::InvalidRegionSyntax {
            spec: s.to_owned(),
        })?;
        let contig = captures[1].to_owned();
        match (captures.get(2), captures.get(3)) {
            (Some(begin), Some(end)) => GenomicRegion::new(
                contig,
                parse_position(begin.as_str(), s)?,
                parse_position(end.as_str(), s)?,
            ),
            _ => GenomicRegion::new(contig, 0, u32::MAX),
        }
    }
}

fn parse_position(position: &str, spec: &str) -> Result<u32> {
    position.replace(',', "").parse().map_err(|_| {
        Error::InvalidRegionSyntax {
            spec: spec.to_owned(),
        }
        .into()
    })
}
