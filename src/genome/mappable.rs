use crate::genome::{ContigRegion, GenomicRegion};

/// Anything that occupies an interval on a contig.
///
/// The interval-indexed containers are generic over this capability, so
/// plain intervals, placed regions and aligned reads can all be indexed.
pub trait Mappable {
    fn contig_region(&self) -> ContigRegion;
}

impl Mappable for ContigRegion {
    fn contig_region(&self) -> ContigRegion {
        *self
    }
}

impl Mappable for GenomicRegion {
    fn contig_region(&self) -> ContigRegion {
        self.region()
    }
}
