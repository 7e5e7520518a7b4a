use crate::genome::{ContigRegion, GenomicRegion, Mappable};
use crate::SampleName;

/// A single aligned sequencing read: its name, originating sample, mapping
/// position and mapping quality. The read payload itself stays with the
/// backend; the manager only routes on position and sample.
#[derive(new, Getters, CopyGetters, Debug, Clone, PartialEq, Eq)]
pub struct AlignedRead {
    #[getset(get = "pub")]
    name: String,
    #[getset(get = "pub")]
    sample: SampleName,
    #[getset(get = "pub")]
    region: GenomicRegion,
    #[getset(get_copy = "pub")]
    mapping_quality: u8,
}

impl Mappable for AlignedRead {
    fn contig_region(&self) -> ContigRegion {
        self.region.region()
    }
}
