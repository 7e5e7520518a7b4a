pub mod mappable_map;
pub mod mappable_set;

pub use mappable_map::{ContigMap, MappableMap};
pub use mappable_set::MappableSet;
