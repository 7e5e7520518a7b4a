use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /* ======================== Reader I/O errors ==================== */
    #[error("failed to open read file {path}: {cause}")]
    ReaderOpen { path: PathBuf, cause: anyhow::Error },
    #[error("failed to read from {path}: {cause}")]
    ReaderFetch { path: PathBuf, cause: anyhow::Error },
    /* ======================== Domain errors ======================== */
    #[error("invalid interval [{begin}, {end}): begin exceeds end")]
    InvalidInterval { begin: u32, end: u32 },
    #[error("cannot compare regions on different contigs: {lhs} vs {rhs}")]
    ContigMismatch { lhs: String, rhs: String },
    #[error("invalid genomic region syntax (expected CONTIG or CONTIG:BEGIN-END): {spec}")]
    InvalidRegionSyntax { spec: String },
    #[error("cannot query leftmost/rightmost overlap of an empty mappable map")]
    EmptyMappableMap,
    #[error("at least one read file must be provided")]
    NoReadFiles,
    #[error("max open files must be at least 1")]
    InvalidMaxOpenFiles,
    /* ======================== Lookup errors ======================== */
    #[error("unknown sample {name}: not present in any read file")]
    UnknownSample { name: String },
}
