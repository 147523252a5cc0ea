//! Error taxonomy for the sort engine.
//!
//! Internal invariant violations (an out-of-range destination rank, an odd
//! digit count, a shape mismatch between two distributed arrays) are not
//! represented here — they are fatal via `assert!`/`panic!` at the point of
//! violation, matching the original implementation's `assert()` semantics.
//! Only conditions a caller could plausibly recover from get a variant.

use thiserror::Error;

/// Errors surfaced by the public sort API.
#[derive(Error, Debug)]
pub enum SortError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("symmetric allocation of {nbytes} bytes failed on rank {rank}")]
    Allocation { nbytes: usize, rank: usize },

    #[error("aggregator could not be initialized: {0}")]
    AggregatorInit(String),

    #[error("fleet launch failed: {0}")]
    FleetLaunch(String),

    #[error("MPI error: {0}")]
    Mpi(String),
}

pub type Result<T> = std::result::Result<T, SortError>;
