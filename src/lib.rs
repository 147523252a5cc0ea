//! # symsort — distributed LSD radix sort over a symmetric-memory fleet
//!
//! Distributes a sequence of fixed-width `(key: u64, value: u64)` records
//! across a fleet of ranks, each exposing a partition of memory as
//! remotely-accessible ("symmetric") storage, and sorts the whole sequence
//! in ascending key order in place using a least-significant-digit radix
//! sort. See the crate's design document for the component breakdown.

pub mod aggregator;
pub mod allocator;
pub mod array;
pub mod config;
pub mod count;
pub mod energy;
pub mod error;
pub mod record;
pub mod scan;
pub mod shuffle;
pub mod sort;
pub mod verify;

pub use allocator::{local::LocalFleet, mpi_backend::MpiFleet, SymPtr, SymmetricAllocator};
pub use array::DistributedArray;
pub use config::{ShuffleBackend, SortConfig};
pub use error::{Result, SortError};
pub use record::{RadixParams, Record, SortElement};
pub use shuffle::ShuffleStrategy;

/// Install the crate's tracing subscriber. Call once, from the binary
/// entry point.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
