//! The symmetric allocator interface (SPEC_FULL.md §4.1): every rank
//! allocates the same size at the same logical address, and any rank may
//! read or write any rank's region by `(rank, local-offset)`.
//!
//! Two backends implement [`SymmetricAllocator`]: [`local::LocalFleet`], an
//! in-process thread-per-rank emulation used by tests and single-machine
//! runs, and [`mpi_backend::MpiFleet`], a one-sided RMA backend for real
//! distributed runs under an MPI launcher.

pub mod local;
pub mod mpi_backend;

use crate::error::Result;

/// A handle to a collective symmetric allocation. Opaque outside of the
/// allocator backend that produced it; every rank holds an equal-sized
/// local region identified by the same `SymPtr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymPtr {
    pub(crate) alloc_id: u64,
    pub(crate) nbytes: usize,
}

impl SymPtr {
    pub fn nbytes(&self) -> usize {
        self.nbytes
    }
}

/// Collective, one-sided access to a symmetric heap spread across a fleet
/// of ranks. Every method here is either purely local (`my_rank`,
/// `n_ranks`) or collective: it must be called by every rank, in the same
/// order, for the fleet to make progress (SPEC_FULL.md §5).
pub trait SymmetricAllocator: Send {
    /// Collectively allocate `nbytes` on every rank. Returns the same
    /// logical handle on every rank.
    fn alloc(&self, nbytes: usize) -> Result<SymPtr>;

    /// Free a prior allocation. Collective.
    fn free(&self, ptr: SymPtr);

    /// Block until every rank has entered this call. All puts/gets issued
    /// by any rank before its `barrier_all()` call are visible to every
    /// other rank after that rank's `barrier_all()` returns.
    fn barrier_all(&self);

    fn my_rank(&self) -> usize;
    fn n_ranks(&self) -> usize;

    /// Raw pointer to the start of *this rank's own* region of `sym`. Used
    /// only for purely local access (no remote rank is ever addressed
    /// through this pointer); remote access always goes through
    /// `put`/`get`/`iput`/`iget`.
    fn local_base(&self, sym: SymPtr) -> *mut u8;

    /// Blocking one-sided write of `src` into `dst_sym` at byte `dst_offset`
    /// on `rank`.
    ///
    /// # Safety
    /// `src` must be valid for `nbytes` bytes, and `dst_offset + nbytes`
    /// must not exceed the allocation's size.
    unsafe fn put(&self, dst_sym: SymPtr, dst_offset: usize, src: *const u8, nbytes: usize, rank: usize);

    /// Blocking one-sided read of `src_sym` at byte `src_offset` on `rank`
    /// into `dst`.
    ///
    /// # Safety
    /// `dst` must be valid for `nbytes` bytes, and `src_offset + nbytes`
    /// must not exceed the allocation's size.
    unsafe fn get(&self, dst: *mut u8, src_sym: SymPtr, src_offset: usize, nbytes: usize, rank: usize);

    /// Strided write: `n_elts` elements of `elt_size` bytes, read from `src`
    /// at stride `src_stride` elements, written into `dst_sym` (byte offset
    /// `dst_offset_elts * elt_size`) at stride `dst_stride` elements, on
    /// `rank`.
    ///
    /// # Safety
    /// `src` must contain at least `(n_elts - 1) * src_stride + 1` elements
    /// of `elt_size` bytes; the destination region addressed by the stride
    /// walk must lie within the allocation.
    #[allow(clippy::too_many_arguments)]
    unsafe fn iput(
        &self,
        dst_sym: SymPtr,
        dst_offset_elts: usize,
        src: *const u8,
        dst_stride: usize,
        src_stride: usize,
        n_elts: usize,
        elt_size: usize,
        rank: usize,
    );

    /// Strided read, the mirror of [`SymmetricAllocator::iput`].
    ///
    /// # Safety
    /// Same contract as `iput`, with source and destination reversed.
    #[allow(clippy::too_many_arguments)]
    unsafe fn iget(
        &self,
        dst: *mut u8,
        src_sym: SymPtr,
        src_offset_elts: usize,
        dst_stride: usize,
        src_stride: usize,
        n_elts: usize,
        elt_size: usize,
        rank: usize,
    );

    /// Single-element scalar put of an `i64`, used for per-rank totals and
    /// starts in the exclusive scan.
    fn p_i64(&self, dst_sym: SymPtr, offset_elems: usize, value: i64, rank: usize);

    /// Every rank contributes `local`; every rank receives the concatenation
    /// in rank order.
    fn fcollect_i64(&self, local: &[i64]) -> Vec<i64>;

    /// Fleet-wide logical AND.
    fn reduce_and_bool(&self, value: bool) -> bool;

    /// Fleet-wide sum.
    fn reduce_sum_i64(&self, value: i64) -> i64;

    /// Open a new many-to-many message channel, collectively (every rank
    /// calls this the same number of times, in the same order — the same
    /// discipline as `alloc`). Backs [`crate::aggregator::Aggregator`];
    /// two aggregators opening independent channels may run concurrently
    /// without their messages interleaving.
    fn open_channel(&self) -> u32;

    /// Non-blocking attempt to enqueue `bytes` for delivery to `dst_rank`
    /// on `channel`. Returns `false` if the destination's inbound buffer
    /// for this channel is full (backpressure); the caller should retry
    /// later.
    fn try_send_bytes(&self, channel: u32, dst_rank: usize, bytes: &[u8]) -> bool;

    /// Non-blocking attempt to dequeue one message addressed to this rank
    /// on `channel`. Returns `(source_rank, bytes)` if one was available.
    fn try_recv_bytes(&self, channel: u32) -> Option<(usize, Vec<u8>)>;

    /// Release a channel's resources. Collective.
    fn close_channel(&self, channel: u32);
}
