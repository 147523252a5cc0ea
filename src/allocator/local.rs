//! In-process emulation of the symmetric allocator: `n_ranks` logical ranks
//! cooperatively scheduled as OS threads inside one process, sharing a heap
//! keyed by `(alloc_id, rank)`.
//!
//! This stands in for an external fleet launcher (`mpirun`) the way
//! SPEC_FULL.md's Design Notes call for: "a non-distributed implementation
//! ... can substitute the same contract" as [`super::mpi_backend::MpiFleet`]
//! for testing and single-machine runs. Every rank's thread calls the same
//! collective operations in the same order (the sort engine is written
//! against [`SymmetricAllocator`] generically, not against this backend
//! specifically), so a `std::sync::Barrier` is enough to give puts/gets the
//! same before/after-barrier visibility guarantee the real RMA backend
//! gives.
//!
//! Allocation, `fcollect`, and reduction identifiers are assigned from a
//! rank-local counter rather than a shared atomic: because every rank calls
//! these operations the same number of times in the same order (the
//! collective-ordering contract in SPEC_FULL.md §5), the Nth call on every
//! rank's thread refers to the same logical collective operation without
//! any cross-thread coordination for the numbering itself.

use std::cell::Cell;
use std::sync::{Arc, Barrier};
use std::thread;

use dashmap::DashMap;

use super::{SymPtr, SymmetricAllocator};
use crate::error::Result;

/// A raw pointer into one rank's slice of one allocation. Access is sound
/// because the shuffle's distributed exclusive scan guarantees concurrent
/// writers never target the same cell, and all cross-rank visibility is
/// mediated by [`HeapInner::barrier`] (SPEC_FULL.md §5, "Remote memory").
struct Region {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: `Region` is only ever dereferenced under the disjoint-write
// invariant documented above; the pointee itself (a `Box<[u8]>` kept alive
// in `HeapInner::owned`) is plain POD bytes with no thread-affinity.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

/// Bound on the number of undelivered messages queued per `(channel,
/// dst_rank)` pair before `try_send_bytes` reports backpressure. Mirrors the
/// original conveyor's fixed-size per-peer buffer.
const CHANNEL_CAPACITY: usize = 256;

struct HeapInner {
    n_ranks: usize,
    barrier: Barrier,
    regions: DashMap<(u64, usize), Region>,
    owned: DashMap<(u64, usize), Box<[u8]>>,
    fcollect: DashMap<(u64, usize), Vec<i64>>,
    reduce_bool: DashMap<(u64, usize), bool>,
    reduce_sum: DashMap<(u64, usize), i64>,
    mailboxes: DashMap<(u32, usize), parking_lot::Mutex<std::collections::VecDeque<(usize, Vec<u8>)>>>,
}

/// One logical rank's handle onto the shared in-process heap.
pub struct LocalFleet {
    inner: Arc<HeapInner>,
    rank: usize,
    next_alloc_id: Cell<u64>,
    next_fcollect_id: Cell<u64>,
    next_reduce_id: Cell<u64>,
    next_channel_id: Cell<u32>,
}

// SAFETY: each `LocalFleet` is constructed inside the thread that owns it
// and never migrated; `Send` is required only so it can appear behind the
// generic `SymmetricAllocator: Send` bound shared with `MpiFleet`.
unsafe impl Send for LocalFleet {}

impl LocalFleet {
    /// Spawn `n_ranks` logical ranks as threads, each running `body` with
    /// its own [`LocalFleet`] handle, and collect the results in rank
    /// order. This is the in-process stand-in for an external fleet
    /// launcher.
    pub fn launch<F, R>(n_ranks: usize, body: F) -> Vec<R>
    where
        F: Fn(LocalFleet) -> R + Sync,
        R: Send,
    {
        assert!(n_ranks > 0, "a fleet needs at least one rank");

        let inner = Arc::new(HeapInner {
            n_ranks,
            barrier: Barrier::new(n_ranks),
            regions: DashMap::new(),
            owned: DashMap::new(),
            fcollect: DashMap::new(),
            reduce_bool: DashMap::new(),
            reduce_sum: DashMap::new(),
            mailboxes: DashMap::new(),
        });

        thread::scope(|scope| {
            let handles: Vec<_> = (0..n_ranks)
                .map(|rank| {
                    let inner = Arc::clone(&inner);
                    let body = &body;
                    scope.spawn(move || {
                        let fleet = LocalFleet {
                            inner,
                            rank,
                            next_alloc_id: Cell::new(0),
                            next_fcollect_id: Cell::new(0),
                            next_reduce_id: Cell::new(0),
                            next_channel_id: Cell::new(0),
                        };
                        body(fleet)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().expect("rank thread panicked"))
                .collect()
        })
    }

    fn region(&self, alloc_id: u64, rank: usize) -> dashmap::mapref::one::Ref<'_, (u64, usize), Region> {
        self.inner
            .regions
            .get(&(alloc_id, rank))
            .unwrap_or_else(|| panic!("access to unknown symmetric region (alloc {alloc_id}, rank {rank})"))
    }
}

impl SymmetricAllocator for LocalFleet {
    fn alloc(&self, nbytes: usize) -> Result<SymPtr> {
        let alloc_id = self.next_alloc_id.get();
        self.next_alloc_id.set(alloc_id + 1);

        let mut buf = vec![0u8; nbytes].into_boxed_slice();
        let ptr = buf.as_mut_ptr();

        self.inner.owned.insert((alloc_id, self.rank), buf);
        self.inner
            .regions
            .insert((alloc_id, self.rank), Region { ptr, len: nbytes });

        // Every rank must have published its region before any rank can
        // address it.
        self.inner.barrier.wait();

        Ok(SymPtr { alloc_id, nbytes })
    }

    fn free(&self, ptr: SymPtr) {
        // No rank may still be mid-put/get against this allocation.
        self.inner.barrier.wait();
        self.inner.regions.remove(&(ptr.alloc_id, self.rank));
        self.inner.owned.remove(&(ptr.alloc_id, self.rank));
        self.inner.barrier.wait();
    }

    fn barrier_all(&self) {
        self.inner.barrier.wait();
    }

    fn my_rank(&self) -> usize {
        self.rank
    }

    fn n_ranks(&self) -> usize {
        self.inner.n_ranks
    }

    fn local_base(&self, sym: SymPtr) -> *mut u8 {
        self.region(sym.alloc_id, self.rank).ptr
    }

    unsafe fn put(&self, dst_sym: SymPtr, dst_offset: usize, src: *const u8, nbytes: usize, rank: usize) {
        let region = self.region(dst_sym.alloc_id, rank);
        debug_assert!(dst_offset + nbytes <= region.len, "put out of bounds");
        std::ptr::copy_nonoverlapping(src, region.ptr.add(dst_offset), nbytes);
    }

    unsafe fn get(&self, dst: *mut u8, src_sym: SymPtr, src_offset: usize, nbytes: usize, rank: usize) {
        let region = self.region(src_sym.alloc_id, rank);
        debug_assert!(src_offset + nbytes <= region.len, "get out of bounds");
        std::ptr::copy_nonoverlapping(region.ptr.add(src_offset), dst, nbytes);
    }

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
    ) {
        let region = self.region(dst_sym.alloc_id, rank);
        for i in 0..n_elts {
            let dst_byte_offset = (dst_offset_elts + i * dst_stride) * elt_size;
            debug_assert!(dst_byte_offset + elt_size <= region.len, "iput out of bounds");
            let src_ptr = src.add(i * src_stride * elt_size);
            std::ptr::copy_nonoverlapping(src_ptr, region.ptr.add(dst_byte_offset), elt_size);
        }
    }

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
    ) {
        let region = self.region(src_sym.alloc_id, rank);
        for i in 0..n_elts {
            let src_byte_offset = (src_offset_elts + i * src_stride) * elt_size;
            debug_assert!(src_byte_offset + elt_size <= region.len, "iget out of bounds");
            let dst_ptr = dst.add(i * dst_stride * elt_size);
            std::ptr::copy_nonoverlapping(region.ptr.add(src_byte_offset), dst_ptr, elt_size);
        }
    }

    fn p_i64(&self, dst_sym: SymPtr, offset_elems: usize, value: i64, rank: usize) {
        let bytes = value.to_ne_bytes();
        unsafe {
            self.put(dst_sym, offset_elems * 8, bytes.as_ptr(), 8, rank);
        }
    }

    fn fcollect_i64(&self, local: &[i64]) -> Vec<i64> {
        let call_id = self.next_fcollect_id.get();
        self.next_fcollect_id.set(call_id + 1);

        self.inner.fcollect.insert((call_id, self.rank), local.to_vec());
        self.inner.barrier.wait();

        let mut out = Vec::with_capacity(local.len() * self.inner.n_ranks);
        for r in 0..self.inner.n_ranks {
            let v = self.inner.fcollect.get(&(call_id, r)).expect("fcollect contribution missing");
            out.extend_from_slice(&v);
        }

        self.inner.barrier.wait();
        if self.rank == 0 {
            for r in 0..self.inner.n_ranks {
                self.inner.fcollect.remove(&(call_id, r));
            }
        }

        out
    }

    fn reduce_and_bool(&self, value: bool) -> bool {
        let call_id = self.next_reduce_id.get();
        self.next_reduce_id.set(call_id + 1);

        self.inner.reduce_bool.insert((call_id, self.rank), value);
        self.inner.barrier.wait();

        let result = (0..self.inner.n_ranks)
            .map(|r| *self.inner.reduce_bool.get(&(call_id, r)).expect("reduce contribution missing"))
            .fold(true, |acc, v| acc && v);

        self.inner.barrier.wait();
        if self.rank == 0 {
            for r in 0..self.inner.n_ranks {
                self.inner.reduce_bool.remove(&(call_id, r));
            }
        }

        result
    }

    fn reduce_sum_i64(&self, value: i64) -> i64 {
        let call_id = self.next_reduce_id.get();
        self.next_reduce_id.set(call_id + 1);

        self.inner.reduce_sum.insert((call_id, self.rank), value);
        self.inner.barrier.wait();

        let result = (0..self.inner.n_ranks)
            .map(|r| *self.inner.reduce_sum.get(&(call_id, r)).expect("reduce contribution missing"))
            .sum();

        self.inner.barrier.wait();
        if self.rank == 0 {
            for r in 0..self.inner.n_ranks {
                self.inner.reduce_sum.remove(&(call_id, r));
            }
        }

        result
    }

    fn open_channel(&self) -> u32 {
        let id = self.next_channel_id.get();
        self.next_channel_id.set(id + 1);
        // No publish barrier needed: mailbox slots are created lazily by
        // whichever side (sender or receiver) touches them first, via
        // `DashMap::entry`, which is safe to race on.
        id
    }

    fn try_send_bytes(&self, channel: u32, dst_rank: usize, bytes: &[u8]) -> bool {
        let mailbox = self
            .inner
            .mailboxes
            .entry((channel, dst_rank))
            .or_insert_with(|| parking_lot::Mutex::new(std::collections::VecDeque::new()));
        let mut queue = mailbox.lock();
        if queue.len() >= CHANNEL_CAPACITY {
            return false;
        }
        queue.push_back((self.rank, bytes.to_vec()));
        true
    }

    fn try_recv_bytes(&self, channel: u32) -> Option<(usize, Vec<u8>)> {
        let mailbox = self
            .inner
            .mailboxes
            .entry((channel, self.rank))
            .or_insert_with(|| parking_lot::Mutex::new(std::collections::VecDeque::new()));
        mailbox.lock().pop_front()
    }

    fn close_channel(&self, channel: u32) {
        self.inner.barrier.wait();
        if self.rank == 0 {
            for r in 0..self.inner.n_ranks {
                self.inner.mailboxes.remove(&(channel, r));
            }
        }
        self.inner.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let results = LocalFleet::launch(2, |fleet| {
            let ptr = fleet.alloc(8).unwrap();
            let value: u64 = if fleet.my_rank() == 0 { 0xdead_beef } else { 0 };
            unsafe {
                fleet.put(ptr, 0, value.to_ne_bytes().as_ptr(), 8, 0);
            }
            fleet.barrier_all();
            let mut buf = [0u8; 8];
            unsafe {
                fleet.get(buf.as_mut_ptr(), ptr, 0, 8, 0);
            }
            u64::from_ne_bytes(buf)
        });
        assert_eq!(results, vec![0xdead_beef, 0xdead_beef]);
    }

    #[test]
    fn fcollect_concatenates_in_rank_order() {
        let results = LocalFleet::launch(3, |fleet| fleet.fcollect_i64(&[fleet.my_rank() as i64]));
        for r in results {
            assert_eq!(r, vec![0, 1, 2]);
        }
    }

    #[test]
    fn reduce_sum_adds_every_rank() {
        let results = LocalFleet::launch(4, |fleet| fleet.reduce_sum_i64(fleet.my_rank() as i64 + 1));
        assert_eq!(results, vec![10, 10, 10, 10]);
    }

    #[test]
    fn reduce_and_bool_is_false_if_any_rank_is_false() {
        let results = LocalFleet::launch(3, |fleet| fleet.reduce_and_bool(fleet.my_rank() != 1));
        assert_eq!(results, vec![false, false, false]);
    }
}
