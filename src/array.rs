//! The distributed array: a symmetric buffer of `C` elements per rank, with
//! the global ↔ `(rank, local)` index map that gives every other component
//! its addressing.
//!
//! Grounded on the original's `DistributedArray<EltType>` template
//! (`localIdxToGlobalIdx`/`globalIdxToLocalIdx`), generalized here over any
//! [`Record`] rather than monomorphized per element type, per SPEC_FULL.md's
//! "Templates over element type" design note.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::allocator::{SymPtr, SymmetricAllocator};
use crate::record::Record;

/// A typed view onto one collective symmetric allocation: `C` elements of
/// `T` per rank, `H ≤ C` of them logically populated on this rank.
pub struct DistributedArray<T: Record> {
    fleet: Arc<dyn SymmetricAllocator>,
    sym: SymPtr,
    /// Total element count across the whole fleet.
    n: usize,
    /// Per-rank capacity: `ceil(N / P)`.
    capacity: usize,
    /// Elements actually populated on this rank: `min(capacity, N - rank*capacity)`, clamped to 0.
    local_count: usize,
    _marker: PhantomData<T>,
}

impl<T: Record> DistributedArray<T> {
    /// Collectively allocate a distributed array of `n` elements of `T`
    /// over `fleet`. Every rank must call this with the same `n`.
    pub fn create(fleet: Arc<dyn SymmetricAllocator>, n: usize) -> crate::error::Result<Self> {
        let p = fleet.n_ranks();
        let capacity = capacity_for(n, p);
        let sym = fleet.alloc(capacity * std::mem::size_of::<T>())?;
        let local_count = local_count_for(n, capacity, fleet.my_rank());

        Ok(Self {
            fleet,
            sym,
            n,
            capacity,
            local_count,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of elements logically populated on this rank (`H`).
    pub fn local_count(&self) -> usize {
        self.local_count
    }

    pub fn my_rank(&self) -> usize {
        self.fleet.my_rank()
    }

    pub fn n_ranks(&self) -> usize {
        self.fleet.n_ranks()
    }

    pub fn sym(&self) -> SymPtr {
        self.sym
    }

    pub fn fleet(&self) -> &Arc<dyn SymmetricAllocator> {
        &self.fleet
    }

    /// `global → (rank, local)`.
    pub fn global_to_local(&self, g: usize) -> (usize, usize) {
        (g / self.capacity, g % self.capacity)
    }

    /// `(rank, local) → global`.
    pub fn local_to_global(&self, rank: usize, local: usize) -> usize {
        rank * self.capacity + local
    }

    /// Read this rank's local slice of `H` populated elements.
    ///
    /// # Safety
    /// The caller must not hold this borrow across a barrier that lets
    /// another rank observe a concurrent write into the same region.
    pub unsafe fn local_slice(&self) -> &[T] {
        let region = self.local_region_ptr();
        std::slice::from_raw_parts(region as *const T, self.local_count)
    }

    /// Mutable access to this rank's full `C`-element local buffer
    /// (including slots beyond `H`, which callers must not treat as
    /// meaningful data).
    ///
    /// # Safety
    /// Same aliasing requirements as [`DistributedArray::local_slice`].
    pub unsafe fn local_slice_mut(&self) -> &mut [T] {
        let region = self.local_region_ptr();
        std::slice::from_raw_parts_mut(region as *mut T, self.capacity)
    }

    unsafe fn local_region_ptr(&self) -> *mut T {
        // The allocator exposes bytes; `get`/`put` are the only sanctioned
        // remote path, but within-rank access to our own region is just a
        // local pointer, which every allocator backend hands out via a
        // zero-offset `get`/raw window view. Local backends may specialize
        // this for performance; both current backends keep the region
        // contiguous starting at byte 0 of the allocation.
        self.fleet.local_base(self.sym) as *mut T
    }

    /// Write one element to global index `g`, wherever it lives.
    ///
    /// # Safety
    /// `g` must be `< capacity * n_ranks()`.
    pub unsafe fn put_global(&self, g: usize, value: &T) {
        let (rank, local) = self.global_to_local(g);
        let offset = local * std::mem::size_of::<T>();
        self.fleet.put(
            self.sym,
            offset,
            value as *const T as *const u8,
            std::mem::size_of::<T>(),
            rank,
        );
    }

    /// Read one element from global index `g`, wherever it lives.
    ///
    /// # Safety
    /// `g` must be `< capacity * n_ranks()`.
    pub unsafe fn get_global(&self, g: usize) -> T {
        let (rank, local) = self.global_to_local(g);
        let offset = local * std::mem::size_of::<T>();
        let mut out = std::mem::MaybeUninit::<T>::uninit();
        self.fleet
            .get(out.as_mut_ptr() as *mut u8, self.sym, offset, std::mem::size_of::<T>(), rank);
        out.assume_init()
    }
}

/// Collectively frees the backing symmetric allocation. Every rank must
/// drop its handle to the same array in the same relative order (the
/// normal case, since every rank runs the same code path), matching the
/// collective discipline `SymmetricAllocator::free` requires.
impl<T: Record> Drop for DistributedArray<T> {
    fn drop(&mut self) {
        self.fleet.free(self.sym);
    }
}

/// `C = ceil(N / P)`.
pub fn capacity_for(n: usize, p: usize) -> usize {
    assert!(p > 0, "a fleet needs at least one rank");
    (n + p - 1) / p
}

/// `H` for a given rank: `min(C, N - rank*C)`, clamped to `0` if `rank*C >= N`.
pub fn local_count_for(n: usize, capacity: usize, rank: usize) -> usize {
    let start = rank * capacity;
    if start >= n {
        0
    } else {
        (n - start).min(capacity)
    }
}
