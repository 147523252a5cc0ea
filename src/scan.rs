//! Distributed exclusive scan (SPEC_FULL.md §4.5): `Dst[g] = sum_{g' < g}
//! Src[g']` over a distributed `i64` array, computed via a rank-0 gather of
//! per-rank totals, a local prefix sum on rank 0, and a scatter of the
//! resulting per-rank starting offsets back out.
//!
//! Grounded on the original's `exclusiveScan`: scalar `shmem_int64_p` in
//! both directions rather than a collective, since only rank 0 touches the
//! cross-rank totals array.

use crate::array::DistributedArray;

/// Computes `dst = exclusive_scan(src)` in place into `dst`'s local slice,
/// given `src`'s already-populated local slice. Both arrays must share the
/// same shape (same `N`, `C`, `P`).
pub fn exclusive_scan(src: &DistributedArray<i64>, dst: &DistributedArray<i64>) {
    let fleet = src.fleet().clone();
    let rank = fleet.my_rank();
    let n_ranks = fleet.n_ranks();

    let my_total: i64 = unsafe { src.local_slice().iter().sum() };

    // One scalar per rank: a distributed array of `n_ranks` elements has
    // capacity exactly 1 per rank, so global index `r` always lands on
    // rank `r`'s own single cell — the per-rank-totals buffer the original
    // keeps on rank 0.
    let totals = DistributedArray::<i64>::create(fleet.clone(), n_ranks)
        .expect("scratch allocation for exclusive scan totals");

    // Step 2: every rank writes its total into rank 0's per-rank-totals
    // buffer (here: position `rank` of `totals`, which happens to live on
    // rank `rank` itself thanks to the 1-per-rank capacity).
    unsafe {
        totals.put_global(rank, &my_total);
    }
    fleet.barrier_all();

    // Step 3: rank 0 turns the totals into exclusive prefix sums and
    // scatters them back by scalar put.
    if rank == 0 {
        let all: Vec<i64> = (0..n_ranks).map(|r| unsafe { totals.get_global(r) }).collect();
        let mut running = 0i64;
        let mut starts = Vec::with_capacity(n_ranks);
        for t in &all {
            starts.push(running);
            running += t;
        }
        for (r, start) in starts.into_iter().enumerate() {
            unsafe {
                totals.put_global(r, &start);
            }
        }
    }
    fleet.barrier_all();

    // Step 4: each rank seeds its local prefix sum with the global start it
    // received, then overwrites its local slice with the real per-element
    // scan.
    let my_start = unsafe { totals.get_global(rank) };
    fleet.barrier_all();
    drop(totals);

    let local = unsafe { src.local_slice() };
    let mut running = my_start;
    let mut scanned = Vec::with_capacity(local.len());
    for &v in local {
        scanned.push(running);
        running += v;
    }

    unsafe {
        let out = dst.local_slice_mut();
        out[..scanned.len()].copy_from_slice(&scanned);
    }
    fleet.barrier_all();
}
