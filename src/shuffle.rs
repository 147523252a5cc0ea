//! Global shuffle (SPEC_FULL.md §4.7): the inner loop of the sort. For one
//! digit, determines each local record's global destination slot and writes
//! it there.
//!
//! Factored the way the design notes ask — "factor the shuffle into a
//! 'plan' phase (counts, scan, starts) and a 'deliver' phase parameterized
//! by a delivery strategy" — so [`ShuffleStrategy::DirectPut`] and
//! [`ShuffleStrategy::Conveyor`] share [`plan`] and differ only in
//! [`deliver_direct`] vs [`deliver_aggregated`].

use bytemuck::{Pod, Zeroable};

use crate::aggregator::{Aggregator, Pulled};
use crate::array::DistributedArray;
use crate::count::{publish_counts_aggregated, publish_counts_direct, pull_starts_aggregated, pull_starts_direct};
use crate::record::{RadixParams, Record};
use crate::scan::exclusive_scan;

/// Which realization of the shuffle's deliver phase to use. Both share the
/// same plan phase and must produce byte-identical destination arrays
/// (SPEC_FULL.md §8, property 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleStrategy {
    DirectPut,
    Conveyor,
}

/// `{destination local index, record}`, the wire payload for the
/// aggregated deliver phase.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct Delivery<T: Record> {
    dst_local_idx: u64,
    record: T,
}

/// One digit pass: `globalShuffle(src, dst, digit)`.
pub fn global_shuffle<T: Record>(
    src: &DistributedArray<T>,
    dst: &DistributedArray<T>,
    digit: u32,
    radix: &RadixParams,
    strategy: ShuffleStrategy,
) {
    let fleet = src.fleet().clone();
    let buckets = radix.buckets;

    // Step 1-2: local histogram.
    let mut counts = vec![0i64; buckets];
    let local = unsafe { src.local_slice() };
    for e in local {
        counts[e.bucket(digit, radix)] += 1;
    }

    // Step 3-5: plan phase, shared by both strategies.
    let global_counts = DistributedArray::<i64>::create(fleet.clone(), buckets * fleet.n_ranks())
        .expect("scratch allocation for shuffle global counts");
    let global_starts = DistributedArray::<i64>::create(fleet.clone(), buckets * fleet.n_ranks())
        .expect("scratch allocation for shuffle global starts");

    match strategy {
        ShuffleStrategy::DirectPut => publish_counts_direct(&counts, &global_counts),
        ShuffleStrategy::Conveyor => publish_counts_aggregated(&counts, &global_counts),
    }

    exclusive_scan(&global_counts, &global_starts);

    let mut starts = vec![0i64; buckets];
    match strategy {
        ShuffleStrategy::DirectPut => pull_starts_direct(&global_starts, &mut starts),
        ShuffleStrategy::Conveyor => pull_starts_aggregated(&global_starts, &mut starts),
    }

    drop(global_counts);
    drop(global_starts);

    // Step 6: deliver phase.
    match strategy {
        ShuffleStrategy::DirectPut => deliver_direct(src, dst, digit, radix, &mut starts),
        ShuffleStrategy::Conveyor => deliver_aggregated(src, dst, digit, radix, &mut starts),
    }

    fleet.barrier_all();
}

fn deliver_direct<T: Record>(
    src: &DistributedArray<T>,
    dst: &DistributedArray<T>,
    digit: u32,
    radix: &RadixParams,
    starts: &mut [i64],
) {
    let local = unsafe { src.local_slice() };
    for e in local {
        let b = e.bucket(digit, radix);
        let g = starts[b] as usize;
        starts[b] += 1;
        unsafe {
            dst.put_global(g, e);
        }
    }
}

fn deliver_aggregated<T: Record>(
    src: &DistributedArray<T>,
    dst: &DistributedArray<T>,
    digit: u32,
    radix: &RadixParams,
    starts: &mut [i64],
) {
    let fleet = src.fleet().clone();
    let mut request = Aggregator::<Delivery<T>>::begin(fleet.clone());

    let local = unsafe { src.local_slice() };
    let mut next_idx = 0usize;
    let n_local = local.len();

    loop {
        while next_idx < n_local {
            let e = local[next_idx];
            let b = e.bucket(digit, radix);
            let g = starts[b] as usize;
            let (dst_rank, dst_local) = dst.global_to_local(g);

            let pushed = request.push(
                Delivery {
                    dst_local_idx: dst_local as u64,
                    record: e,
                },
                dst_rank,
            );
            if !pushed {
                break;
            }
            // starts[b]++ only on a successful push, per SPEC_FULL.md §4.7.
            starts[b] += 1;
            next_idx += 1;
        }

        let more = request.advance(next_idx == n_local);

        loop {
            match request.pull() {
                Pulled::Ok(Delivery { dst_local_idx, record }) => unsafe {
                    dst.local_slice_mut()[dst_local_idx as usize] = record;
                },
                Pulled::Empty => break,
            }
        }

        if !more {
            break;
        }
    }

    request.reset();
}
