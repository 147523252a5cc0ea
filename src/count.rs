//! Count/transpose (SPEC_FULL.md §4.4): move a per-rank histogram of `B`
//! bins into the `B×P` global count array, laid out so that row `d` (all
//! ranks' counts for digit value `d`) is contiguous at global indices
//! `[d*P, (d+1)*P)`.
//!
//! Grounded on the original's `copyCountsToGlobalCounts`: the strided-put
//! realization issues one `iput` per contiguous run of bins that land on
//! the same destination rank; the aggregated realization pushes
//! `{dst_local_index, value}` pairs through a request aggregator and drains
//! them into the destination buffer.

use bytemuck::{Pod, Zeroable};

use crate::aggregator::{Aggregator, Pulled};
use crate::array::DistributedArray;

/// `{local index in the destination rank's slice, value}`, the wire record
/// for the aggregated realization.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Pod, Zeroable)]
#[repr(C)]
struct IdxValue {
    local_idx: u64,
    value: i64,
}

/// Strided-put realization: for each contiguous run of bin indices mapping
/// to the same destination rank, issue one `iput` of the whole run.
pub fn publish_counts_direct(local_counts: &[i64], global_counts: &DistributedArray<i64>) {
    let fleet = global_counts.fleet();
    let sym = global_counts.sym();

    let b = local_counts.len();
    let mut i = 0;
    while i < b {
        let g0 = i * fleet.n_ranks() + fleet.my_rank();
        let (dst_rank, dst_local0) = global_counts.global_to_local(g0);

        // Extend the run while consecutive bins keep landing on the same
        // destination rank, i.e. while successive global indices
        // `g = i*P + r` stay within one `C`-sized local partition.
        let mut k = 1;
        while i + k < b {
            let g = (i + k) * fleet.n_ranks() + fleet.my_rank();
            let (rank, _) = global_counts.global_to_local(g);
            if rank != dst_rank {
                break;
            }
            k += 1;
        }

        unsafe {
            fleet.iput(
                sym,
                dst_local0,
                local_counts[i..].as_ptr() as *const u8,
                /* dst_stride */ fleet.n_ranks(),
                /* src_stride */ 1,
                k,
                std::mem::size_of::<i64>(),
                dst_rank,
            );
        }

        i += k;
    }

    fleet.barrier_all();
}

/// Aggregated realization of the same operation, via a request aggregator.
pub fn publish_counts_aggregated(local_counts: &[i64], global_counts: &DistributedArray<i64>) {
    let fleet = global_counts.fleet().clone();
    let n_ranks = fleet.n_ranks();
    let my_rank = fleet.my_rank();
    let mut request = Aggregator::<IdxValue>::begin(fleet.clone());

    let mut next_bin = 0usize;
    let b = local_counts.len();

    loop {
        while next_bin < b {
            let g = next_bin * n_ranks + my_rank;
            let (dst_rank, dst_local) = global_counts.global_to_local(g);
            let pushed = request.push(
                IdxValue {
                    local_idx: dst_local as u64,
                    value: local_counts[next_bin],
                },
                dst_rank,
            );
            if !pushed {
                break;
            }
            next_bin += 1;
        }

        let more = request.advance(next_bin == b);

        loop {
            match request.pull() {
                Pulled::Ok(IdxValue { local_idx, value }) => unsafe {
                    let slice = global_counts.local_slice_mut();
                    slice[local_idx as usize] = value;
                },
                Pulled::Empty => break,
            }
        }

        if !more {
            break;
        }
    }

    request.reset();
    fleet.barrier_all();
}

/// `{row index i, value}`, the request/reply payload for the aggregated
/// reverse transpose.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Pod, Zeroable)]
#[repr(C)]
struct IdxReply {
    row: u64,
    value: i64,
}

/// Reverse transpose (SPEC_FULL.md §4.6), strided-get realization: the
/// mirror image of [`publish_counts_direct`] — for each contiguous run of
/// bins sourced from the same rank, issue one `iget`.
pub fn pull_starts_direct(global_starts: &DistributedArray<i64>, local_starts: &mut [i64]) {
    let fleet = global_starts.fleet();
    let sym = global_starts.sym();

    let b = local_starts.len();
    let mut i = 0;
    while i < b {
        let g0 = i * fleet.n_ranks() + fleet.my_rank();
        let (src_rank, src_local0) = global_starts.global_to_local(g0);

        let mut k = 1;
        while i + k < b {
            let g = (i + k) * fleet.n_ranks() + fleet.my_rank();
            let (rank, _) = global_starts.global_to_local(g);
            if rank != src_rank {
                break;
            }
            k += 1;
        }

        unsafe {
            fleet.iget(
                local_starts[i..].as_mut_ptr() as *mut u8,
                sym,
                src_local0,
                /* dst_stride */ 1,
                /* src_stride */ fleet.n_ranks(),
                k,
                std::mem::size_of::<i64>(),
                src_rank,
            );
        }

        i += k;
    }

    fleet.barrier_all();
}

/// Reverse transpose, request/reply aggregated realization: rank `r` pushes
/// `{row i, local index}` requests to the owning rank through `request`;
/// the owner replies with `{row i, value}` through `reply`. If a reply push
/// is backpressured, the request is `unpull`'d so it is retried on the next
/// iteration rather than dropped.
pub fn pull_starts_aggregated(global_starts: &DistributedArray<i64>, local_starts: &mut [i64]) {
    let fleet = global_starts.fleet().clone();
    let n_ranks = fleet.n_ranks();
    let my_rank = fleet.my_rank();
    let b = local_starts.len();

    let mut request = Aggregator::<IdxReply>::begin(fleet.clone());
    let mut reply = Aggregator::<IdxReply>::begin(fleet.clone());

    let mut next_row = 0usize;
    let mut replies_needed = b;

    loop {
        // Send out requests for rows not yet requested.
        while next_row < b {
            let g = next_row * n_ranks + my_rank;
            let (src_rank, src_local) = global_starts.global_to_local(g);
            let pushed = request.push(
                IdxReply {
                    row: next_row as u64,
                    value: src_local as i64,
                },
                src_rank,
            );
            if !pushed {
                break;
            }
            next_row += 1;
        }

        let requests_more = request.advance(next_row == b);

        // Serve any inbound requests: pull a {row, local_idx} request and
        // push back {row, value}. If the reply is backpressured, unpull the
        // request so it is served again next time around.
        loop {
            let Some((src_rank, req)) = request.apull() else { break };
            let value = unsafe { global_starts.local_slice()[req.value as usize] };
            let replied = reply.push(
                IdxReply {
                    row: req.row,
                    value,
                },
                src_rank,
            );
            if !replied {
                request.unpull();
                break;
            }
        }

        let replies_more = reply.advance(replies_needed == 0);

        // Drain our own inbound replies.
        loop {
            match reply.pull() {
                Pulled::Ok(IdxReply { row, value }) => {
                    local_starts[row as usize] = value;
                    replies_needed -= 1;
                }
                Pulled::Empty => break,
            }
        }

        if !requests_more && !replies_more {
            break;
        }
    }

    request.reset();
    reply.reset();
    fleet.barrier_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::local::LocalFleet;
    use crate::allocator::SymmetricAllocator;
    use std::sync::Arc;

    fn gather_counts(n_ranks: usize, b: usize, per_rank: Vec<Vec<i64>>, aggregated: bool) -> Vec<Vec<i64>> {
        LocalFleet::launch(n_ranks, move |fleet| {
            let fleet: Arc<dyn SymmetricAllocator> = Arc::new(fleet);
            let local_counts = per_rank[fleet.my_rank()].clone();
            let global = DistributedArray::<i64>::create(fleet.clone(), b * n_ranks).unwrap();

            if aggregated {
                publish_counts_aggregated(&local_counts, &global);
            } else {
                publish_counts_direct(&local_counts, &global);
            }

            let out = unsafe { global.local_slice().to_vec() };
            let cap = global.capacity();
            drop(global);
            (out, cap)
        })
        .into_iter()
        .map(|(slice, _cap)| slice)
        .collect()
    }

    #[test]
    fn direct_and_aggregated_agree_on_layout() {
        let n_ranks = 2;
        let b = 3;
        let per_rank = vec![vec![10, 20, 30], vec![1, 2, 3]];

        let direct = gather_counts(n_ranks, b, per_rank.clone(), false);
        let aggregated = gather_counts(n_ranks, b, per_rank.clone(), true);
        assert_eq!(direct, aggregated);

        // GlobalCounts[d*P + r] == per_rank[r][d].
        let capacity = (b * n_ranks + n_ranks - 1) / n_ranks;
        for d in 0..b {
            for r in 0..n_ranks {
                let g = d * n_ranks + r;
                let (rank, local) = (g / capacity, g % capacity);
                assert_eq!(direct[rank][local], per_rank[r][d]);
            }
        }
    }

    #[test]
    fn reverse_transpose_round_trips_through_forward_transpose() {
        let n_ranks = 3;
        let b = 2;
        let per_rank = vec![vec![1, 2], vec![3, 4], vec![5, 6]];
        let per_rank_for_assert = per_rank.clone();

        let results = LocalFleet::launch(n_ranks, move |fleet| {
            let fleet: Arc<dyn SymmetricAllocator> = Arc::new(fleet);
            let local_counts = per_rank[fleet.my_rank()].clone();
            let global = DistributedArray::<i64>::create(fleet.clone(), b * n_ranks).unwrap();

            publish_counts_direct(&local_counts, &global);

            let mut pulled_direct = vec![0i64; b];
            pull_starts_direct(&global, &mut pulled_direct);

            let mut pulled_aggregated = vec![0i64; b];
            pull_starts_aggregated(&global, &mut pulled_aggregated);

            drop(global);
            (pulled_direct, pulled_aggregated)
        });

        for (rank, (direct, aggregated)) in results.into_iter().enumerate() {
            assert_eq!(direct, aggregated);
            assert_eq!(direct, per_rank_for_assert[rank]);
        }
    }
}
