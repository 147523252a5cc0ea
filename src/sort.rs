//! Sort driver (SPEC_FULL.md §4.8): orchestrates `D` digit passes of
//! [`crate::shuffle::global_shuffle`], alternating the two distributed
//! arrays between source and destination.
//!
//! Grounded on the original's `mySort`: `for digit in (0..D).step_by(2) {
//! globalShuffle(A, B, digit); globalShuffle(B, A, digit+1) }`.

use std::sync::Arc;

use crate::allocator::SymmetricAllocator;
use crate::array::DistributedArray;
use crate::record::{RadixParams, Record};
use crate::shuffle::{global_shuffle, ShuffleStrategy};

/// Sorts `a` in place (in the distributed-array sense: by the end, `a`
/// holds the globally sorted sequence) using `b` as scratch space. Both
/// arrays must share the same shape. Requires `radix.digits` to be even.
pub fn sort<T: Record>(
    a: &DistributedArray<T>,
    b: &DistributedArray<T>,
    radix: &RadixParams,
    strategy: ShuffleStrategy,
) {
    assert_eq!(
        radix.digits % 2,
        0,
        "the sort driver alternates array roles in pairs and requires an even digit count"
    );

    let mut digit = 0u32;
    while digit < radix.digits {
        global_shuffle(a, b, digit, radix, strategy);
        global_shuffle(b, a, digit + 1, radix, strategy);
        digit += 2;
    }
}

/// Convenience wrapper: allocate both distributed arrays, populate `a` from
/// `local_records` (padded with zeroed slots up to capacity), sort, and
/// return the final sorted local slice together with the two arrays'
/// handles so the caller can free them.
pub fn sort_into_new_arrays<T: Record>(
    fleet: Arc<dyn SymmetricAllocator>,
    n: usize,
    local_records: &[T],
    radix: &RadixParams,
    strategy: ShuffleStrategy,
) -> (DistributedArray<T>, DistributedArray<T>) {
    let a = DistributedArray::<T>::create(fleet.clone(), n).expect("symmetric allocation for array A");
    let b = DistributedArray::<T>::create(fleet, n).expect("symmetric allocation for array B");

    unsafe {
        a.local_slice_mut()[..local_records.len()].copy_from_slice(local_records);
    }
    a.fleet().barrier_all();

    sort(&a, &b, radix, strategy);

    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::local::LocalFleet;
    use crate::record::SortElement;

    fn run_sort(
        n_ranks: usize,
        per_rank: Vec<Vec<SortElement>>,
        radix_bits: u32,
        strategy: ShuffleStrategy,
    ) -> Vec<Vec<SortElement>> {
        let n: usize = per_rank.iter().map(|v| v.len()).sum();
        let per_rank = Arc::new(per_rank);

        LocalFleet::launch(n_ranks, move |fleet| {
            let fleet: Arc<dyn SymmetricAllocator> = Arc::new(fleet);
            let radix = RadixParams::new(radix_bits);
            let mine = per_rank[fleet.my_rank()].clone();
            let (a, b) = sort_into_new_arrays(fleet, n, &mine, &radix, strategy);

            let out = unsafe { a.local_slice().to_vec() };
            drop(a);
            drop(b);
            out
        })
    }

    // Scenario 1: P=1, N=4.
    #[test]
    fn scenario_single_rank() {
        let per_rank = vec![vec![
            SortElement::new(5, 0),
            SortElement::new(1, 1),
            SortElement::new(4, 2),
            SortElement::new(2, 3),
        ]];
        let out = run_sort(1, per_rank, 16, ShuffleStrategy::DirectPut);
        assert_eq!(
            out[0],
            vec![
                SortElement::new(1, 1),
                SortElement::new(2, 3),
                SortElement::new(4, 2),
                SortElement::new(5, 0),
            ]
        );
    }

    // Scenario 2: P=2, N=4, evenly split.
    #[test]
    fn scenario_two_ranks_even_split() {
        let per_rank = vec![
            vec![SortElement::new(3, 0), SortElement::new(1, 1)],
            vec![SortElement::new(4, 2), SortElement::new(2, 3)],
        ];
        let out = run_sort(2, per_rank, 16, ShuffleStrategy::DirectPut);
        assert_eq!(out[0], vec![SortElement::new(1, 1), SortElement::new(2, 3)]);
        assert_eq!(out[1], vec![SortElement::new(3, 0), SortElement::new(4, 2)]);
    }

    // Scenario 3: P=2, N=3, uneven split (rank 1 has H=1 < C=2).
    #[test]
    fn scenario_two_ranks_uneven_split() {
        let per_rank = vec![
            vec![SortElement::new(2, 0), SortElement::new(2, 1)],
            vec![SortElement::new(1, 2)],
        ];
        let out = run_sort(2, per_rank, 16, ShuffleStrategy::DirectPut);
        assert_eq!(out[0], vec![SortElement::new(1, 2), SortElement::new(2, 0)]);
        assert_eq!(out[1][0], SortElement::new(2, 1));
    }

    // Scenario 4: P=4, N=8, reverse-sorted input.
    #[test]
    fn scenario_four_ranks_reverse_sorted() {
        let per_rank = vec![
            vec![SortElement::new(7, 0), SortElement::new(6, 1)],
            vec![SortElement::new(5, 2), SortElement::new(4, 3)],
            vec![SortElement::new(3, 4), SortElement::new(2, 5)],
            vec![SortElement::new(1, 6), SortElement::new(0, 7)],
        ];
        let out = run_sort(4, per_rank, 16, ShuffleStrategy::DirectPut);
        let mut flat: Vec<SortElement> = out.into_iter().flatten().collect();
        assert!(flat.windows(2).all(|w| w[0].key <= w[1].key));
        let mut vals: Vec<u64> = flat.iter().map(|e| e.val).collect();
        vals.sort();
        assert_eq!(vals, (0..8).collect::<Vec<_>>());
    }

    // Scenario 5: all keys identical.
    #[test]
    fn scenario_all_keys_identical() {
        let per_rank = vec![
            vec![SortElement::new(0xDEAD_BEEF, 0), SortElement::new(0xDEAD_BEEF, 1)],
            vec![SortElement::new(0xDEAD_BEEF, 2), SortElement::new(0xDEAD_BEEF, 3)],
        ];
        let out = run_sort(2, per_rank, 16, ShuffleStrategy::DirectPut);
        let flat: Vec<SortElement> = out.into_iter().flatten().collect();
        assert!(flat.iter().all(|e| e.key == 0xDEAD_BEEF));
        let mut vals: Vec<u64> = flat.iter().map(|e| e.val).collect();
        vals.sort();
        assert_eq!(vals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn conveyor_strategy_matches_direct_put() {
        let per_rank = vec![
            vec![SortElement::new(9, 0), SortElement::new(1, 1), SortElement::new(5, 2)],
            vec![SortElement::new(3, 3), SortElement::new(7, 4)],
        ];
        let direct = run_sort(2, per_rank.clone(), 16, ShuffleStrategy::DirectPut);
        let conveyor = run_sort(2, per_rank, 16, ShuffleStrategy::Conveyor);
        assert_eq!(direct, conveyor);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let out = run_sort(2, vec![vec![], vec![]], 16, ShuffleStrategy::DirectPut);
        assert!(out[0].is_empty());
        assert!(out[1].is_empty());
    }
}
