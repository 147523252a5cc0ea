//! End-to-end scenarios from SPEC_FULL.md §8, driven against the in-process
//! `LocalFleet` backend the way the teacher crate drives its own
//! multi-module integration tests against an in-process harness rather than
//! a real cluster.

use std::sync::Arc;

use symsort::allocator::local::LocalFleet;
use symsort::{sort, verify, DistributedArray, RadixParams, ShuffleStrategy, SortElement, SymmetricAllocator};

fn run_sort(n_ranks: usize, per_rank: Vec<Vec<SortElement>>, radix_bits: u32) -> Vec<Vec<SortElement>> {
    let n: usize = per_rank.iter().map(|v| v.len()).sum();
    let per_rank = Arc::new(per_rank);

    LocalFleet::launch(n_ranks, move |fleet| {
        let fleet: Arc<dyn SymmetricAllocator> = Arc::new(fleet);
        let radix = RadixParams::new(radix_bits);
        let mine = per_rank[fleet.my_rank()].clone();
        let (a, b) = sort::sort_into_new_arrays(fleet, n, &mine, &radix, ShuffleStrategy::DirectPut);

        let out = unsafe { a.local_slice().to_vec() };
        drop(a);
        drop(b);
        out
    })
}

/// Scenario 6: R=16, D=4, P=3, N=10, keys spanning the full u64 range.
#[test]
fn scenario_six_wide_key_range_three_ranks() {
    let per_rank = vec![
        vec![
            SortElement::new(0x0000_0000_0000_0001, 0),
            SortElement::new(0xFFFF_FFFF_FFFF_FFFF, 1),
            SortElement::new(0x0000_0000_0001_0000, 2),
            SortElement::new(0x0000_0001_0000_0000, 3),
        ],
        vec![
            SortElement::new(0x8000_0000_0000_0000, 4),
            SortElement::new(0x0000_0000_0000_0000, 5),
            SortElement::new(0x1234_5678_9abc_def0, 6),
        ],
        vec![
            SortElement::new(0x0000_0000_ffff_ffff, 7),
            SortElement::new(0x0000_0000_0000_0002, 8),
            SortElement::new(0x7fff_ffff_ffff_ffff, 9),
        ],
    ];

    let out = run_sort(3, per_rank, 16);
    let n: usize = out.iter().map(|v| v.len()).sum();

    let results = LocalFleet::launch(3, {
        let out = Arc::new(out.clone());
        move |fleet| {
            let fleet: Arc<dyn SymmetricAllocator> = Arc::new(fleet);
            let array = DistributedArray::<SortElement>::create(fleet.clone(), n).unwrap();
            let mine = &out[array.my_rank()];
            unsafe {
                array.local_slice_mut()[..mine.len()].copy_from_slice(mine);
            }
            array.fleet().barrier_all();
            let verdict = verify::check_sorted(&array);
            drop(array);
            verdict
        }
    });
    assert!(results.iter().all(|&v| v), "verifier must report sorted for scenario 6");

    let flat: Vec<SortElement> = out.into_iter().flatten().collect();
    assert!(flat.windows(2).all(|w| w[0].key <= w[1].key));
    let mut vals: Vec<u64> = flat.iter().map(|e| e.val).collect();
    vals.sort();
    assert_eq!(vals, (0..10).collect::<Vec<_>>());
}

/// Boundary: N = 0 is a no-op, verification passes.
#[test]
fn empty_problem_verifies_sorted() {
    let results = LocalFleet::launch(3, |fleet| {
        let fleet: Arc<dyn SymmetricAllocator> = Arc::new(fleet);
        let array = DistributedArray::<SortElement>::create(fleet.clone(), 0).unwrap();
        let verdict = verify::check_sorted(&array);
        drop(array);
        verdict
    });
    assert!(results.iter().all(|&v| v));
}

/// Boundary: N < P leaves some ranks with H = 0; verification must not read
/// past `local_count` on those ranks.
#[test]
fn fewer_records_than_ranks_leaves_some_ranks_empty() {
    let per_rank = vec![vec![SortElement::new(7, 0)], vec![], vec![], vec![]];
    let out = run_sort(4, per_rank, 16);
    assert_eq!(out[0], vec![SortElement::new(7, 0)]);
    assert!(out[1].is_empty());
    assert!(out[2].is_empty());
    assert!(out[3].is_empty());
}
