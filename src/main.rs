//! CLI entry point: generate `--n` random records on an in-process fleet,
//! sort them, optionally print samples, optionally verify, and report
//! timing the way the original's `main()` does (SPEC_FULL.md §6).
//!
//! The fleet itself is the in-process [`symsort::LocalFleet`] emulation:
//! this binary is the single-machine demonstration harness, matching the
//! original's `--n`/`--print`/`--verify` CLI surface without depending on
//! an external MPI launcher. A real distributed run links against
//! [`symsort::MpiFleet`] instead and is driven by `mpirun`, not by this
//! binary directly (SPEC_FULL.md §6, "Environment / launch").

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use symsort::{
    config::ShuffleBackend, sort, verify, DistributedArray, RadixParams, ShuffleStrategy, SortConfig, SortElement,
    SymmetricAllocator,
};

/// Number of logical ranks this single-machine demonstration emulates.
/// A real multi-process run sizes this from the MPI launcher instead.
const DEMO_FLEET_SIZE: usize = 4;

#[tokio::main]
async fn main() {
    symsort::init_tracing();

    // Usage errors are reported and exit non-zero directly (SPEC_FULL.md
    // §7: "Usage error ... reported once on rank 0 and fatal"); anything
    // past argument parsing propagates through `anyhow` at this outermost
    // edge, the way the teacher's `main.rs` threads `Result<(), Box<dyn
    // std::error::Error>>` out of its own entry point.
    let exit_code = match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn try_main() -> anyhow::Result<i32> {
    let config = SortConfig::parse(std::env::args().skip(1))?;
    Ok(run(config))
}

fn run(config: SortConfig) -> i32 {
    info!(rank = 0, "fleet size: {DEMO_FLEET_SIZE}");
    info!(rank = 0, "problem size: {}", config.n);

    let radix = RadixParams::new(config.radix_bits);
    let strategy = match config.shuffle_backend {
        ShuffleBackend::DirectPut => ShuffleStrategy::DirectPut,
        ShuffleBackend::Conveyor => ShuffleStrategy::Conveyor,
    };

    let gen_start = Instant::now();
    let per_rank_records = generate_records(config.n, DEMO_FLEET_SIZE);
    info!(rank = 0, "generation time: {:?}", gen_start.elapsed());

    let results = symsort::LocalFleet::launch(DEMO_FLEET_SIZE, {
        let per_rank_records = Arc::new(per_rank_records);
        move |fleet| {
            let fleet: Arc<dyn SymmetricAllocator> = Arc::new(fleet);
            let mine = &per_rank_records[fleet.my_rank()];

            let a = DistributedArray::<SortElement>::create(fleet.clone(), config.n)
                .expect("symmetric allocation for array A");
            let b = DistributedArray::<SortElement>::create(fleet.clone(), config.n)
                .expect("symmetric allocation for array B");

            unsafe {
                a.local_slice_mut()[..mine.len()].copy_from_slice(mine);
            }
            fleet.barrier_all();

            if config.print && fleet.my_rank() == 0 {
                print_sample("source", unsafe { a.local_slice() });
            }

            if fleet.my_rank() == 0 {
                info!(rank = 0, "Sorting");
            }
            let sort_start = Instant::now();
            sort::sort(&a, &b, &radix, strategy);
            let sort_time = sort_start.elapsed();

            let verdict = if config.verify {
                Some(verify::check_sorted(&a))
            } else {
                None
            };

            if config.print && fleet.my_rank() == 0 {
                print_sample("result", unsafe { a.local_slice() });
            }

            let energy = symsort::energy::read_energy_joules(&fleet);

            drop(a);
            drop(b);

            (sort_time, verdict, energy)
        }
    });

    // Every rank ran the same sort; the timing and verdict are the same
    // fleet-wide modulo scheduling noise, so rank 0's result speaks for all.
    let (sort_time, verdict, energy) = results.into_iter().next().expect("fleet has at least one rank");

    let throughput_m_elems_per_s = if sort_time.as_secs_f64() > 0.0 {
        config.n as f64 / sort_time.as_secs_f64() / 1_000_000.0
    } else {
        0.0
    };
    info!(rank = 0, "sort time: {sort_time:?}");
    info!(rank = 0, "throughput: {throughput_m_elems_per_s:.3} M elements / s");

    if let Some(joules) = energy {
        eprintln!("Energy: {joules}");
    }

    match verdict {
        Some(true) => {
            info!(rank = 0, "Array is sorted");
            0
        }
        Some(false) => {
            info!(rank = 0, "Array is NOT sorted");
            1
        }
        None => 0,
    }
}

fn generate_records(n: usize, n_ranks: usize) -> Vec<Vec<SortElement>> {
    (0..n_ranks)
        .map(|rank| {
            let capacity = symsort::array::capacity_for(n, n_ranks);
            let local_count = symsort::array::local_count_for(n, capacity, rank);
            let mut rng = StdRng::seed_from_u64(rank as u64);
            (0..local_count)
                .map(|i| {
                    let global_idx = rank * capacity + i;
                    SortElement::new(rng.gen(), global_idx as u64)
                })
                .collect()
        })
        .collect()
}

fn print_sample(label: &str, records: &[SortElement]) {
    let sample: Vec<_> = records.iter().take(8).collect();
    println!("{label} sample (first {} of {}): {:?}", sample.len(), records.len(), sample);
}
