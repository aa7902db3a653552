//! Simulation benchmarks for arena_core.
//!
//! Run with: `cargo bench -p arena_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use arena_core::components::Side;
use arena_core::dispatcher::EventLog;
use arena_core::reconstruct::{Reconstructor, SnapshotPolicy};
use arena_core::simulation::{simulate, SimConfig};
use arena_test_utils::fixtures::{mixed_team, run_recorded};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// A full 4v4 fight with skills, passives and triggers.
pub fn simulation_benchmark(c: &mut Criterion) {
    let config = SimConfig::default().with_seed(17);
    c.bench_function("combat_4v4", |b| {
        b.iter(|| {
            let (result, log) = simulate(
                mixed_team(Side::Player),
                mixed_team(Side::Opponent),
                EventLog::new(),
                black_box(&config),
            )
            .unwrap();
            black_box((result, log.len()))
        })
    });
}

/// Replaying a recorded 4v4 stream with snapshot verification.
pub fn reconstruction_benchmark(c: &mut Criterion) {
    let (_, events) = run_recorded(
        &SimConfig::default().with_seed(17),
        mixed_team(Side::Player),
        mixed_team(Side::Opponent),
    );
    c.bench_function("reconstruct_4v4", |b| {
        b.iter(|| {
            let reconstructor = Reconstructor::replay(SnapshotPolicy::Verify, black_box(&events)).unwrap();
            black_box(reconstructor.processed())
        })
    });
}

criterion_group!(benches, simulation_benchmark, reconstruction_benchmark);
criterion_main!(benches);
