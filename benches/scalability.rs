//! Scalability benchmarks for the spatial hash and simulation tick
//!
//! Run with: cargo bench --bench scalability

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skirmish_sim::config::SimulationConfig;
use skirmish_sim::game::actors::Player;
use skirmish_sim::game::collision::Rect;
use skirmish_sim::game::entity::EntityId;
use skirmish_sim::game::simulation::Simulation;
use skirmish_sim::game::spatial::SpatialHash;
use skirmish_sim::util::vec2::Vec2;

const WORLD: f64 = 256.0;

/// Grid filled with `count` idle players at random positions
fn populated_grid(count: usize) -> (SpatialHash, Vec<EntityId>) {
    let mut grid = SpatialHash::new(Rect::new(Vec2::ZERO, Vec2::splat(WORLD)), (64, 64))
        .expect("valid grid");
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let ids = (0..count)
        .map(|_| {
            let position = Vec2::new(rng.gen_range(0.0..WORLD), rng.gen_range(0.0..WORLD));
            grid.insert(Box::new(Player::new(position))).expect("fresh id")
        })
        .collect();
    (grid, ids)
}

/// Benchmark bounded-region queries
fn bench_find_near(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_near");
    group.sample_size(50);

    for count in [100, 1000, 5000] {
        let (grid, _) = populated_grid(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("8x8_window", count), &count, |b, _| {
            b.iter(|| black_box(grid.find_near(Vec2::splat(WORLD / 2.0), Vec2::splat(8.0))))
        });
    }
    group.finish();
}

/// Benchmark incremental re-indexing of moving entities
fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_client");
    group.sample_size(50);

    for count in [100, 1000, 5000] {
        let (mut grid, ids) = populated_grid(count);
        let mut offset = 1.0;

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("shift_all", count), &count, |b, _| {
            b.iter(|| {
                offset = -offset;
                for id in &ids {
                    grid.modify(*id, |e| e.body_mut().position.x += offset);
                }
            })
        });
    }
    group.finish();
}

/// Benchmark a full simulation tick (step sweep plus collision pass)
fn bench_full_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_tick");
    group.sample_size(30);

    for count in [50, 200, 800] {
        let config = SimulationConfig {
            world_width: WORLD,
            world_height: WORLD,
            grid_cols: 64,
            grid_rows: 64,
            enemy_count: count,
            seed: Some(1),
            ..Default::default()
        };
        let mut sim = Simulation::from_config(&config).expect("valid config");

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("complete", count), &count, |b, _| {
            b.iter(|| black_box(sim.tick(config.tick_ms)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_find_near, bench_update, bench_full_tick);
criterion_main!(benches);
