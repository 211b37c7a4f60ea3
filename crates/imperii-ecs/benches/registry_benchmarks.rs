//! Registry hot-path benchmarks.
//!
//! Covers entity creation, component add/get, two-phase destruction, and a
//! full statistics recompute at a few registry sizes.
//!
//! Run with: `cargo bench --bench registry_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use imperii_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Population(u64);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A registry with `entity_count` entities, each holding a Position and a
/// Population.
fn populated_registry(entity_count: usize) -> (EntityRegistry, Vec<EntityHandle>) {
    let registry = EntityRegistry::new();
    let handles: Vec<_> = (0..entity_count)
        .map(|i| {
            let e = registry.create_entity();
            registry
                .add_component(
                    e,
                    Position {
                        x: i as f64,
                        y: 0.0,
                    },
                )
                .unwrap();
            registry.add_component(e, Population(i as u64)).unwrap();
            e
        })
        .collect();
    (registry, handles)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_entities");
    for &count in &[100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let registry = EntityRegistry::new();
                for _ in 0..count {
                    black_box(registry.create_entity());
                }
                registry
            });
        });
    }
    group.finish();
}

fn bench_add_get(c: &mut Criterion) {
    let (registry, handles) = populated_registry(1_000);

    c.bench_function("get_component_1k", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for &e in &handles {
                if let Some(pop) = registry.get_component::<Population>(e) {
                    sum += pop.0;
                }
            }
            black_box(sum)
        });
    });

    c.bench_function("add_component_replace_1k", |b| {
        b.iter(|| {
            for (i, &e) in handles.iter().enumerate() {
                registry.add_component(e, Population(i as u64)).unwrap();
            }
        });
    });
}

fn bench_destroy(c: &mut Criterion) {
    c.bench_function("destroy_1k_with_two_components", |b| {
        b.iter_batched(
            || populated_registry(1_000),
            |(registry, handles)| {
                for e in handles {
                    black_box(registry.destroy_entity(e));
                }
                registry
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics_recompute");
    for &count in &[1_000usize, 10_000] {
        let (registry, _) = populated_registry(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(registry.refresh_statistics()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_create,
    bench_add_get,
    bench_destroy,
    bench_statistics
);
criterion_main!(benches);
