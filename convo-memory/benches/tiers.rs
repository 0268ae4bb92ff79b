//! Tier and Evaluation Benchmarks
//!
//! Store/retrieve across tiers, Warm compression, and heuristic scoring.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use convo_memory::config::{EvaluationConfig, PlacementConfig, TierConfig};
use convo_memory::dst::{Clock, SimClock};
use convo_memory::entities::{BlockSource, ConversationBlock, MemoryTier};
use convo_memory::evaluation::{
    EvaluationMetadata, HeuristicEvaluator, RelevanceEvaluator, ScoringPolicy,
};
use convo_memory::storage::{StorageBackend, TieredStore};
use tokio::runtime::Runtime;

fn clock() -> Clock {
    Clock::Simulated(SimClock::at_ms(1_700_000_000_000))
}

fn create_blocks(count: u64, content: &str) -> Vec<ConversationBlock> {
    let now = clock().now();
    (0..count)
        .map(|seq| {
            ConversationBlock::new(
                "bench",
                seq,
                format!("{content} #{seq}"),
                BlockSource::User,
                format!("m{seq}"),
                now,
            )
        })
        .collect()
}

// =============================================================================
// Storage Benchmarks
// =============================================================================

fn bench_store_with_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("tiers/store_cascade");
    group.measurement_time(Duration::from_secs(5));

    for hot_capacity in [10usize, 100, 1_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(hot_capacity),
            hot_capacity,
            |b, &hot_capacity| {
                let rt = Runtime::new().unwrap();
                let tiers = TierConfig::default().with_capacities(
                    hot_capacity,
                    hot_capacity * 2,
                    hot_capacity * 4,
                );
                let store = TieredStore::new(&tiers, PlacementConfig::default(), clock());
                let blocks = create_blocks(10_000, "a message that overflows hot");
                let mut next = 0;

                b.to_async(&rt).iter(|| {
                    let block = blocks[next % blocks.len()].clone();
                    next += 1;
                    let store = &store;
                    async move {
                        black_box(store.store(block, Some(MemoryTier::Hot)).await.unwrap());
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_retrieve_by_tier(c: &mut Criterion) {
    let mut group = c.benchmark_group("tiers/retrieve");

    for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
        group.bench_function(tier.as_str(), |b| {
            let rt = Runtime::new().unwrap();
            // Promotion past 5 accesses would move Warm blocks; keep it out of reach.
            let tiers = TierConfig {
                warm_promotion_access_count: u64::MAX,
                ..TierConfig::default()
            };
            let store = TieredStore::new(&tiers, PlacementConfig::default(), clock());
            let block = create_blocks(1, &"warm payload ".repeat(200)).remove(0);
            let id = block.id.clone();
            rt.block_on(async {
                store.store(block, Some(tier)).await.unwrap();
            });

            b.to_async(&rt).iter(|| async {
                black_box(store.retrieve(&id).await.unwrap());
            });
        });
    }
    group.finish();
}

// =============================================================================
// Evaluation Benchmarks
// =============================================================================

fn bench_heuristic_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation/heuristic_batch");
    group.measurement_time(Duration::from_secs(5));

    for size in [10u64, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rt = Runtime::new().unwrap();
            let evaluator =
                HeuristicEvaluator::new(ScoringPolicy::from_config(&EvaluationConfig::default()), clock());
            let blocks = create_blocks(
                size,
                "How should we shard the events table? Postgres 16 supports declarative partitioning",
            );
            let metadata = EvaluationMetadata::default().with_goal("shard the events table");

            b.to_async(&rt).iter(|| async {
                black_box(evaluator.batch_evaluate(&blocks, &metadata).await);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_store_with_cascade,
    bench_retrieve_by_tier,
    bench_heuristic_batch,
);
criterion_main!(benches);
