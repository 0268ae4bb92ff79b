//! DST: Tiered Storage
//!
//! Capacity cascades, promotion, compression, maintenance, and fault
//! behavior of the tiered store, driven through `TieredMemoryManager` on a
//! simulated clock.

use std::sync::Arc;
use std::time::Duration;

use convo_memory::config::{EvaluationConfig, PlacementConfig, TierConfig};
use convo_memory::constants::TIME_MS_PER_DAY;
use convo_memory::dst::{FaultConfig, FaultType, SimConfig, SimEnvironment, Simulation};
use convo_memory::entities::{BlockSource, ConversationBlock, MemoryTier};
use convo_memory::evaluation::{HeuristicEvaluator, ScoringPolicy};
use convo_memory::storage::{StorageBackend, TieredMemoryManager, TieredStore};
use convo_memory::MemoryError;

// =============================================================================
// Helpers
// =============================================================================

fn block(env: &SimEnvironment, session: &str, seq: u64, content: &str) -> ConversationBlock {
    ConversationBlock::new(
        session,
        seq,
        content,
        BlockSource::User,
        format!("m{seq}"),
        env.clock.now(),
    )
}

fn manager(env: &SimEnvironment, store: TieredStore) -> Arc<TieredMemoryManager> {
    let policy = ScoringPolicy::from_config(&EvaluationConfig::default());
    let evaluator = Arc::new(HeuristicEvaluator::new(policy, env.time()));
    Arc::new(TieredMemoryManager::new(Arc::new(store), evaluator, env.time()))
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[tokio::test]
async fn test_hot_overflow_demotes_least_recent() {
    let env = Simulation::new(SimConfig::with_seed(42)).build();
    let store = env.create_store(&TierConfig::default(), PlacementConfig::default());
    let manager = manager(&env, store);

    let mut first_id = String::new();
    for seq in 0..101 {
        let b = block(&env, "s1", seq, &format!("message number {seq}"));
        if seq == 0 {
            first_id = b.id.clone();
        }
        manager.store(b, None).await.unwrap();
        env.advance_time_ms(10);
    }

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.hot.count, 100);
    assert_eq!(stats.warm.count, 1);
    assert_eq!(stats.cold.count, 0);
    assert_eq!(stats.total_blocks, 101);
    assert_eq!(stats.counters.demotions, 1);

    let demoted = manager.backend().peek(&first_id).await.unwrap().unwrap();
    assert_eq!(demoted.memory_tier(), MemoryTier::Warm);
}

#[tokio::test]
async fn test_full_cascade_evicts_from_cold() {
    let env = Simulation::new(SimConfig::with_seed(7)).build();
    let tiers = TierConfig::default().with_capacities(2, 2, 2);
    let store = env.create_store(&tiers, PlacementConfig::default());
    let manager = manager(&env, store);

    let mut ids = Vec::new();
    for seq in 0..7 {
        let b = block(&env, "s1", seq, &format!("block {seq}"));
        ids.push(b.id.clone());
        manager.store(b, None).await.unwrap();
    }

    let stats = manager.stats().await.unwrap();
    assert_eq!((stats.hot.count, stats.warm.count, stats.cold.count), (2, 2, 2));
    assert_eq!(stats.counters.evictions, 1);

    // The oldest block fell out of Cold entirely.
    assert!(manager.backend().peek(&ids[0]).await.unwrap().is_none());
    let err = manager.retrieve(&ids[0]).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_placement_follows_score() {
    let env = Simulation::new(SimConfig::with_seed(3)).build();
    let store = env.create_store(&TierConfig::default(), PlacementConfig::default());
    let manager = manager(&env, store);

    let cases = [
        (Some(0.9), MemoryTier::Hot),
        (Some(0.5), MemoryTier::Warm),
        (Some(0.2), MemoryTier::Cold),
        (None, MemoryTier::Hot),
    ];
    for (seq, (score, expected)) in (0u64..).zip(cases) {
        let mut b = block(&env, "s1", seq, "scored content");
        b.relevance_score = score;
        let receipt = manager.store(b, None).await.unwrap();
        assert_eq!(receipt.tier, expected, "score {score:?}");
    }
}

// =============================================================================
// Promotion and Compression
// =============================================================================

#[tokio::test]
async fn test_warm_block_promotes_on_repeated_access() {
    let env = Simulation::new(SimConfig::with_seed(11)).build();
    let store = env.create_store(&TierConfig::default(), PlacementConfig::default());
    let manager = manager(&env, store);

    let b = block(&env, "s1", 0, "frequently needed detail");
    let id = b.id.clone();
    manager.store(b, Some(MemoryTier::Warm)).await.unwrap();

    for _ in 0..5 {
        let got = manager.retrieve(&id).await.unwrap();
        assert_eq!(got.memory_tier(), MemoryTier::Warm);
        env.advance_time_ms(100);
    }
    let got = manager.retrieve(&id).await.unwrap();
    assert_eq!(got.memory_tier(), MemoryTier::Hot);
    assert_eq!(got.access_count(), 6);

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.counters.promotions, 1);
}

#[tokio::test]
async fn test_large_warm_block_is_compressed_and_restored() {
    let env = Simulation::new(SimConfig::with_seed(5)).build();
    let store = env.create_store(&TierConfig::default(), PlacementConfig::default());
    let manager = manager(&env, store);

    let content = "the deployment pipeline retries flaky integration jobs. ".repeat(60);
    let b = block(&env, "s1", 0, &content);
    let id = b.id.clone();
    manager.store(b, Some(MemoryTier::Warm)).await.unwrap();

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.counters.compressed, 1);
    assert!(stats.counters.bytes_saved > 0);

    let restored = manager.retrieve(&id).await.unwrap();
    assert_eq!(restored.content, content);
    assert!(restored.compressed_size.is_some());
}

#[tokio::test]
async fn test_cold_keeps_summary_only() {
    let env = Simulation::new(SimConfig::with_seed(6)).build();
    let store = env.create_store(&TierConfig::default(), PlacementConfig::default());
    let manager = manager(&env, store);

    let content = "a".repeat(500);
    let b = block(&env, "s1", 0, &content);
    let id = b.id.clone();
    manager.store(b, Some(MemoryTier::Cold)).await.unwrap();

    let got = manager.retrieve(&id).await.unwrap();
    assert_eq!(got.memory_tier(), MemoryTier::Cold);
    assert!(got.content.len() < content.len());
}

// =============================================================================
// Maintenance
// =============================================================================

#[tokio::test]
async fn test_optimize_ages_blocks_down() {
    let env = Simulation::new(SimConfig::with_seed(21)).build();
    let store = env.create_store(&TierConfig::default(), PlacementConfig::default());
    let manager = manager(&env, store);

    let hot = block(&env, "s1", 0, "hot and old");
    let hot_id = hot.id.clone();
    manager.store(hot, Some(MemoryTier::Hot)).await.unwrap();

    env.advance_time_ms(2 * TIME_MS_PER_DAY);
    let report = manager.optimize().await.unwrap();
    assert_eq!(report.demoted, 1);
    assert_eq!(
        manager.backend().peek(&hot_id).await.unwrap().unwrap().memory_tier(),
        MemoryTier::Warm
    );

    env.advance_time_ms(2 * TIME_MS_PER_DAY);
    let report = manager.optimize().await.unwrap();
    assert_eq!(report.demoted, 1);
    assert_eq!(
        manager.backend().peek(&hot_id).await.unwrap().unwrap().memory_tier(),
        MemoryTier::Cold
    );
}

#[tokio::test]
async fn test_optimize_removes_low_scores_only() {
    let env = Simulation::new(SimConfig::with_seed(22)).build();
    let store = env.create_store(&TierConfig::default(), PlacementConfig::default());
    let manager = manager(&env, store);

    let mut low = block(&env, "s1", 0, "noise");
    low.relevance_score = Some(0.1);
    let low_id = low.id.clone();
    manager.store(low, Some(MemoryTier::Hot)).await.unwrap();

    let unscored = block(&env, "s1", 1, "unscored");
    let unscored_id = unscored.id.clone();
    manager.store(unscored, None).await.unwrap();

    let report = manager.optimize().await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(manager.backend().peek(&low_id).await.unwrap().is_none());
    assert!(manager.backend().peek(&unscored_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_maintenance_loop_runs_on_simulated_time() {
    let env = Simulation::new(SimConfig::with_seed(23)).build();
    let store = env.create_store(&TierConfig::default(), PlacementConfig::default());
    let manager = manager(&env, store);

    let b = block(&env, "s1", 0, "will age out of hot");
    let id = b.id.clone();
    manager.store(b, Some(MemoryTier::Hot)).await.unwrap();

    let handle = manager.start_maintenance(Duration::from_secs(60));
    // Let the loop register its first sleep before time moves.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    env.advance_time_ms(2 * TIME_MS_PER_DAY);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(
        manager.backend().peek(&id).await.unwrap().unwrap().memory_tier(),
        MemoryTier::Warm
    );
    handle.shutdown().await;
}

// =============================================================================
// Fault Injection
// =============================================================================

#[tokio::test]
async fn test_write_fault_leaves_store_untouched() {
    let env = Simulation::new(SimConfig::with_seed(31))
        .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 1.0))
        .build();
    let store = env.create_store(&TierConfig::default(), PlacementConfig::default());
    let manager = manager(&env, store);

    let err = manager.store(block(&env, "s1", 0, "lost"), None).await.unwrap_err();
    assert!(matches!(err, MemoryError::Storage(_)));
    assert!(err.is_transient());

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.total_blocks, 0);
    assert_eq!(stats.counters.stored, 0);
}

#[tokio::test]
async fn test_invariants_hold_under_storage_faults() {
    let seed = SimConfig::from_env_or_random().seed();
    let env = Simulation::new(SimConfig::with_seed(seed))
        .with_storage_faults(0.2)
        .build();
    let tiers = TierConfig::default().with_capacities(5, 5, 5);
    let store = Arc::new(env.create_store(&tiers, PlacementConfig::default()));

    let mut rng = env.rng.clone();
    let mut ids: Vec<String> = Vec::new();
    for step in 0..300u64 {
        match rng.next_usize(0, 3) {
            0 | 1 => {
                let mut b = block(&env, "s1", step, &rng.next_text(8));
                b.relevance_score = Some(rng.next_float());
                let id = b.id.clone();
                if store.store(b, None).await.is_ok() {
                    ids.push(id);
                }
            }
            2 if !ids.is_empty() => {
                let id = rng.choose(&ids).clone();
                let _ = store.retrieve(&id).await;
            }
            _ if !ids.is_empty() => {
                let id = rng.choose(&ids).clone();
                let _ = store.delete(&id).await;
            }
            _ => {}
        }
        env.advance_time_ms(rng.next_u64_in(1, 1000));

        if let Err(violation) = store.check_invariants() {
            panic!("seed {seed} step {step}: {violation}");
        }
    }
    assert!(store.len() <= 15);
    assert!(env.faults.total_injections() > 0, "seed {seed}");
}
