//! Integration Tests for `ConversationMemory`
//!
//! End-to-end workflows through the public API:
//! - Ingest, scoring, and tier placement
//! - Chain reads, rollback, and session removal
//! - Configuration loading
//! - Events

use convo_memory::config::{EvaluationConfig, TierConfig};
use convo_memory::dst::{SimConfig, SimEnvironment, Simulation};
use convo_memory::evaluation::{EvaluationMetadata, EvaluatorKind};
use convo_memory::{
    ConversationMemory, IngestOptions, MemoryConfig, MemoryError, MemoryEvent, MemoryTier, Message,
};

fn sim_env(seed: u64) -> SimEnvironment {
    Simulation::new(SimConfig::with_seed(seed)).build()
}

async fn ingest_text(
    env: &SimEnvironment,
    memory: &ConversationMemory,
    session: &str,
    text: &str,
) -> String {
    let result = memory
        .ingest(session, Message::user(text, env.clock.now()), IngestOptions::new())
        .await
        .unwrap();
    env.advance_time_ms(500);
    result.message_id
}

// =============================================================================
// Ingest Tests
// =============================================================================

#[tokio::test]
async fn test_ingest_with_evaluation_places_by_score() {
    let env = sim_env(42);
    let memory = env.create_memory(MemoryConfig::default()).unwrap();

    ingest_text(&env, &memory, "s1", "We are migrating the billing service to Postgres 16.").await;
    let result = memory
        .ingest(
            "s1",
            Message::assistant(
                "The migration needs a maintenance window on 2024-03-02 and a schema freeze.",
                env.clock.now(),
            ),
            IngestOptions::new()
                .with_evaluation()
                .with_goal("plan the billing database migration"),
        )
        .await
        .unwrap();

    let score = result.score.expect("evaluation requested");
    assert!((0.0..=1.0).contains(&score.overall_score));
    assert_eq!(result.block.relevance_score, Some(score.overall_score));

    let placement = memory.config().placement;
    let expected = if score.overall_score > placement.promotion_threshold {
        MemoryTier::Hot
    } else if score.overall_score > placement.relevance_threshold {
        MemoryTier::Warm
    } else {
        MemoryTier::Cold
    };
    assert_eq!(result.tier, expected);
    assert_eq!(memory.retrieve(&result.block.id).await.unwrap().memory_tier(), expected);
}

#[tokio::test]
async fn test_ingest_explicit_tier_wins() {
    let env = sim_env(1);
    let memory = env.create_memory(MemoryConfig::default()).unwrap();

    let result = memory
        .ingest(
            "s1",
            Message::system("You are a deployment assistant.", env.clock.now()),
            IngestOptions::new().with_evaluation().with_tier(MemoryTier::Cold),
        )
        .await
        .unwrap();
    assert_eq!(result.tier, MemoryTier::Cold);
}

#[tokio::test]
async fn test_ingest_rejects_bad_input() {
    let env = sim_env(2);
    let memory = env.create_memory(MemoryConfig::default()).unwrap();

    let err = memory
        .ingest("s1", Message::user("   ", env.clock.now()), IngestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Validation { .. }));

    let err = memory
        .ingest("", Message::user("hi", env.clock.now()), IngestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Validation { .. }));

    let message = Message::user("hello", env.clock.now()).with_id("fixed");
    memory.ingest("s1", message.clone(), IngestOptions::new()).await.unwrap();
    let err = memory.ingest("s1", message, IngestOptions::new()).await.unwrap_err();
    assert!(matches!(err, MemoryError::Chain(_)));
    assert_eq!(memory.messages("s1").len(), 1);
}

#[tokio::test]
async fn test_sequences_are_per_session() {
    let env = sim_env(3);
    let memory = env.create_memory(MemoryConfig::default()).unwrap();

    for text in ["a1", "a2", "a3"] {
        ingest_text(&env, &memory, "a", text).await;
    }
    ingest_text(&env, &memory, "b", "b1").await;

    let a: Vec<u64> = memory
        .session_blocks("a")
        .await
        .unwrap()
        .iter()
        .map(|b| b.sequence_number)
        .collect();
    assert_eq!(a, vec![0, 1, 2]);
    assert_eq!(memory.session_blocks("b").await.unwrap()[0].sequence_number, 0);

    let mut sessions = memory.sessions().await.unwrap();
    sessions.sort();
    assert_eq!(sessions, vec!["a", "b"]);
}

// =============================================================================
// Chain Workflow Tests
// =============================================================================

#[tokio::test]
async fn test_context_window_keeps_newest_messages() {
    let env = sim_env(4);
    let memory = env.create_memory(MemoryConfig::default()).unwrap();

    for i in 0..5 {
        ingest_text(&env, &memory, "s1", &format!("{i}{}", "x".repeat(39))).await;
    }

    // 25 tokens at 4 chars per token fit two 40-char messages.
    let window = memory.context_window("s1", 25);
    assert_eq!(window.len(), 2);
    assert!(window[0].content.starts_with('3'));
    assert!(window[1].content.starts_with('4'));
}

#[tokio::test]
async fn test_rollback_drops_messages_and_blocks() {
    let env = sim_env(5);
    let memory = env.create_memory(MemoryConfig::default()).unwrap();

    let first = ingest_text(&env, &memory, "s1", "keep me").await;
    ingest_text(&env, &memory, "s1", "drop one").await;
    ingest_text(&env, &memory, "s1", "drop two").await;

    assert_eq!(memory.rollback_to("s1", &first).await.unwrap(), 2);
    assert_eq!(memory.messages("s1").len(), 1);

    let blocks = memory.session_blocks("s1").await.unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].message_id, first);

    let err = memory.rollback_to("s1", "missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_forget_session_is_isolated() {
    let env = sim_env(6);
    let memory = env.create_memory(MemoryConfig::default()).unwrap();

    ingest_text(&env, &memory, "gone", "one").await;
    ingest_text(&env, &memory, "gone", "two").await;
    ingest_text(&env, &memory, "kept", "three").await;

    assert_eq!(memory.forget_session("gone").await.unwrap(), 2);
    assert!(memory.messages("gone").is_empty());
    assert_eq!(memory.messages("kept").len(), 1);
    assert_eq!(memory.sessions().await.unwrap(), vec!["kept"]);

    // Sequence numbering restarts for a forgotten session.
    ingest_text(&env, &memory, "gone", "again").await;
    assert_eq!(memory.session_blocks("gone").await.unwrap()[0].sequence_number, 0);
}

// =============================================================================
// Scoring Tests
// =============================================================================

#[tokio::test]
async fn test_score_block_does_not_touch_access() {
    let env = sim_env(7);
    let config = MemoryConfig::default()
        .with_evaluation(EvaluationConfig::default().with_kind(EvaluatorKind::Heuristic));
    let memory = env.create_memory(config).unwrap();

    ingest_text(&env, &memory, "s1", "What port does the metrics exporter use?").await;
    let result = memory
        .ingest(
            "s1",
            Message::assistant("The exporter listens on port 9464.", env.clock.now()),
            IngestOptions::new(),
        )
        .await
        .unwrap();

    let score = memory
        .score_block(&result.block.id, &EvaluationMetadata::default())
        .await
        .unwrap();
    assert!((0.0..=1.0).contains(&score.overall_score));
    assert!(!score.explanation.is_empty());

    let block = memory.session_blocks("s1").await.unwrap().pop().unwrap();
    assert_eq!(block.access_count(), 0);

    let err = memory
        .score_block("nope", &EvaluationMetadata::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_same_seed_same_scores() {
    async fn run(seed: u64) -> Vec<f64> {
        let env = sim_env(seed);
        let memory = env.create_memory(MemoryConfig::default()).unwrap();
        let mut scores = Vec::new();
        for text in [
            "Can we cache the pricing API responses?",
            "Yes, a 60 second TTL keeps prices fresh enough.",
            "ok",
        ] {
            let result = memory
                .ingest(
                    "s1",
                    Message::user(text, env.clock.now()),
                    IngestOptions::new().with_evaluation(),
                )
                .await
                .unwrap();
            scores.push(result.score.unwrap().overall_score);
            env.advance_time_ms(1_000);
        }
        scores
    }

    assert_eq!(run(77).await, run(77).await);
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[tokio::test]
async fn test_config_from_json_drives_tiers() {
    let config = MemoryConfig::from_json(
        r#"{
            "tiers": { "hot_capacity": 2, "warm_capacity": 2, "cold_capacity": 2 },
            "evaluation": { "kind": "heuristic" }
        }"#,
    )
    .unwrap();
    assert_eq!(config.tiers, TierConfig::default().with_capacities(2, 2, 2));

    let env = sim_env(8);
    let memory = env.create_memory(config).unwrap();
    for i in 0..3 {
        ingest_text(&env, &memory, "s1", &format!("turn {i}")).await;
    }

    let stats = memory.stats().await.unwrap();
    assert_eq!(stats.hot.count, 2);
    assert_eq!(stats.warm.count, 1);
    assert_eq!(stats.hot.capacity, 2);
}

#[test]
fn test_config_from_json_rejects_invalid() {
    assert!(MemoryConfig::from_json("{ not json").is_err());
    assert!(MemoryConfig::from_json(r#"{ "tiers": { "hot_capacity": 0 } }"#).is_err());
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.json");
    std::fs::write(&path, r#"{ "maintenance_interval_ms": 1000 }"#).unwrap();

    let config = MemoryConfig::from_json_file(&path).unwrap();
    assert_eq!(config.maintenance_interval_ms, 1000);
    assert!(MemoryConfig::from_json_file(dir.path().join("missing.json")).is_err());
}

// =============================================================================
// Event Tests
// =============================================================================

#[tokio::test]
async fn test_events_follow_operations() {
    let env = sim_env(9);
    let config = MemoryConfig::default().with_tiers(TierConfig::default().with_capacities(1, 10, 10));
    let memory = env.create_memory(config).unwrap();
    let mut events = memory.subscribe().unwrap();

    let first = ingest_text(&env, &memory, "s1", "first").await;
    ingest_text(&env, &memory, "s1", "second").await;
    memory.rollback_to("s1", &first).await.unwrap();
    tokio::task::yield_now().await;

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            MemoryEvent::BlockStored { .. } => "stored",
            MemoryEvent::TierChanged { .. } => "tier",
            MemoryEvent::BlockDeleted { .. } => "deleted",
            MemoryEvent::Optimized { .. } => "optimized",
            MemoryEvent::Correction { .. } => "correction",
        });
    }
    assert_eq!(kinds, vec!["stored", "stored", "tier", "deleted"]);
}
