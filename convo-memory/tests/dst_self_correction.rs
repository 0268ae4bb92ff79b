//! DST: Self-Correction
//!
//! The correction loop end to end: blocks ingested through
//! `ConversationMemory`, scored by a keyword evaluator, removed or repaired by
//! `SimLLM`, with repairs mirrored into the message chain. Time only moves
//! when the test advances the simulated clock.

use std::sync::Arc;

use async_trait::async_trait;
use convo_memory::config::CorrectionConfig;
use convo_memory::correction::{CorrectionKind, CorrectionScoring};
use convo_memory::dst::{SimConfig, SimEnvironment, Simulation};
use convo_memory::entities::{ConversationBlock, Message};
use convo_memory::evaluation::{
    Decision, EvaluationMetadata, FactorScores, RelevanceEvaluator, RelevanceScore,
};
use convo_memory::{ConversationMemory, IngestOptions, MemoryConfig, MemoryError, MemoryEvent};

// =============================================================================
// Helpers
// =============================================================================

/// Scores by marker words: NOISE is removed, VAGUE needs review.
#[derive(Debug)]
struct KeywordEvaluator;

#[async_trait]
impl RelevanceEvaluator for KeywordEvaluator {
    async fn evaluate(
        &self,
        block: &ConversationBlock,
        _context: &[ConversationBlock],
        _metadata: &EvaluationMetadata,
    ) -> RelevanceScore {
        let (overall, decision) = if block.content.contains("NOISE") {
            (0.2, Decision::Remove)
        } else if block.content.contains("VAGUE") {
            (0.5, Decision::Review)
        } else {
            (0.9, Decision::Keep)
        };
        RelevanceScore {
            overall_score: overall,
            factors: FactorScores {
                semantic_alignment: overall,
                temporal_relevance: overall,
                goal_contribution: overall,
                information_quality: overall / 2.0,
                factual_consistency: overall,
            },
            decision,
            explanation: format!("keyword {overall:.2}"),
        }
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

fn memory(env: &SimEnvironment, correction: CorrectionConfig) -> ConversationMemory {
    ConversationMemory::builder()
        .with_config(MemoryConfig::default().with_correction(correction))
        .with_clock(env.time())
        .with_provider(Arc::new(env.provider()))
        .with_evaluator(Arc::new(KeywordEvaluator))
        .with_fault_injector(Arc::clone(&env.faults))
        .build()
        .unwrap()
}

/// Ingest user/assistant turns; returns their message ids.
async fn converse(env: &SimEnvironment, memory: &ConversationMemory, turns: &[&str]) -> Vec<String> {
    let mut ids = Vec::new();
    for (i, text) in turns.iter().enumerate() {
        let message = if i % 2 == 0 {
            Message::user(*text, env.clock.now())
        } else {
            Message::assistant(*text, env.clock.now())
        };
        let result = memory.ingest("s1", message, IngestOptions::new()).await.unwrap();
        ids.push(result.message_id);
        env.advance_time_ms(1_000);
    }
    ids
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

const TURNS: [&str; 4] = [
    "How do I rotate the deploy key?",
    "NOISE lol ok",
    "Run the rotate command in the admin console.",
    "VAGUE it depends",
];

// =============================================================================
// Forced Cycles
// =============================================================================

#[tokio::test]
async fn test_force_correction_removes_and_repairs() {
    let sim = Simulation::new(SimConfig::with_seed(42));

    sim.run(|env| async move {
        let memory = memory(&env, CorrectionConfig::default());
        let ids = converse(&env, &memory, &TURNS).await;

        let applied = memory.force_correction("s1").await?;
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].kind, CorrectionKind::Removal);
        assert_eq!(applied[1].kind, CorrectionKind::Improvement);

        let replacement_id = applied[1].replacement_id().unwrap().to_string();
        assert!(replacement_id.ends_with("_improved"));
        let replacement = memory.retrieve(&replacement_id).await?;
        assert!(replacement.content.starts_with("VAGUE it depends"));
        assert_eq!(replacement.parent_blocks, vec![applied[1].original_id().to_string()]);
        assert_eq!(replacement.metadata.get("improved").map(String::as_str), Some("true"));

        // Noise gone, vague turn swapped for a correction.
        let messages: Vec<String> = memory.messages("s1").into_iter().map(|m| m.id).collect();
        assert_eq!(
            messages,
            vec![ids[0].clone(), ids[2].clone(), format!("{}_improved", ids[3])]
        );
        let corrected = memory.chain().get(&format!("{}_improved", ids[3])).unwrap();
        assert!(corrected.is_correction());

        assert_eq!(memory.session_blocks("s1").await?.len(), 3);
        assert_eq!(memory.correction_history(10).len(), 2);
        Ok::<(), MemoryError>(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_cap_limits_actions_per_cycle() {
    let sim = Simulation::new(SimConfig::with_seed(7));

    sim.run(|env| async move {
        let memory = memory(&env, CorrectionConfig::default().with_max_corrections_per_cycle(2));
        converse(&env, &memory, &["NOISE a", "NOISE b", "NOISE c", "NOISE d", "NOISE e"]).await;

        assert_eq!(memory.force_correction("s1").await?.len(), 2);
        assert_eq!(memory.session_blocks("s1").await?.len(), 3);
        assert_eq!(memory.force_correction("s1").await?.len(), 2);
        assert_eq!(memory.force_correction("s1").await?.len(), 1);
        assert!(memory.session_blocks("s1").await?.is_empty());
        assert!(memory.messages("s1").is_empty());
        Ok::<(), MemoryError>(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_optimistic_boost_scores_replacement() {
    let sim = Simulation::new(SimConfig::with_seed(8));

    sim.run(|env| async move {
        let config = CorrectionConfig::default().with_scoring(CorrectionScoring::OptimisticBoost);
        let memory = memory(&env, config);
        converse(&env, &memory, &["VAGUE maybe"]).await;

        let applied = memory.force_correction("s1").await?;
        let replacement = memory.retrieve(applied[0].replacement_id().unwrap()).await?;
        let score = replacement.relevance_score.unwrap();
        assert!((score - 0.75).abs() < 1e-9, "got {score}");
        Ok::<(), MemoryError>(())
    })
    .await
    .unwrap();
}

// =============================================================================
// Faults
// =============================================================================

#[tokio::test]
async fn test_llm_outage_still_removes_noise() {
    let sim = Simulation::new(SimConfig::with_seed(99)).with_llm_faults(1.0);

    sim.run(|env| async move {
        let memory = memory(&env, CorrectionConfig::default());
        let ids = converse(&env, &memory, &TURNS).await;

        let applied = memory.force_correction("s1").await?;
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].kind, CorrectionKind::Removal);

        // The vague turn is untouched.
        let messages: Vec<String> = memory.messages("s1").into_iter().map(|m| m.id).collect();
        assert_eq!(messages, vec![ids[0].clone(), ids[2].clone(), ids[3].clone()]);
        assert!(env.faults.total_injections() >= 1);
        Ok::<(), MemoryError>(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_auto_correct_off_only_removes() {
    let sim = Simulation::new(SimConfig::with_seed(5));

    sim.run(|env| async move {
        let memory = memory(&env, CorrectionConfig::default().without_auto_correct());
        converse(&env, &memory, &TURNS).await;

        let applied = memory.force_correction("s1").await?;
        assert!(applied.iter().all(|e| e.kind == CorrectionKind::Removal));
        assert_eq!(applied.len(), 1);
        Ok::<(), MemoryError>(())
    })
    .await
    .unwrap();
}

// =============================================================================
// Background Loop
// =============================================================================

#[tokio::test]
async fn test_loop_corrects_on_interval() {
    let env = Simulation::new(SimConfig::with_seed(1234)).build();
    let memory = memory(&env, CorrectionConfig::default().with_interval_ms(60_000));
    let mut events = memory.subscribe().unwrap();
    converse(&env, &memory, &TURNS).await;

    memory.start();
    assert!(memory.is_running());
    settle().await;

    // Nothing happens before the interval elapses.
    env.advance_time_ms(59_000);
    settle().await;
    assert!(memory.correction_history(10).is_empty());

    env.advance_time_ms(1_000);
    settle().await;
    assert_eq!(memory.correction_history(10).len(), 2);

    memory.shutdown().await;
    assert!(!memory.is_running());

    let mut corrections = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, MemoryEvent::Correction { .. }) {
            corrections += 1;
        }
    }
    assert_eq!(corrections, 2);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let env = Simulation::new(SimConfig::with_seed(2)).build();
    let memory = memory(&env, CorrectionConfig::default());

    memory.shutdown().await;
    memory.start();
    memory.start();
    settle().await;
    memory.shutdown().await;
    memory.shutdown().await;
    assert!(!memory.is_running());
}
