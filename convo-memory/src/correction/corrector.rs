//! `SelfCorrector` - Background Analyze and Correct Loop
//!
//! `TigerStyle`: Every failure is caught at the narrowest scope. A provider
//! error skips one repair, a storage error skips one action, a failed session
//! is logged and the sweep moves on, and a failed sweep backs off before the
//! next one. Nothing here propagates to the loop's owner.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::history::CorrectionHistory;
use super::prompt::repair_request;
use super::{CorrectionEntry, CorrectionKind, CorrectionScoring};
use crate::config::CorrectionConfig;
use crate::constants::{
    CORRECTION_REPAIR_NEIGHBORS_COUNT, CORRECTION_REPLACEMENT_ID_SUFFIX,
    CORRECTION_SCORE_BOOST_FACTOR,
};
use crate::entities::{ConversationBlock, MemoryTier, Message, MessageChain};
use crate::error::MemoryResult;
use crate::evaluation::{neighborhood, Decision, EvaluationMetadata, RelevanceScore};
use crate::events::{EventSink, MemoryEvent, NullSink};
use crate::llm::LLMProvider;
use crate::storage::TieredMemoryManager;

/// A block that scored below the review threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    /// The block as analyzed
    pub block: ConversationBlock,
    /// Its score in conversation context
    pub score: RelevanceScore,
}

#[derive(Debug)]
struct LoopTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Autonomous remover and repairer of degraded blocks.
#[derive(Debug)]
pub struct SelfCorrector {
    manager: Arc<TieredMemoryManager>,
    provider: Option<Arc<dyn LLMProvider>>,
    chain: Option<Arc<MessageChain>>,
    events: Arc<dyn EventSink>,
    config: CorrectionConfig,
    history: Mutex<CorrectionHistory>,
    task: Mutex<Option<LoopTask>>,
}

impl SelfCorrector {
    /// Create a corrector over `manager`. Without a provider, Review
    /// decisions are left alone.
    ///
    /// # Panics
    /// Panics if the window, action cap, or history capacity is zero.
    #[must_use]
    pub fn new(manager: Arc<TieredMemoryManager>, config: CorrectionConfig) -> Self {
        assert!(config.window > 0, "correction window must be positive");
        assert!(
            config.max_corrections_per_cycle > 0,
            "max corrections per cycle must be positive"
        );

        Self {
            manager,
            provider: None,
            chain: None,
            events: Arc::new(NullSink),
            history: Mutex::new(CorrectionHistory::new(config.history_capacity)),
            config,
            task: Mutex::new(None),
        }
    }

    /// Repair Review blocks through `provider`.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Mirror corrections into `chain`.
    #[must_use]
    pub fn with_chain(mut self, chain: Arc<MessageChain>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Publish correction events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the background loop. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::warn!("correction loop already running");
            return false;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let corrector = Arc::clone(self);
        let handle = tokio::spawn(async move { corrector.run(child).await });
        *task = Some(LoopTask { token, handle });

        tracing::info!(
            interval_ms = self.config.interval_ms,
            auto_correct = self.config.auto_correct,
            review_threshold = self.config.review_threshold,
            "correction loop started"
        );
        true
    }

    /// Stop the loop, waiting for an in-flight cycle to finish.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };

        task.token.cancel();
        if let Err(e) = task.handle.await {
            tracing::error!(error = %e, "correction loop panicked");
        }
        tracing::info!("correction loop stopped");
    }

    /// Whether the background loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let clock = self.manager.clock().clone();
        let interval = Duration::from_millis(self.config.interval_ms);
        let backoff = Duration::from_millis(self.config.backoff_ms);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                () = clock.sleep(interval) => {}
            }

            if let Err(e) = self.sweep().await {
                tracing::error!(error = %e, backoff_ms = self.config.backoff_ms, "correction sweep failed");
                tokio::select! {
                    () = token.cancelled() => break,
                    () = clock.sleep(backoff) => {}
                }
            }
        }
    }

    /// One cycle over every session. Returns the number of actions applied.
    ///
    /// # Errors
    /// Only if the session listing itself fails; per-session failures are
    /// logged and skipped.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> MemoryResult<usize> {
        let sessions = self.manager.sessions().await?;
        let mut applied = 0;

        for session_id in &sessions {
            match self.force_correction(session_id).await {
                Ok(entries) if !entries.is_empty() => {
                    tracing::info!(session_id = %session_id, count = entries.len(), "applied corrections");
                    applied += entries.len();
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "session correction failed");
                }
            }
        }
        Ok(applied)
    }

    // =========================================================================
    // Analyze / Correct
    // =========================================================================

    /// Score the most recent `window` blocks of a session and return those
    /// below the review threshold, in sequence order.
    ///
    /// # Errors
    /// `MemoryError::Storage` if the session cannot be read.
    pub async fn analyze(&self, session_id: &str, window: usize) -> MemoryResult<Vec<Problem>> {
        assert!(window > 0, "analysis window must be positive");

        let blocks = self.manager.session_blocks(session_id, Some(window)).await?;
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let scores = self
            .manager
            .evaluator()
            .batch_evaluate(&blocks, &EvaluationMetadata::default())
            .await;

        let problems: Vec<Problem> = blocks
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| score.overall_score < self.config.review_threshold)
            .map(|(block, score)| Problem { block, score })
            .collect();

        tracing::debug!(session_id, problems = problems.len(), "analyzed session");
        Ok(problems)
    }

    /// Apply up to the per-cycle cap of actions, in input order.
    ///
    /// Remove decisions delete the block. Review decisions are repaired when
    /// auto-correction is on and a provider is attached. Failed actions are
    /// skipped and do not count toward the cap.
    pub async fn correct(&self, session_id: &str, problems: &[Problem]) -> Vec<CorrectionEntry> {
        let mut applied = Vec::new();

        for problem in problems {
            if applied.len() >= self.config.max_corrections_per_cycle {
                break;
            }

            let outcome = match problem.score.decision {
                Decision::Remove => self.remove(session_id, problem).await,
                Decision::Review if self.config.auto_correct => {
                    self.improve(session_id, problem).await
                }
                _ => continue,
            };

            match outcome {
                Ok(Some(entry)) => {
                    self.record(&entry).await;
                    applied.push(entry);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(block_id = %problem.block.id, error = %e, "correction skipped");
                }
            }
        }
        applied
    }

    /// Run analyze and correct for one session now.
    ///
    /// # Errors
    /// `MemoryError::Storage` if the session cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn force_correction(&self, session_id: &str) -> MemoryResult<Vec<CorrectionEntry>> {
        let problems = self.analyze(session_id, self.config.window).await?;
        if problems.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.correct(session_id, &problems).await)
    }

    /// The last `limit` corrections, oldest first.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<CorrectionEntry> {
        self.history.lock().recent(limit)
    }

    // =========================================================================
    // Actions
    // =========================================================================

    async fn remove(
        &self,
        session_id: &str,
        problem: &Problem,
    ) -> MemoryResult<Option<CorrectionEntry>> {
        let block = &problem.block;
        if !self.manager.delete(&block.id, &problem.score.explanation).await? {
            tracing::debug!(block_id = %block.id, "block already gone");
            return Ok(None);
        }

        if let Some(chain) = &self.chain {
            if !chain.remove_message(&block.message_id) {
                tracing::debug!(message_id = %block.message_id, "no chain message to remove");
            }
        }

        tracing::info!(
            block_id = %block.id,
            score = problem.score.overall_score,
            "removed irrelevant block"
        );
        Ok(Some(self.entry(
            CorrectionKind::Removal,
            vec![block.id.clone()],
            session_id,
            &problem.score.explanation,
        )))
    }

    async fn improve(
        &self,
        session_id: &str,
        problem: &Problem,
    ) -> MemoryResult<Option<CorrectionEntry>> {
        let Some(provider) = &self.provider else {
            tracing::debug!(block_id = %problem.block.id, "no provider, review left as is");
            return Ok(None);
        };
        let original = &problem.block;
        let reason = &problem.score.explanation;

        let blocks = self.manager.session_blocks(session_id, None).await?;
        let Some(index) = blocks.iter().position(|b| b.id == original.id) else {
            tracing::debug!(block_id = %original.id, "block already gone");
            return Ok(None);
        };
        let context = neighborhood(&blocks, index, CORRECTION_REPAIR_NEIGHBORS_COUNT);

        let request = repair_request(original, &problem.score, &context);
        let content = match provider.complete(&request).await {
            Ok(response) => response.content.trim().to_string(),
            Err(e) => {
                tracing::warn!(block_id = %original.id, error = %e, "repair failed");
                return Ok(None);
            }
        };
        if content.is_empty() {
            tracing::warn!(block_id = %original.id, "repair returned empty content");
            return Ok(None);
        }

        let replacement = self
            .replacement(original, &problem.score, content, &context)
            .await;
        let replacement_id = replacement.id.clone();
        let replacement_content = replacement.content.clone();

        // Fresh rewrites start Hot; a low re-score must not archive them.
        self.manager.store(replacement, Some(MemoryTier::Hot)).await?;
        if let Err(e) = self.manager.delete(&original.id, "replaced by correction").await {
            if let Err(undo) = self.manager.delete(&replacement_id, "correction rolled back").await {
                tracing::error!(block_id = %replacement_id, error = %undo, "rollback failed");
            }
            return Err(e);
        }

        if let Some(chain) = &self.chain {
            self.replace_in_chain(chain, session_id, original, replacement_content, reason);
        }

        tracing::info!(original_id = %original.id, new_id = %replacement_id, "improved block");
        Ok(Some(self.entry(
            CorrectionKind::Improvement,
            vec![original.id.clone(), replacement_id],
            session_id,
            reason,
        )))
    }

    async fn replacement(
        &self,
        original: &ConversationBlock,
        score: &RelevanceScore,
        content: String,
        context: &[ConversationBlock],
    ) -> ConversationBlock {
        let now = self.manager.clock().now();
        let mut block = ConversationBlock::new(
            original.session_id.clone(),
            original.sequence_number,
            content,
            original.source,
            format!("{}{CORRECTION_REPLACEMENT_ID_SUFFIX}", original.message_id),
            now,
        )
        .with_id(format!("{}{CORRECTION_REPLACEMENT_ID_SUFFIX}", original.id))
        .with_retention_priority(original.retention_priority)
        .with_metadata("improved", "true")
        .with_metadata("original_content", original.content.clone())
        .with_metadata("improvement_reason", score.explanation.clone());

        block.content_type.clone_from(&original.content_type);
        block.tool_name.clone_from(&original.tool_name);
        block.parent_blocks = vec![original.id.clone()];
        block.correction_history.clone_from(&original.correction_history);
        block.add_correction(score.explanation.clone(), "improved", now);

        let relevance = match self.config.scoring {
            CorrectionScoring::Reevaluate => {
                self.manager
                    .evaluator()
                    .evaluate(&block, context, &EvaluationMetadata::default())
                    .await
                    .overall_score
            }
            CorrectionScoring::OptimisticBoost => {
                score.overall_score * CORRECTION_SCORE_BOOST_FACTOR
            }
        };
        block.with_relevance_score(relevance)
    }

    fn replace_in_chain(
        &self,
        chain: &MessageChain,
        session_id: &str,
        original: &ConversationBlock,
        content: String,
        reason: &str,
    ) {
        let Some(message) = chain.get(&original.message_id) else {
            tracing::debug!(message_id = %original.message_id, "no chain message to replace");
            return;
        };

        // Keeps the chain's timestamps non-decreasing.
        let correction = Message::correction_of(&message, content, reason, message.timestamp)
            .with_id(format!("{}{CORRECTION_REPLACEMENT_ID_SUFFIX}", message.id));
        if let Err(e) = chain.replace_message(session_id, &message.id, correction) {
            tracing::warn!(message_id = %message.id, error = %e, "chain replace failed");
        }
    }

    fn entry(
        &self,
        kind: CorrectionKind,
        block_ids: Vec<String>,
        session_id: &str,
        reason: &str,
    ) -> CorrectionEntry {
        CorrectionEntry {
            kind,
            block_ids,
            session_id: session_id.to_string(),
            reason: reason.to_string(),
            timestamp: self.manager.clock().now(),
        }
    }

    async fn record(&self, entry: &CorrectionEntry) {
        self.history.lock().push(entry.clone());
        self.events
            .publish(MemoryEvent::Correction {
                action: entry.kind.as_str().to_string(),
                block_ids: entry.block_ids.clone(),
                session_id: entry.session_id.clone(),
                reason: entry.reason.clone(),
                timestamp: entry.timestamp,
            })
            .await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::config::{PlacementConfig, TierConfig};
    use crate::dst::{
        Clock, DeterministicRng, FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType,
        SimClock, SimLLM,
    };
    use crate::entities::{BlockSource, MessageRole};
    use crate::evaluation::{FactorScores, RelevanceEvaluator};
    use crate::events::BroadcastSink;
    use crate::llm::SimLLMProvider;
    use crate::storage::{StorageBackend, TieredStore};

    const T0_MS: u64 = 1_700_000_000_000;

    /// Scores blocks from a fixed table; unknown ids score 0.9 / Keep.
    #[derive(Debug, Default)]
    struct ScriptedEvaluator {
        scores: HashMap<String, (f64, Decision)>,
    }

    impl ScriptedEvaluator {
        fn with(mut self, id: &str, overall: f64, decision: Decision) -> Self {
            self.scores.insert(id.to_string(), (overall, decision));
            self
        }
    }

    #[async_trait]
    impl RelevanceEvaluator for ScriptedEvaluator {
        async fn evaluate(
            &self,
            block: &ConversationBlock,
            _context: &[ConversationBlock],
            _metadata: &EvaluationMetadata,
        ) -> RelevanceScore {
            let (overall, decision) = self
                .scores
                .get(&block.id)
                .copied()
                .unwrap_or((0.9, Decision::Keep));
            RelevanceScore {
                overall_score: overall,
                factors: FactorScores {
                    semantic_alignment: overall,
                    temporal_relevance: overall,
                    goal_contribution: overall / 2.0,
                    information_quality: overall,
                    factual_consistency: overall,
                },
                decision,
                explanation: format!("scripted {overall:.2}"),
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn manager(clock: &SimClock, evaluator: ScriptedEvaluator) -> Arc<TieredMemoryManager> {
        let clock = Clock::Simulated(clock.clone());
        let store = TieredStore::new(&TierConfig::default(), PlacementConfig::default(), clock.clone());
        Arc::new(TieredMemoryManager::new(Arc::new(store), Arc::new(evaluator), clock))
    }

    async fn seed(manager: &TieredMemoryManager, clock: &SimClock, count: u64) {
        for seq in 0..count {
            let block = ConversationBlock::new(
                "s1",
                seq,
                format!("message number {seq} about the deployment pipeline"),
                if seq % 2 == 0 { BlockSource::User } else { BlockSource::Agent },
                format!("m{seq}"),
                clock.now(),
            )
            .with_id(format!("b{seq}"));
            manager.store(block, None).await.unwrap();
        }
    }

    fn provider() -> Arc<dyn LLMProvider> {
        Arc::new(SimLLMProvider::with_seed(7))
    }

    #[tokio::test]
    async fn test_analyze_returns_only_low_scoring_block() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(&clock, ScriptedEvaluator::default().with("b4", 0.3, Decision::Remove));
        seed(&mgr, &clock, 10).await;

        let corrector = SelfCorrector::new(mgr, CorrectionConfig::default());
        let problems = corrector.analyze("s1", 10).await.unwrap();

        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].block.id, "b4");
        assert!((problems[0].score.overall_score - 0.3).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_analyze_only_looks_at_window() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(&clock, ScriptedEvaluator::default().with("b2", 0.1, Decision::Remove));
        seed(&mgr, &clock, 15).await;

        let corrector = SelfCorrector::new(mgr, CorrectionConfig::default());
        assert!(corrector.analyze("s1", 10).await.unwrap().is_empty());
        assert_eq!(corrector.analyze("s1", 15).await.unwrap().len(), 1);
        assert!(corrector.analyze("unknown", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_correct_respects_cap() {
        let clock = SimClock::at_ms(T0_MS);
        let mut evaluator = ScriptedEvaluator::default();
        for seq in 0..10 {
            evaluator = evaluator.with(&format!("b{seq}"), 0.1, Decision::Remove);
        }
        let mgr = manager(&clock, evaluator);
        seed(&mgr, &clock, 10).await;

        let corrector = SelfCorrector::new(Arc::clone(&mgr), CorrectionConfig::default());
        let problems = corrector.analyze("s1", 10).await.unwrap();
        assert_eq!(problems.len(), 10);

        let applied = corrector.correct("s1", &problems).await;
        assert_eq!(applied.len(), 3);
        assert!(applied.iter().all(|e| e.kind == CorrectionKind::Removal));
        assert_eq!(mgr.list_blocks(None, Some("s1")).await.unwrap().len(), 7);
        assert_eq!(corrector.history(100).len(), 3);
    }

    #[tokio::test]
    async fn test_review_block_is_replaced() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(&clock, ScriptedEvaluator::default().with("b1", 0.5, Decision::Review));
        seed(&mgr, &clock, 4).await;
        let sink = Arc::new(BroadcastSink::new(16));
        let mut events = sink.subscribe();

        let corrector = SelfCorrector::new(Arc::clone(&mgr), CorrectionConfig::default())
            .with_provider(provider())
            .with_events(sink);
        let applied = corrector.force_correction("s1").await.unwrap();

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].kind, CorrectionKind::Improvement);
        assert_eq!(applied[0].block_ids, vec!["b1", "b1_improved"]);

        assert!(mgr.retrieve("b1").await.unwrap_err().is_not_found());
        let replacement = mgr.retrieve("b1_improved").await.unwrap();
        assert_eq!(replacement.message_id, "m1_improved");
        assert_eq!(replacement.sequence_number, 1);
        assert_eq!(replacement.metadata.get("improved").map(String::as_str), Some("true"));
        assert!(replacement.metadata["original_content"].starts_with("message number 1"));
        assert!(replacement.content.starts_with("message number 1"));
        // Reevaluated by the scripted evaluator, which does not know the new id.
        assert_eq!(replacement.relevance_score, Some(0.9));

        assert!(matches!(
            events.recv().await.unwrap(),
            MemoryEvent::Correction { ref action, .. } if action == "improvement"
        ));
    }

    #[tokio::test]
    async fn test_optimistic_boost_scoring() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(&clock, ScriptedEvaluator::default().with("b1", 0.5, Decision::Review));
        seed(&mgr, &clock, 3).await;

        let config = CorrectionConfig::default().with_scoring(CorrectionScoring::OptimisticBoost);
        let corrector = SelfCorrector::new(Arc::clone(&mgr), config).with_provider(provider());
        corrector.force_correction("s1").await.unwrap();

        let replacement = mgr.retrieve("b1_improved").await.unwrap();
        assert_eq!(replacement.relevance_score, Some(0.75));
    }

    #[tokio::test]
    async fn test_low_rescored_replacement_stays_hot() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(
            &clock,
            ScriptedEvaluator::default()
                .with("b1", 0.5, Decision::Review)
                .with("b1_improved", 0.3, Decision::Review),
        );
        seed(&mgr, &clock, 3).await;

        let corrector =
            SelfCorrector::new(Arc::clone(&mgr), CorrectionConfig::default()).with_provider(provider());
        corrector.force_correction("s1").await.unwrap();

        let replacement = mgr.backend().peek("b1_improved").await.unwrap().unwrap();
        assert_eq!(replacement.relevance_score, Some(0.3));
        assert_eq!(replacement.memory_tier(), MemoryTier::Hot);
        assert!(replacement.content.len() > 20);
    }

    #[tokio::test]
    async fn test_provider_failure_skips_repair() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(&clock, ScriptedEvaluator::default().with("b1", 0.5, Decision::Review));
        seed(&mgr, &clock, 3).await;

        let faults = FaultInjectorBuilder::new(DeterministicRng::new(1))
            .with_fault(FaultConfig::new(FaultType::LlmTimeout, 1.0))
            .build();
        let failing: Arc<dyn LLMProvider> =
            Arc::new(SimLLMProvider::with_faults(1, Arc::new(faults)));
        let corrector =
            SelfCorrector::new(Arc::clone(&mgr), CorrectionConfig::default()).with_provider(failing);

        assert!(corrector.force_correction("s1").await.unwrap().is_empty());
        assert!(corrector.history(10).is_empty());
        assert!(mgr.retrieve("b1").await.is_ok());
    }

    #[tokio::test]
    async fn test_review_ignored_without_auto_correct() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(
            &clock,
            ScriptedEvaluator::default()
                .with("b0", 0.2, Decision::Remove)
                .with("b1", 0.5, Decision::Review),
        );
        seed(&mgr, &clock, 3).await;

        let config = CorrectionConfig::default().without_auto_correct();
        let corrector = SelfCorrector::new(Arc::clone(&mgr), config).with_provider(provider());
        let applied = corrector.force_correction("s1").await.unwrap();

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].original_id(), "b0");
        assert!(mgr.retrieve("b1").await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_problem_is_skipped() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(&clock, ScriptedEvaluator::default().with("b0", 0.2, Decision::Remove));
        seed(&mgr, &clock, 2).await;

        let corrector = SelfCorrector::new(Arc::clone(&mgr), CorrectionConfig::default());
        let problems = corrector.analyze("s1", 10).await.unwrap();
        mgr.delete("b0", "gone").await.unwrap();

        assert!(corrector.correct("s1", &problems).await.is_empty());
    }

    #[tokio::test]
    async fn test_corrections_mirror_into_chain() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(
            &clock,
            ScriptedEvaluator::default()
                .with("b0", 0.2, Decision::Remove)
                .with("b1", 0.5, Decision::Review),
        );
        seed(&mgr, &clock, 3).await;

        let chain = Arc::new(MessageChain::new());
        for seq in 0..3 {
            let role = if seq == 0 { MessageRole::User } else { MessageRole::Assistant };
            let message = Message::new(role, format!("message number {seq}"), clock.now())
                .with_id(format!("m{seq}"));
            chain.add_message("s1", message).unwrap();
        }

        let corrector = SelfCorrector::new(Arc::clone(&mgr), CorrectionConfig::default())
            .with_provider(provider())
            .with_chain(Arc::clone(&chain));
        assert_eq!(corrector.force_correction("s1").await.unwrap().len(), 2);

        let ids: Vec<String> = chain.messages("s1").into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m1_improved", "m2"]);
        let corrected = chain.get("m1_improved").unwrap();
        assert!(corrected.is_correction());
        assert_eq!(corrected.parent_message_id.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_idle() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(&clock, ScriptedEvaluator::default());
        let corrector = Arc::new(SelfCorrector::new(mgr, CorrectionConfig::default()));

        corrector.stop().await;
        assert!(corrector.start());
        assert!(!corrector.start());
        assert!(corrector.is_running());

        corrector.stop().await;
        assert!(!corrector.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_repair() {
        let clock = SimClock::at_ms(T0_MS);
        let mgr = manager(&clock, ScriptedEvaluator::default().with("b1", 0.5, Decision::Review));
        seed(&mgr, &clock, 3).await;

        let sim_llm = SimLLM::new(
            clock.clone(),
            DeterministicRng::new(3),
            Arc::new(FaultInjector::new(DeterministicRng::new(3))),
        )
        .with_latency(100);
        let corrector = Arc::new(
            SelfCorrector::new(Arc::clone(&mgr), CorrectionConfig::default())
                .with_provider(Arc::new(SimLLMProvider::from_sim_llm(sim_llm))),
        );

        assert!(corrector.start());
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        // Wake the loop; the cycle then blocks on the provider's latency.
        clock.advance_ms(60_000);
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(corrector.history(10).is_empty());

        let stopper = {
            let corrector = Arc::clone(&corrector);
            tokio::spawn(async move { corrector.stop().await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!stopper.is_finished());

        clock.advance_ms(1_000);
        stopper.await.unwrap();

        let history = corrector.history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, CorrectionKind::Improvement);
        assert!(!corrector.is_running());
    }
}
