//! Conversation Memory - Main Interface
//!
//! `TigerStyle`: Sim-first, deterministic, graceful degradation.
//!
//! # Overview
//!
//! `ConversationMemory` wires every component from one `MemoryConfig`:
//! - `MessageChain` for the ordered per-session transcript
//! - `TieredMemoryManager` for Hot/Warm/Cold block placement
//! - `RelevanceEvaluator` (heuristic, model, or composite) for scoring
//! - `SelfCorrector` for background removal and repair
//!
//! # Example
//!
//! ```rust,ignore
//! use convo_memory::{ConversationMemory, IngestOptions, Message, MemoryConfig};
//! use convo_memory::llm::SimLLMProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let memory = ConversationMemory::builder()
//!         .with_config(MemoryConfig::default())
//!         .with_provider(Arc::new(SimLLMProvider::with_seed(42)))
//!         .build()
//!         .unwrap();
//!
//!     let message = Message::user("How do I rotate the API key?", chrono::Utc::now());
//!     let result = memory.ingest("session-1", message, IngestOptions::default()).await.unwrap();
//!     println!("stored in {:?}", result.tier);
//!
//!     memory.start();
//!     memory.shutdown().await;
//! }
//! ```

mod builder;

pub use builder::ConversationMemoryBuilder;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::MemoryConfig;
use crate::constants::EVAL_BATCH_NEIGHBORS_COUNT;
use crate::correction::{CorrectionEntry, SelfCorrector};
use crate::dst::Clock;
use crate::entities::{BlockSource, ConversationBlock, MemoryTier, Message, MessageChain, MessageRole};
use crate::error::{MemoryError, MemoryResult};
use crate::evaluation::{neighborhood, EvaluationMetadata, RelevanceScore};
use crate::events::{BroadcastSink, MemoryEvent};
use crate::storage::{MaintenanceHandle, OptimizeReport, TierStats, TieredMemoryManager};

// =============================================================================
// Options Types
// =============================================================================

/// Options for ingest operations.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Score the block against recent context before placing it (default: false)
    pub evaluate: bool,

    /// Explicit tier; overrides score-based placement (default: None)
    pub tier: Option<MemoryTier>,

    /// Goal passed to the evaluator when `evaluate` is set
    pub goal: Option<String>,
}

impl IngestOptions {
    /// Create new options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Score before placing.
    #[must_use]
    pub fn with_evaluation(mut self) -> Self {
        self.evaluate = true;
        self
    }

    /// Place in `tier` regardless of score.
    #[must_use]
    pub fn with_tier(mut self, tier: MemoryTier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Conversation goal for the evaluator.
    #[must_use]
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }
}

/// Result of an ingest operation.
#[derive(Debug, Clone)]
pub struct IngestResult {
    /// Id of the message appended to the chain
    pub message_id: String,
    /// The block as stored
    pub block: ConversationBlock,
    /// Tier the block landed in
    pub tier: MemoryTier,
    /// Score computed at ingest, if requested
    pub score: Option<RelevanceScore>,
}

// =============================================================================
// ConversationMemory
// =============================================================================

/// Main interface: transcript, tiered block cache, scoring, and correction.
#[derive(Debug)]
pub struct ConversationMemory {
    config: MemoryConfig,
    clock: Clock,
    chain: Arc<MessageChain>,
    manager: Arc<TieredMemoryManager>,
    corrector: Arc<SelfCorrector>,
    events: Option<Arc<BroadcastSink>>,
    sequences: Mutex<HashMap<String, u64>>,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl ConversationMemory {
    /// Start building a memory.
    #[must_use]
    pub fn builder() -> ConversationMemoryBuilder {
        ConversationMemoryBuilder::new()
    }

    /// Append a message to the session's chain and store its block.
    ///
    /// # Errors
    /// `MemoryError::Validation` for empty content, `Chain` if the message id
    /// is already present, `Storage` on backend failure. A failed store
    /// removes the message from the chain again.
    #[tracing::instrument(skip(self, message, options), fields(message_id = %message.id))]
    pub async fn ingest(
        &self,
        session_id: &str,
        message: Message,
        options: IngestOptions,
    ) -> MemoryResult<IngestResult> {
        if session_id.is_empty() {
            return Err(MemoryError::validation("session id must not be empty"));
        }
        if message.content.trim().is_empty() {
            return Err(MemoryError::validation("message content must not be empty"));
        }

        let sequence = self.next_sequence(session_id);
        let mut block = ConversationBlock::new(
            session_id,
            sequence,
            message.content.clone(),
            source_for(message.role),
            message.id.clone(),
            message.timestamp,
        );
        block.tool_name.clone_from(&message.tool_name);

        let message_id = self.chain.add_message(session_id, message)?;

        let score = if options.evaluate {
            let context = self.manager.session_blocks(session_id, Some(EVAL_BATCH_NEIGHBORS_COUNT)).await;
            let context = match context {
                Ok(context) => context,
                Err(e) => {
                    self.chain.remove_message(&message_id);
                    return Err(e);
                }
            };
            let metadata = EvaluationMetadata {
                goal: options.goal.clone(),
                ..EvaluationMetadata::default()
            };
            let score = self.manager.evaluator().evaluate(&block, &context, &metadata).await;
            block.relevance_score = Some(score.overall_score);
            block.evaluation_reason = Some(score.explanation.clone());
            Some(score)
        } else {
            None
        };

        let receipt = match self.manager.store(block.clone(), options.tier).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.chain.remove_message(&message_id);
                return Err(e);
            }
        };
        block.set_tier(receipt.tier);

        tracing::debug!(
            session_id,
            block_id = %block.id,
            tier = receipt.tier.as_str(),
            cascaded = receipt.transitions.len(),
            "ingested message"
        );
        Ok(IngestResult {
            message_id,
            block,
            tier: receipt.tier,
            score,
        })
    }

    /// Retrieve a block, recording the access.
    ///
    /// # Errors
    /// `MemoryError::NotFound` for unknown ids.
    pub async fn retrieve(&self, block_id: &str) -> MemoryResult<ConversationBlock> {
        self.manager.retrieve(block_id).await
    }

    /// Score a stored block against its neighbors without touching access
    /// metadata.
    ///
    /// # Errors
    /// `MemoryError::NotFound` for unknown ids.
    pub async fn score_block(
        &self,
        block_id: &str,
        metadata: &EvaluationMetadata,
    ) -> MemoryResult<RelevanceScore> {
        let block = self
            .manager
            .backend()
            .peek(block_id)
            .await?
            .ok_or_else(|| MemoryError::block_not_found(block_id))?;
        let blocks = self.manager.session_blocks(&block.session_id, None).await?;
        let context = blocks
            .iter()
            .position(|b| b.id == block.id)
            .map(|i| neighborhood(&blocks, i, EVAL_BATCH_NEIGHBORS_COUNT))
            .unwrap_or_default();

        Ok(self.manager.evaluator().evaluate(&block, &context, metadata).await)
    }

    /// Messages of a session, oldest first.
    #[must_use]
    pub fn messages(&self, session_id: &str) -> Vec<Message> {
        self.chain.messages(session_id)
    }

    /// Newest messages of a session that fit in `max_tokens`, oldest first.
    #[must_use]
    pub fn context_window(&self, session_id: &str, max_tokens: usize) -> Vec<Message> {
        self.chain.context_window(session_id, max_tokens)
    }

    /// Blocks of a session ordered by sequence, without recording access.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn session_blocks(&self, session_id: &str) -> MemoryResult<Vec<ConversationBlock>> {
        self.manager.session_blocks(session_id, None).await
    }

    /// Truncate a session after `message_id`, deleting the blocks of every
    /// dropped message. Returns the number of messages dropped.
    ///
    /// # Errors
    /// `MemoryError::NotFound` if the message is not in the session.
    pub async fn rollback_to(&self, session_id: &str, message_id: &str) -> MemoryResult<usize> {
        let dropped: HashSet<String> = self
            .chain
            .rollback_to(session_id, message_id)?
            .into_iter()
            .map(|m| m.id)
            .collect();
        let count = dropped.len();

        for block in self.manager.session_blocks(session_id, None).await? {
            if dropped.contains(&block.message_id) {
                self.manager.delete(&block.id, "rolled back").await?;
            }
        }
        tracing::info!(session_id, message_id, dropped = count, "rolled back session");
        Ok(count)
    }

    /// Drop a session's messages and blocks. Returns blocks deleted.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn forget_session(&self, session_id: &str) -> MemoryResult<usize> {
        self.chain.clear_session(session_id);
        self.sequences.lock().remove(session_id);

        let mut deleted = 0;
        for block in self.manager.session_blocks(session_id, None).await? {
            if self.manager.delete(&block.id, "session forgotten").await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Run one tier policy sweep now.
    ///
    /// # Errors
    /// `MemoryError::Storage` if the block listing fails.
    pub async fn optimize(&self) -> MemoryResult<OptimizeReport> {
        self.manager.optimize().await
    }

    /// Delete a session's blocks that the evaluator decides to remove.
    ///
    /// # Errors
    /// `MemoryError::Storage` if the session cannot be listed.
    pub async fn cleanup_irrelevant(&self, session_id: &str) -> MemoryResult<usize> {
        self.manager.cleanup_irrelevant(session_id).await
    }

    /// Run one correction cycle for a session now.
    ///
    /// # Errors
    /// `MemoryError::Storage` if the session cannot be read.
    pub async fn force_correction(&self, session_id: &str) -> MemoryResult<Vec<CorrectionEntry>> {
        self.corrector.force_correction(session_id).await
    }

    /// The last `limit` corrections, oldest first.
    #[must_use]
    pub fn correction_history(&self, limit: usize) -> Vec<CorrectionEntry> {
        self.corrector.history(limit)
    }

    /// Tier usage and counters.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn stats(&self) -> MemoryResult<TierStats> {
        self.manager.stats().await
    }

    /// Sessions with at least one stored block.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn sessions(&self) -> MemoryResult<Vec<String>> {
        self.manager.sessions().await
    }

    /// Subscribe to memory events, if events are enabled.
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<MemoryEvent>> {
        self.events.as_ref().map(|sink| sink.subscribe())
    }

    // =========================================================================
    // Background Tasks
    // =========================================================================

    /// Start tier maintenance and the correction loop. Idempotent.
    pub fn start(&self) {
        {
            let mut maintenance = self.maintenance.lock();
            if maintenance.is_none() {
                let interval = Duration::from_millis(self.config.maintenance_interval_ms);
                *maintenance = Some(self.manager.start_maintenance(interval));
            }
        }
        self.corrector.start();
    }

    /// Stop both background tasks, waiting for in-flight cycles.
    pub async fn shutdown(&self) {
        self.corrector.stop().await;
        let maintenance = self.maintenance.lock().take();
        if let Some(handle) = maintenance {
            handle.shutdown().await;
        }
        tracing::info!("conversation memory shut down");
    }

    /// Whether the correction loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.corrector.is_running()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Clock used for timestamps and ages.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The message chain.
    #[must_use]
    pub fn chain(&self) -> &Arc<MessageChain> {
        &self.chain
    }

    /// The tier manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<TieredMemoryManager> {
        &self.manager
    }

    /// The correction loop.
    #[must_use]
    pub fn corrector(&self) -> &Arc<SelfCorrector> {
        &self.corrector
    }

    fn next_sequence(&self, session_id: &str) -> u64 {
        let mut sequences = self.sequences.lock();
        let next = sequences.entry(session_id.to_string()).or_insert(0);
        let sequence = *next;
        *next += 1;
        sequence
    }
}

fn source_for(role: MessageRole) -> BlockSource {
    match role {
        MessageRole::User => BlockSource::User,
        MessageRole::Assistant => BlockSource::Agent,
        MessageRole::System => BlockSource::System,
        MessageRole::Tool => BlockSource::Tool,
    }
}

// =============================================================================
// Tests
// =============================================================================
