//! `SimLLMProvider` - Simulation Provider
//!
//! `TigerStyle`: Default provider for tests and development. Wraps the DST
//! `SimLLM` so the same seed always yields the same ratings and rewrites.

use std::sync::Arc;

use async_trait::async_trait;

use super::{estimate_tokens, CompletionRequest, CompletionResponse, LLMProvider, ProviderError, TokenUsage};
use crate::dst::{DeterministicRng, FaultInjector, SimClock, SimLLM};

/// Model name reported by simulated responses.
pub const SIM_MODEL_NAME: &str = "sim-llm";

/// Simulation provider wrapping [`SimLLM`].
#[derive(Debug, Clone)]
pub struct SimLLMProvider {
    inner: SimLLM,
}

impl SimLLMProvider {
    /// Wrap an existing `SimLLM` (typically `SimEnvironment::llm`).
    #[must_use]
    pub fn from_sim_llm(sim_llm: SimLLM) -> Self {
        Self { inner: sim_llm }
    }

    /// Standalone provider with no faults and no latency.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        let faults = Arc::new(FaultInjector::new(DeterministicRng::new(seed)));
        Self::with_faults(seed, faults)
    }

    /// Standalone provider with fault injection and no latency.
    #[must_use]
    pub fn with_faults(seed: u64, faults: Arc<FaultInjector>) -> Self {
        let sim_llm =
            SimLLM::new(SimClock::new(), DeterministicRng::new(seed), faults).without_latency();
        Self { inner: sim_llm }
    }

    /// Seed of the underlying simulation.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.inner.seed()
    }
}

#[async_trait]
impl LLMProvider for SimLLMProvider {
    #[tracing::instrument(skip(self, request), fields(messages = request.messages.len()))]
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        request.validate()?;

        let prompt = request.prompt_text();
        let content = self.inner.complete(&prompt).await?;

        Ok(CompletionResponse {
            usage: TokenUsage {
                prompt_tokens: estimate_tokens(prompt.len()),
                completion_tokens: estimate_tokens(content.len()),
            },
            content,
            model: SIM_MODEL_NAME.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "sim"
    }

    fn is_simulation(&self) -> bool {
        true
    }
}
