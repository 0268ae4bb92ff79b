//! `SimLLM` - Deterministic LLM Simulation
//!
//! `TigerStyle`: Deterministic generation for simulation testing.
//!
//! Prompts are routed on their content:
//! - rating prompts ("... respond with just a number") get a rating in
//!   [0.35, 0.95] derived from the prompt hash
//! - repair prompts ("improve this conversation response") get an expanded
//!   rewrite of the quoted response
//! - anything else gets a short acknowledgement

use std::sync::Arc;

use parking_lot::Mutex;

use super::clock::SimClock;
use super::fault::{FaultInjector, FaultType};
use super::rng::DeterministicRng;
use crate::constants::{
    LLM_LATENCY_JITTER_MS_MAX, LLM_LATENCY_MS_DEFAULT, LLM_LATENCY_MS_MAX, LLM_LATENCY_MS_MIN,
    LLM_PROMPT_BYTES_MAX, LLM_RESPONSE_BYTES_MAX,
};
use crate::llm::{estimate_tokens, ProviderError};

/// Marker that ends every rating prompt.
pub const RATING_PROMPT_MARKER: &str = "respond with just a number";

/// Marker that opens every repair prompt.
pub const REPAIR_PROMPT_MARKER: &str = "improve this conversation response";

/// Line that precedes the quoted response in a repair prompt.
const REPAIR_RESPONSE_HEADER: &str = "Current Response:";

const REPAIR_ADDENDA: &[&str] = &[
    "Concretely, start with the specific step that answers the question, then check the result.",
    "To be specific, the key detail is the exact setting involved and how to verify it worked.",
    "In detail, the answer depends on the current configuration, so confirm it first and then apply the change.",
];

const GENERIC_RESPONSES: &[&str] = &[
    "Acknowledged.",
    "Understood.",
    "Request handled.",
];

/// Simulated LLM for deterministic testing.
///
/// `TigerStyle`:
/// - Deterministic responses via seeded RNG and prompt hashing
/// - Fault injection on every call (`"llm_complete"`)
/// - Optional latency on the simulated clock
#[derive(Debug, Clone)]
pub struct SimLLM {
    clock: SimClock,
    rng: Arc<Mutex<DeterministicRng>>,
    fault_injector: Arc<FaultInjector>,
    base_latency_ms: u64,
    simulate_latency_enabled: bool,
}

impl SimLLM {
    /// Create a simulated LLM.
    #[must_use]
    pub fn new(clock: SimClock, rng: DeterministicRng, fault_injector: Arc<FaultInjector>) -> Self {
        Self {
            clock,
            rng: Arc::new(Mutex::new(rng)),
            fault_injector,
            base_latency_ms: LLM_LATENCY_MS_DEFAULT,
            simulate_latency_enabled: true,
        }
    }

    /// Skip latency. Calls then never wait on the simulated clock.
    #[must_use]
    pub fn without_latency(mut self) -> Self {
        self.simulate_latency_enabled = false;
        self
    }

    /// Set base latency.
    ///
    /// # Panics
    /// Panics if latency is outside `[LLM_LATENCY_MS_MIN, LLM_LATENCY_MS_MAX]`.
    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        assert!(
            (LLM_LATENCY_MS_MIN..=LLM_LATENCY_MS_MAX).contains(&latency_ms),
            "latency must be in [{LLM_LATENCY_MS_MIN}, {LLM_LATENCY_MS_MAX}], got {latency_ms}"
        );
        self.base_latency_ms = latency_ms;
        self.simulate_latency_enabled = true;
        self
    }

    /// Complete a prompt.
    ///
    /// # Errors
    /// `InvalidRequest` for an empty prompt, `ContextOverflow` for an
    /// oversized one, or the error mapped from an injected fault.
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        if prompt.trim().is_empty() {
            return Err(ProviderError::invalid_request("prompt must not be empty"));
        }
        if prompt.len() > LLM_PROMPT_BYTES_MAX {
            return Err(ProviderError::context_overflow(estimate_tokens(prompt.len())));
        }

        if let Some(fault) = self.fault_injector.should_inject("llm_complete") {
            return Err(fault_to_error(fault));
        }

        self.simulate_latency().await;

        let response = self.route_prompt(prompt);

        debug_assert!(!response.is_empty(), "response must not be empty");
        debug_assert!(
            response.len() <= LLM_RESPONSE_BYTES_MAX,
            "response exceeds limit"
        );
        Ok(response)
    }

    /// Seed of the underlying RNG.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.rng.lock().seed()
    }

    fn route_prompt(&self, prompt: &str) -> String {
        let prompt_lower = prompt.to_lowercase();

        if prompt_lower.contains(REPAIR_PROMPT_MARKER) {
            self.sim_repair(prompt)
        } else if prompt_lower.contains(RATING_PROMPT_MARKER) {
            sim_rating(prompt)
        } else {
            let mut rng = self.rng.lock();
            (*rng.choose(GENERIC_RESPONSES)).to_string()
        }
    }

    fn sim_repair(&self, prompt: &str) -> String {
        let original = quoted_response(prompt).unwrap_or("the previous response");
        let addendum = {
            let mut rng = self.rng.lock();
            *rng.choose(REPAIR_ADDENDA)
        };

        let mut rewrite = format!("{} {addendum}", original.trim_end_matches("..."));
        if rewrite.len() > LLM_RESPONSE_BYTES_MAX {
            let mut cut = LLM_RESPONSE_BYTES_MAX;
            while !rewrite.is_char_boundary(cut) {
                cut -= 1;
            }
            rewrite.truncate(cut);
        }
        rewrite
    }

    async fn simulate_latency(&self) {
        if !self.simulate_latency_enabled {
            return;
        }

        let jitter = self.rng.lock().next_u64_in(0, LLM_LATENCY_JITTER_MS_MAX);
        self.clock.sleep_ms(self.base_latency_ms + jitter).await;
    }
}

/// Rating in [0.35, 0.95] that depends only on the prompt text.
fn sim_rating(prompt: &str) -> String {
    let bucket = prompt_hash(prompt) % 61;
    #[allow(clippy::cast_precision_loss)]
    let rating = 0.35 + bucket as f64 / 100.0;
    format!("{rating:.2}")
}

/// Content of the `SOURCE: content` line following the response header.
fn quoted_response(prompt: &str) -> Option<&str> {
    let mut lines = prompt.lines();
    lines.find(|line| line.trim() == REPAIR_RESPONSE_HEADER)?;
    let line = lines.find(|line| !line.trim().is_empty())?;
    Some(line.split_once(": ").map_or(line, |(_, content)| content).trim())
}

/// FNV-1a hash of the prompt.
fn prompt_hash(prompt: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in prompt.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn fault_to_error(fault: FaultType) -> ProviderError {
    match fault {
        FaultType::LlmTimeout => ProviderError::Timeout,
        FaultType::LlmRateLimit => ProviderError::rate_limit(None),
        FaultType::LlmContextOverflow => ProviderError::context_overflow(0),
        FaultType::LlmInvalidResponse => ProviderError::invalid_response("simulated garbled output"),
        FaultType::LlmServiceUnavailable
        | FaultType::StorageWriteFail
        | FaultType::StorageReadFail
        | FaultType::StorageDeleteFail => {
            ProviderError::service_unavailable(format!("simulated fault: {}", fault.as_str()))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::fault::{FaultConfig, FaultInjectorBuilder};

    fn create_test_llm(seed: u64) -> SimLLM {
        let faults = Arc::new(FaultInjector::new(DeterministicRng::new(seed)));
        SimLLM::new(SimClock::new(), DeterministicRng::new(seed), faults).without_latency()
    }

    const REPAIR_PROMPT: &str = "Improve this conversation response:\n\n\
        Current Response:\nASSISTANT: It depends.\n\n\
        Recent Context:\n- USER: How do I reset my password?...\n";

    #[tokio::test]
    async fn test_rating_depends_only_on_prompt() {
        let prompt = "Rate the relevance.\nRespond with just a number between 0.0 and 1.0.";
        let a = create_test_llm(1).complete(prompt).await.unwrap();
        let b = create_test_llm(999).complete(prompt).await.unwrap();

        assert_eq!(a, b);
        let value: f64 = a.parse().unwrap();
        assert!((0.35..=0.95).contains(&value));
    }

    #[tokio::test]
    async fn test_repair_expands_quoted_response() {
        let llm = create_test_llm(42);
        let response = llm.complete(REPAIR_PROMPT).await.unwrap();

        assert!(response.starts_with("It depends."));
        assert!(response.len() > "It depends.".len());
    }

    #[tokio::test]
    async fn test_repair_determinism() {
        let a = create_test_llm(42).complete(REPAIR_PROMPT).await.unwrap();
        let b = create_test_llm(42).complete(REPAIR_PROMPT).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_generic_routing() {
        let response = create_test_llm(42).complete("Hello there").await.unwrap();
        assert!(GENERIC_RESPONSES.contains(&response.as_str()));
    }

    #[tokio::test]
    async fn test_empty_prompt_error() {
        let result = create_test_llm(42).complete("  ").await;
        assert!(matches!(result, Err(ProviderError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn test_prompt_too_long_error() {
        let prompt = "x".repeat(LLM_PROMPT_BYTES_MAX + 1);
        let result = create_test_llm(42).complete(&prompt).await;
        assert!(matches!(result, Err(ProviderError::ContextOverflow { .. })));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let faults = Arc::new(
            FaultInjectorBuilder::new(DeterministicRng::new(42))
                .with_fault(FaultConfig::new(FaultType::LlmRateLimit, 1.0))
                .build(),
        );
        let llm = SimLLM::new(SimClock::new(), DeterministicRng::new(42), faults).without_latency();

        let result = llm.complete("Rate this. Respond with just a number").await;
        assert!(matches!(result, Err(ProviderError::RateLimit { .. })));
    }

    #[tokio::test]
    async fn test_latency_waits_on_clock() {
        let clock = SimClock::new();
        let faults = Arc::new(FaultInjector::new(DeterministicRng::new(42)));
        let llm = SimLLM::new(clock.clone(), DeterministicRng::new(42), faults).with_latency(100);

        let handle = tokio::spawn(async move { llm.complete("Hello").await });
        while !handle.is_finished() {
            clock.advance_ms(10);
            tokio::task::yield_now().await;
        }

        assert!(handle.await.unwrap().is_ok());
        assert!(clock.now_ms() >= 100);
    }

    #[test]
    fn test_quoted_response() {
        assert_eq!(quoted_response(REPAIR_PROMPT), Some("It depends."));
        assert_eq!(quoted_response("no header here"), None);
    }

    #[test]
    #[should_panic(expected = "latency must be in")]
    fn test_invalid_latency() {
        let _ = create_test_llm(1).with_latency(1);
    }
}
