//! Property-Based Testing for DST
//!
//! `TigerStyle`: Random operation sequences with invariant checking after
//! every step. The seed reproduces the run; the [`SimClock`] lets operations
//! observe time passing between steps.
//!
//! The tiered store implements [`PropertyTestable`] in its DST suite: random
//! stores, retrieves, deletes, and migrations are applied, then capacity,
//! index, and counter invariants are checked.

use std::fmt::Debug;

use super::clock::SimClock;
use super::rng::DeterministicRng;
use crate::constants::DST_SIMULATION_STEPS_MAX;

/// A system that can be driven by random operations.
pub trait PropertyTestable {
    /// Operation type.
    type Operation: Debug + Clone;

    /// Generate an operation valid for the current state.
    fn generate_operation(&self, rng: &mut DeterministicRng) -> Self::Operation;

    /// Apply an operation. May read the clock.
    fn apply_operation(&mut self, op: &Self::Operation, clock: &SimClock);

    /// Check all invariants.
    ///
    /// # Errors
    /// Returns a description of the first violated invariant.
    fn check_invariants(&self) -> Result<(), String>;

    /// Describe the state for failure reports.
    fn describe_state(&self) -> String {
        String::from("(state description not implemented)")
    }
}

/// Result of a property test run.
#[derive(Debug)]
pub struct PropertyTestResult {
    /// Operations executed, including the failing one
    pub operations_executed: u64,
    /// Seed for reproduction
    pub seed: u64,
    /// Failure details, if any
    pub failure: Option<PropertyTestFailure>,
}

impl PropertyTestResult {
    /// Whether every invariant held.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Panic with reproduction details if the run failed.
    ///
    /// # Panics
    /// Panics if an invariant was violated.
    pub fn assert_success(self) {
        if let Some(failure) = self.failure {
            panic!(
                "Property test failed!\n\
                 Seed: {} (use this to reproduce)\n\
                 Operation #{}: {}\n\
                 Invariant violation: {}\n\
                 State: {}",
                self.seed,
                failure.operation_index,
                failure.operation,
                failure.message,
                failure.state_description
            );
        }
    }
}

/// Details of a property test failure.
#[derive(Debug)]
pub struct PropertyTestFailure {
    /// Index of the failing operation (0-based)
    pub operation_index: u64,
    /// Debug rendering of the failing operation
    pub operation: String,
    /// Invariant violation message
    pub message: String,
    /// State at failure
    pub state_description: String,
}

/// Time advancement between operations.
#[derive(Debug, Clone)]
pub struct TimeAdvanceConfig {
    /// Minimum advance per operation (ms)
    pub min_ms: u64,
    /// Maximum advance per operation (ms)
    pub max_ms: u64,
    /// Probability of advancing before an operation
    pub probability: f64,
}

impl Default for TimeAdvanceConfig {
    fn default() -> Self {
        Self {
            min_ms: 0,
            max_ms: 1000,
            probability: 0.5,
        }
    }
}

impl TimeAdvanceConfig {
    /// Never advance.
    #[must_use]
    pub fn none() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
            probability: 0.0,
        }
    }

    /// Always advance by `ms`.
    #[must_use]
    pub fn fixed(ms: u64) -> Self {
        Self {
            min_ms: ms,
            max_ms: ms,
            probability: 1.0,
        }
    }

    /// Advance by a value in `[min_ms, max_ms]` with `probability`.
    ///
    /// # Panics
    /// Panics on an empty range or a probability outside [0, 1].
    #[must_use]
    pub fn random(min_ms: u64, max_ms: u64, probability: f64) -> Self {
        assert!((0.0..=1.0).contains(&probability), "probability must be in [0, 1]");
        assert!(min_ms <= max_ms, "min_ms must be <= max_ms");
        Self {
            min_ms,
            max_ms,
            probability,
        }
    }
}

/// Property-based test runner.
#[derive(Debug)]
pub struct PropertyTest {
    seed: u64,
    max_operations: u64,
    time_config: TimeAdvanceConfig,
}

impl PropertyTest {
    /// Runner with the given seed and 100 operations.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_operations: 100,
            time_config: TimeAdvanceConfig::default(),
        }
    }

    /// Set the number of operations.
    ///
    /// # Panics
    /// Panics if `max` exceeds `DST_SIMULATION_STEPS_MAX`.
    #[must_use]
    pub fn with_max_operations(mut self, max: u64) -> Self {
        assert!(
            max <= DST_SIMULATION_STEPS_MAX,
            "max_operations {max} exceeds DST_SIMULATION_STEPS_MAX {DST_SIMULATION_STEPS_MAX}"
        );
        self.max_operations = max;
        self
    }

    /// Configure time advancement.
    #[must_use]
    pub fn with_time_advance(mut self, config: TimeAdvanceConfig) -> Self {
        self.time_config = config;
        self
    }

    /// Run with a fresh clock at the epoch.
    #[must_use]
    pub fn run<T: PropertyTestable>(self, state: T) -> PropertyTestResult {
        self.run_with_clock(state, &SimClock::new())
    }

    /// Run against a caller-supplied clock (shared with the system under test).
    #[must_use]
    pub fn run_with_clock<T: PropertyTestable>(
        self,
        mut state: T,
        clock: &SimClock,
    ) -> PropertyTestResult {
        let mut rng = DeterministicRng::new(self.seed);

        if let Err(message) = state.check_invariants() {
            return PropertyTestResult {
                operations_executed: 0,
                seed: self.seed,
                failure: Some(PropertyTestFailure {
                    operation_index: 0,
                    operation: "(initial state)".to_string(),
                    message: format!("Initial state violates invariants: {message}"),
                    state_description: state.describe_state(),
                }),
            };
        }

        for i in 0..self.max_operations {
            if self.time_config.probability > 0.0 && rng.next_bool(self.time_config.probability) {
                let advance = rng.next_u64_in(self.time_config.min_ms, self.time_config.max_ms);
                clock.advance_ms(advance);
            }

            let op = state.generate_operation(&mut rng);
            let op_debug = format!("{op:?}");
            state.apply_operation(&op, clock);

            if let Err(message) = state.check_invariants() {
                return PropertyTestResult {
                    operations_executed: i + 1,
                    seed: self.seed,
                    failure: Some(PropertyTestFailure {
                        operation_index: i,
                        operation: op_debug,
                        message,
                        state_description: state.describe_state(),
                    }),
                };
            }
        }

        PropertyTestResult {
            operations_executed: self.max_operations,
            seed: self.seed,
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transcript capped at a fixed length, oldest lines dropped first.
    struct Transcript {
        lines: Vec<String>,
        cap: usize,
        clamp: bool,
    }

    #[derive(Debug, Clone)]
    enum TranscriptOp {
        Say(String),
        Clear,
    }

    impl PropertyTestable for Transcript {
        type Operation = TranscriptOp;

        fn generate_operation(&self, rng: &mut DeterministicRng) -> Self::Operation {
            if rng.next_bool(0.1) {
                TranscriptOp::Clear
            } else {
                TranscriptOp::Say(rng.next_text(3))
            }
        }

        fn apply_operation(&mut self, op: &Self::Operation, _clock: &SimClock) {
            match op {
                TranscriptOp::Say(line) => {
                    self.lines.push(line.clone());
                    if self.clamp && self.lines.len() > self.cap {
                        self.lines.remove(0);
                    }
                }
                TranscriptOp::Clear => self.lines.clear(),
            }
        }

        fn check_invariants(&self) -> Result<(), String> {
            if self.lines.len() > self.cap {
                return Err(format!("{} lines exceeds cap {}", self.lines.len(), self.cap));
            }
            Ok(())
        }

        fn describe_state(&self) -> String {
            format!("Transcript {{ len: {}, cap: {} }}", self.lines.len(), self.cap)
        }
    }

    fn transcript(clamp: bool) -> Transcript {
        Transcript {
            lines: Vec::new(),
            cap: 5,
            clamp,
        }
    }

    #[test]
    fn test_property_holds() {
        let result = PropertyTest::new(42)
            .with_max_operations(500)
            .with_time_advance(TimeAdvanceConfig::none())
            .run(transcript(true));

        assert!(result.is_success());
        assert_eq!(result.operations_executed, 500);
    }

    #[test]
    fn test_property_violation_reported() {
        let result = PropertyTest::new(42)
            .with_max_operations(500)
            .run(transcript(false));

        let failure = result.failure.unwrap();
        assert!(failure.message.contains("exceeds cap"));
        assert!(failure.operation.contains("Say"));
    }

    #[test]
    fn test_run_with_shared_clock_advances() {
        let clock = SimClock::new();
        let result = PropertyTest::new(1)
            .with_max_operations(10)
            .with_time_advance(TimeAdvanceConfig::fixed(100))
            .run_with_clock(transcript(true), &clock);

        assert!(result.is_success());
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn test_invalid_initial_state() {
        let mut state = transcript(true);
        state.lines = vec![String::new(); 10];

        let result = PropertyTest::new(42).run(state);
        assert!(result
            .failure
            .unwrap()
            .message
            .contains("Initial state violates"));
    }
}
