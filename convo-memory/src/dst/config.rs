//! SimConfig - Simulation Configuration
//!
//! `TigerStyle`: Seed management for deterministic testing.

use std::env;

use rand::Rng;

use crate::constants::DST_SIMULATION_STEPS_MAX;

/// Environment variable that pins the simulation seed.
pub const DST_SEED_ENV: &str = "DST_SEED";

/// Configuration for a simulation run.
///
/// Immutable after creation. The seed is logged so failures can be replayed.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    seed: u64,
    steps_max: u64,
}

impl SimConfig {
    /// Config with an explicit seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            steps_max: DST_SIMULATION_STEPS_MAX,
        }
    }

    /// Config from `DST_SEED`, or a random seed that is logged for replay.
    ///
    /// # Panics
    /// Panics if `DST_SEED` is set but not a valid u64.
    #[must_use]
    pub fn from_env_or_random() -> Self {
        let seed = match env::var(DST_SEED_ENV) {
            Ok(raw) => raw
                .parse::<u64>()
                .unwrap_or_else(|_| panic!("{DST_SEED_ENV} must be a valid u64, got: {raw}")),
            Err(_) => {
                let seed = rand::thread_rng().gen::<u64>();
                tracing::info!(seed, "DST: generated random seed (replay with DST_SEED)");
                seed
            }
        };

        Self::with_seed(seed)
    }

    /// The seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Maximum number of steps.
    #[must_use]
    pub fn steps_max(&self) -> u64 {
        self.steps_max
    }

    /// Copy with a different step limit.
    ///
    /// # Panics
    /// Panics if `steps_max` is zero or above `DST_SIMULATION_STEPS_MAX`.
    #[must_use]
    pub fn with_steps_max(self, steps_max: u64) -> Self {
        assert!(steps_max > 0, "steps_max must be positive");
        assert!(
            steps_max <= DST_SIMULATION_STEPS_MAX,
            "steps_max {steps_max} exceeds {DST_SIMULATION_STEPS_MAX}"
        );
        Self { steps_max, ..self }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::from_env_or_random()
    }
}
