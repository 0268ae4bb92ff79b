//! DeterministicRng - Seeded Random Number Generator
//!
//! `TigerStyle`: ChaCha20-based RNG. Every random choice a simulation makes
//! (fault rolls, generated conversations, latency jitter) flows through here.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Vocabulary used to synthesize conversation text.
const WORDS: &[&str] = &[
    "memory", "python", "rust", "deploy", "cache", "server", "latency", "budget", "schedule",
    "database", "index", "query", "release", "feature", "bug", "test", "weather", "travel",
    "recipe", "invoice", "meeting", "project", "design", "review", "network", "storage",
];

/// A deterministic random number generator.
///
/// `TigerStyle`:
/// - Same seed always produces same sequence
/// - Fork creates independent streams
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha20Rng,
    seed: u64,
    fork_counter: u64,
}

impl DeterministicRng {
    /// Create a new RNG with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
            fork_counter: 0,
        }
    }

    /// The seed this RNG was created with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Random float in [0, 1).
    pub fn next_float(&mut self) -> f64 {
        let value = self.rng.gen::<f64>();
        assert!((0.0..1.0).contains(&value), "float must be in [0, 1)");
        value
    }

    /// Random u64.
    pub fn next_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Random usize in [min, max] (inclusive).
    ///
    /// # Panics
    /// Panics if min > max.
    pub fn next_usize(&mut self, min: usize, max: usize) -> usize {
        assert!(min <= max, "min ({min}) must be <= max ({max})");
        self.rng.gen_range(min..=max)
    }

    /// Random u64 in [min, max] (inclusive).
    ///
    /// # Panics
    /// Panics if min > max.
    pub fn next_u64_in(&mut self, min: u64, max: u64) -> u64 {
        assert!(min <= max, "min ({min}) must be <= max ({max})");
        self.rng.gen_range(min..=max)
    }

    /// True with the given probability.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    pub fn next_bool(&mut self, probability: f64) -> bool {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );
        self.next_float() < probability
    }

    /// Choose a random element from a slice.
    ///
    /// # Panics
    /// Panics if the slice is empty.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        assert!(!items.is_empty(), "cannot choose from empty slice");
        let index = self.next_usize(0, items.len() - 1);
        &items[index]
    }

    /// Space-separated text of `words` words drawn from a fixed vocabulary.
    pub fn next_text(&mut self, words: usize) -> String {
        (0..words)
            .map(|_| *self.choose(WORDS))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Create an independent fork of this RNG.
    pub fn fork(&mut self) -> Self {
        // Golden ratio increment spreads fork seeds across the space.
        let fork_seed = self.seed.wrapping_add(
            self.fork_counter
                .wrapping_add(1)
                .wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
        self.fork_counter += 1;
        Self::new(fork_seed)
    }
}
