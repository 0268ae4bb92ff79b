//! Clocks - Wall Time and Simulated Time
//!
//! `TigerStyle`: Every age, recency, and interval in the crate is read from a
//! [`Clock`]. Production uses the system clock; DST swaps in [`SimClock`] so
//! block ages and the correction loop's timer move only when a test says so.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::constants::DST_TIME_ADVANCE_MS_MAX;

// =============================================================================
// SimClock
// =============================================================================

/// A simulated clock for deterministic testing.
///
/// `TigerStyle`:
/// - Time only moves forward
/// - All time operations are explicit
/// - Sleepers wake when the test advances time
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct SimClock {
    current_ms: Arc<AtomicU64>,
    notify: Arc<Notify>,
}

impl SimClock {
    /// Create a clock at the Unix epoch.
    #[must_use]
    pub fn new() -> Self {
        Self::at_ms(0)
    }

    /// Create a clock at the given millisecond timestamp.
    #[must_use]
    pub fn at_ms(start_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(start_ms)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a clock at the given instant.
    ///
    /// # Panics
    /// Panics if `dt` is before the Unix epoch.
    #[must_use]
    pub fn at_datetime(dt: DateTime<Utc>) -> Self {
        let ms = dt.timestamp_millis();
        assert!(ms >= 0, "simulated time cannot start before the epoch");
        Self::at_ms(ms.unsigned_abs())
    }

    /// Current time in milliseconds since the epoch.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Current time as a `DateTime<Utc>`.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        ms_to_datetime(self.now_ms())
    }

    /// Advance time and wake sleepers. Returns the new time.
    ///
    /// # Panics
    /// Panics if `ms` exceeds `DST_TIME_ADVANCE_MS_MAX`.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        assert!(
            ms <= DST_TIME_ADVANCE_MS_MAX,
            "advance_ms({ms}) exceeds max ({DST_TIME_ADVANCE_MS_MAX})"
        );

        let old_time = self.current_ms.fetch_add(ms, Ordering::SeqCst);
        let new_time = old_time.saturating_add(ms);
        self.notify.notify_waiters();

        assert!(new_time >= old_time, "time must not go backwards");
        new_time
    }

    /// Advance time by a std `Duration`.
    pub fn advance(&self, duration: Duration) -> u64 {
        self.advance_ms(duration_to_ms(duration))
    }

    /// Jump to an absolute time.
    ///
    /// # Panics
    /// Panics if `ms` is earlier than the current time.
    pub fn set_ms(&self, ms: u64) {
        let current = self.now_ms();
        assert!(ms >= current, "cannot set time backwards: {ms} < {current}");

        self.current_ms.store(ms, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Milliseconds elapsed since `since`.
    ///
    /// # Panics
    /// Panics if `since` is in the future.
    #[must_use]
    pub fn elapsed_since(&self, since: u64) -> u64 {
        let current = self.now_ms();
        assert!(
            since <= current,
            "elapsed_since({since}) is in the future (now={current})"
        );
        current - since
    }

    /// Wait until `duration_ms` of simulated time has passed.
    pub async fn sleep_ms(&self, duration_ms: u64) {
        let target_ms = self.now_ms().saturating_add(duration_ms);
        while self.now_ms() < target_ms {
            let notified = self.notify.notified();
            // Re-check after registering so an advance between the check and
            // the registration is not missed.
            if self.now_ms() >= target_ms {
                break;
            }
            notified.await;
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Time source used by storage, evaluation, and background loops.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Wall-clock time and tokio timers
    #[default]
    System,
    /// Simulated time (DST)
    Simulated(SimClock),
}

impl Clock {
    /// Current instant.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Simulated(clock) => clock.now(),
        }
    }

    /// Sleep for `duration` on this clock.
    pub async fn sleep(&self, duration: Duration) {
        match self {
            Self::System => tokio::time::sleep(duration).await,
            Self::Simulated(clock) => clock.sleep_ms(duration_to_ms(duration)).await,
        }
    }

    /// Whether this clock is simulated.
    #[must_use]
    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }
}

impl From<SimClock> for Clock {
    fn from(clock: SimClock) -> Self {
        Self::Simulated(clock)
    }
}

/// Milliseconds between two instants, zero if `later` precedes `earlier`.
#[must_use]
pub fn elapsed_ms(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u64 {
    let ms = (later - earlier).num_milliseconds();
    u64::try_from(ms).unwrap_or(0)
}

fn ms_to_datetime(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
