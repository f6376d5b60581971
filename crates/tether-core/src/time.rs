//! Clock abstraction for signature freshness checks and health timings.
//!
//! Webhook timestamps are compared against `Clock::now_system`, so tests can
//! pin the wall clock and exercise the tolerance window without sleeping.

use std::{
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Clock abstraction for time operations.
///
/// Production code uses `RealClock`, tests inject `TestClock`.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Returns the current system time for timestamps.
    fn now_system(&self) -> SystemTime;

    /// Returns the current system time as whole seconds since the Unix epoch.
    ///
    /// Times before the epoch are reported as negative seconds.
    fn unix_timestamp(&self) -> i64 {
        match self.now_system().duration_since(UNIX_EPOCH) {
            Ok(since) => i64::try_from(since.as_secs()).unwrap_or(i64::MAX),
            Err(before) => -i64::try_from(before.duration().as_secs()).unwrap_or(i64::MAX),
        }
    }
}

/// Real clock implementation using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Test clock for deterministic time control.
///
/// Clones share state, so a test can hand one clone to the router and move
/// time with another.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// Monotonic time in nanoseconds since creation
    monotonic_ns: Arc<AtomicU64>,
    /// System time as whole seconds since UNIX_EPOCH
    system_secs: Arc<AtomicI64>,
    /// Base instant for monotonic time calculations
    base_instant: Instant,
}

impl TestClock {
    /// Creates a new test clock starting at the current wall-clock second.
    pub fn new() -> Self {
        Self::at_unix(RealClock.unix_timestamp())
    }

    /// Creates a test clock whose wall clock reads `secs` seconds after the
    /// epoch.
    pub fn at_unix(secs: i64) -> Self {
        Self {
            monotonic_ns: Arc::new(AtomicU64::new(0)),
            system_secs: Arc::new(AtomicI64::new(secs)),
            base_instant: Instant::now(),
        }
    }

    /// Advances both clocks by the specified duration, truncated to whole
    /// seconds for the wall clock.
    pub fn advance(&self, duration: Duration) {
        let duration_ns = u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0);
        let duration_secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);

        self.monotonic_ns.fetch_add(duration_ns, Ordering::AcqRel);
        self.system_secs.fetch_add(duration_secs, Ordering::AcqRel);
    }

    /// Moves the wall clock backwards. The monotonic clock is unaffected.
    pub fn rewind(&self, duration: Duration) {
        let duration_secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        self.system_secs.fetch_sub(duration_secs, Ordering::AcqRel);
    }

    /// Jumps the wall clock to `secs` seconds after the epoch.
    pub fn set_unix(&self, secs: i64) {
        self.system_secs.store(secs, Ordering::Release);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        let elapsed_ns = self.monotonic_ns.load(Ordering::Acquire);
        self.base_instant + Duration::from_nanos(elapsed_ns)
    }

    fn now_system(&self) -> SystemTime {
        let secs = self.system_secs.load(Ordering::Acquire);
        match u64::try_from(secs) {
            Ok(after) => UNIX_EPOCH + Duration::from_secs(after),
            Err(_) => UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()),
        }
    }

    fn unix_timestamp(&self) -> i64 {
        self.system_secs.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let clock = TestClock::at_unix(1_700_000_000);
        let start = clock.now();

        clock.advance(Duration::from_secs(10));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(10));
        assert_eq!(clock.unix_timestamp(), 1_700_000_010);
    }

    #[test]
    fn test_clock_system_time_matches_unix_seconds() {
        let clock = TestClock::at_unix(1000);

        assert_eq!(clock.now_system(), UNIX_EPOCH + Duration::from_secs(1000));
    }

    #[test]
    fn rewind_moves_only_wall_clock() {
        let clock = TestClock::at_unix(1000);
        let start = clock.now();

        clock.rewind(Duration::from_secs(400));

        assert_eq!(clock.unix_timestamp(), 600);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn clones_share_time() {
        let clock = TestClock::at_unix(50);
        let handle = clock.clone();

        handle.set_unix(2000);

        assert_eq!(clock.unix_timestamp(), 2000);
    }

    #[test]
    fn real_clock_reports_post_epoch_time() {
        assert!(RealClock::new().unix_timestamp() > 1_600_000_000);
    }
}
