// planner/src/clock.rs

use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone, Utc};
use parking_lot::RwLock;

use crate::date::next_midnight_in;

/// Time source threaded through pruning and the today tracker. The offset
/// carried by `now()` defines what "local" means for calendar math.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<FixedOffset>;

    /// Local offset in force at `at`. Fixed clocks never change offset.
    fn offset_at(&self, _at: &DateTime<Utc>) -> FixedOffset { *self.now().offset() }

    fn today(&self) -> NaiveDate { self.now().date_naive() }
    fn now_ms(&self) -> i64 { self.now().timestamp_millis() }

    /// Start of the next local day, using the offset in force then.
    fn next_midnight(&self) -> DateTime<FixedOffset> { next_midnight_in(&self.now(), |at| self.offset_at(at)) }
}

/// Host clock in the host's local time zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> { Local::now().fixed_offset() }
    fn offset_at(&self, at: &DateTime<Utc>) -> FixedOffset { Local.offset_from_utc_datetime(&at.naive_utc()) }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    at: RwLock<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(at: DateTime<FixedOffset>) -> Self { Self { at: RwLock::new(at) } }

    /// Panics on a malformed timestamp; intended for fixtures.
    pub fn at(rfc3339: &str) -> Self {
        Self::new(DateTime::parse_from_rfc3339(rfc3339).expect("valid rfc3339 timestamp"))
    }

    pub fn set(&self, at: DateTime<FixedOffset>) { *self.at.write() = at; }
    pub fn advance(&self, by: chrono::Duration) { *self.at.write() += by; }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> { *self.at.read() }
}

/// Wall-clock reading pinned to tokio's monotonic clock: `now()` is the
/// start reading plus whatever tokio time has elapsed since. Under a paused
/// runtime this makes timers and wall time advance together.
#[derive(Debug)]
pub struct TokioClock {
    start: DateTime<FixedOffset>,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(start: DateTime<FixedOffset>) -> Self {
        Self { start, anchor: tokio::time::Instant::now() }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.anchor);
        self.start + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
