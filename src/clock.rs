//! Wall-clock sources for admission deadlines.

use chrono::{DateTime, TimeZone, Utc};

/// Millisecond wall clock.
///
/// Deadlines are stored as unix milliseconds so both agents compare against
/// the same scale regardless of which one created the entry.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// System time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Wall clock anchored to the tokio timer.
///
/// Advances with `tokio::time`, including when the runtime clock is paused and
/// advanced manually, so deadline checks line up with timer wakeups.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_ms: i64,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now().timestamp_millis())
    }

    pub fn anchored_at(anchor_ms: i64) -> Self {
        Self {
            anchor_ms,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        self.anchor_ms + self.anchor.elapsed().as_millis() as i64
    }
}

/// Convert unix milliseconds to a UTC timestamp for display.
pub fn datetime_from_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
