// ============================================
// File: crates/rscp-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Every RSCP frame header carries a wall-clock timestamp, and the
//! `Timestamp` tag type carries the same (seconds, nanoseconds) pair. The
//! keep-alive loop additionally needs a lock-free "last activity" marker
//! shared between the caller side and the background task.
//!
//! ## Main Functionality
//! - `RscpTimestamp`: Unix seconds + nanoseconds as used on the wire
//! - `AtomicInstant`: Lock-free `Instant` for activity tracking
//!
//! ## ⚠️ Important Note for Next Developer
//! - `AtomicInstant` stores nanoseconds since the instant it was created
//!   with; older instants clamp to it
//! - Callers that run under a paused tokio clock must pass instants from
//!   `tokio::time::Instant::now().into_std()` rather than `Instant::now()`
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================
// RscpTimestamp
// ============================================

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Wall-clock time as carried in frame headers and `Timestamp` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RscpTimestamp {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Sub-second nanoseconds (`< 1_000_000_000`).
    pub nanos: u32,
}

impl RscpTimestamp {
    /// Creates a timestamp from its raw parts. Whole seconds in `nanos`
    /// are carried into `seconds`.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Self {
            seconds: seconds.saturating_add((nanos / NANOS_PER_SEC) as i64),
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    /// Returns `true` when `nanos` is below one second.
    #[must_use]
    pub const fn is_normalized(&self) -> bool {
        self.nanos < NANOS_PER_SEC
    }

    /// Returns the current system time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Converts a `SystemTime`. Times before the epoch become negative seconds.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Self {
                seconds: since.as_secs() as i64,
                nanos: since.subsec_nanos(),
            },
            Err(before) => {
                let before = before.duration();
                let mut seconds = -(before.as_secs() as i64);
                let mut nanos = before.subsec_nanos();
                if nanos > 0 {
                    seconds -= 1;
                    nanos = NANOS_PER_SEC - nanos;
                }
                Self { seconds, nanos }
            }
        }
    }

    /// Converts back to `SystemTime`.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn to_system_time(self) -> SystemTime {
        if self.seconds >= 0 {
            UNIX_EPOCH + Duration::new(self.seconds as u64, self.nanos)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.seconds.unsigned_abs())
                + Duration::from_nanos(u64::from(self.nanos))
        }
    }
}

impl fmt::Display for RscpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

// ============================================
// AtomicInstant
// ============================================

/// Thread-safe wrapper around [`Instant`].
///
/// # Example
/// ```
/// use rscp_common::time::AtomicInstant;
/// use std::time::Duration;
///
/// let last = AtomicInstant::now();
/// let start = last.load();
/// assert_eq!(last.idle_at(start + Duration::from_secs(3)), Duration::from_secs(3));
/// ```
#[derive(Debug)]
pub struct AtomicInstant {
    /// Instant the offsets are measured from
    base: Instant,
    /// Nanoseconds since `base`
    nanos: AtomicU64,
}

impl AtomicInstant {
    /// Creates a new `AtomicInstant` set to the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_instant(Instant::now())
    }

    /// Creates a new `AtomicInstant` from an `Instant`. Later stores of
    /// instants before this one clamp to it.
    #[must_use]
    pub fn from_instant(instant: Instant) -> Self {
        Self {
            base: instant,
            nanos: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn offset_of(&self, instant: Instant) -> u64 {
        instant
            .checked_duration_since(self.base)
            .map_or(0, |d| d.as_nanos() as u64)
    }

    /// Loads the stored instant.
    #[must_use]
    pub fn load(&self) -> Instant {
        self.base + Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    /// Stores a new instant.
    pub fn store(&self, instant: Instant) {
        self.nanos.store(self.offset_of(instant), Ordering::Release);
    }

    /// Returns how long the stored instant lies before `now` (zero if after).
    #[must_use]
    pub fn idle_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.load())
    }
}

impl Default for AtomicInstant {
    fn default() -> Self {
        Self::now()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_system_time_conversion() {
        let ts = RscpTimestamp::new(1_700_000_000, 123_456_789);
        assert_eq!(RscpTimestamp::from_system_time(ts.to_system_time()), ts);
        assert_eq!(ts.to_string(), "1700000000.123456789");
    }

    #[test]
    fn test_new_carries_whole_seconds() {
        let ts = RscpTimestamp::new(0, 3_000_000_007);
        assert_eq!(ts, RscpTimestamp { seconds: 3, nanos: 7 });
        assert!(ts.is_normalized());
        assert!(!RscpTimestamp { seconds: 0, nanos: NANOS_PER_SEC }.is_normalized());
    }

    #[test]
    fn test_timestamp_before_epoch() {
        let time = UNIX_EPOCH - Duration::from_millis(1500);
        let ts = RscpTimestamp::from_system_time(time);
        assert_eq!(ts, RscpTimestamp::new(-2, 500_000_000));
        assert_eq!(ts.to_system_time(), time);
    }

    #[test]
    fn test_atomic_instant_idle() {
        let last = AtomicInstant::now();
        let start = last.load();
        let later = start + Duration::from_secs(10);

        assert_eq!(last.idle_at(later), Duration::from_secs(10));

        last.store(later);
        assert_eq!(last.idle_at(later), Duration::ZERO);
        assert_eq!(last.idle_at(start), Duration::ZERO);
    }
}
