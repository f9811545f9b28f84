//! Injectable wall-clock source.
//!
//! TTL reconciliation compares persisted timestamps against the current
//! wall clock, so a monotonic clock cannot be substituted. The trait
//! exists so keyspace and partition tests can drive expiry without
//! sleeping.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time.
///
/// Used as `Arc<dyn Clock>` so one clock can be shared by the keyspace,
/// the partition, and the recovery replayer.
pub trait Clock: Send + Sync {
    /// Whole seconds since the Unix epoch.
    fn unix_secs(&self) -> i64;

    /// Nanoseconds since the Unix epoch.
    fn unix_nanos(&self) -> i64;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_secs(&self) -> i64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        i64::try_from(since_epoch.as_secs()).unwrap_or(i64::MAX)
    }

    fn unix_nanos(&self) -> i64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        i64::try_from(since_epoch.as_nanos()).unwrap_or(i64::MAX)
    }
}
