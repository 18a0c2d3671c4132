use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::Payload;

/// A payload together with the wall-clock data needed to decide expiry.
///
/// Wall-clock time (not a monotonic instant) so that expiry survives a
/// process restart when the entry comes back from disk.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub payload: Payload,
    pub created_at: SystemTime,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(payload: Payload, ttl: Duration) -> Self {
        Self {
            payload,
            created_at: SystemTime::now(),
            ttl,
        }
    }

    /// Expired once `ttl` has fully elapsed. A clock that moved backwards
    /// past `created_at` does not expire anything.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now.duration_since(self.created_at)
            .is_ok_and(|age| age >= self.ttl)
    }

    pub fn size_hint(&self) -> usize {
        self.payload.size_hint()
    }
}

pub(crate) fn to_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub(crate) fn from_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}
