use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Entries above this count trigger a purge of stale timestamps.
pub const SOFT_CAP: usize = 100;

/// Suppresses repeat events for the same key within a rolling window.
///
/// Keys are URLs on the client and `site|agent|url` triples on the server.
/// The map is bounded by a soft cap rather than exact LRU: once it grows past
/// [`SOFT_CAP`] entries, everything older than twice the window is dropped.
#[derive(Debug, Clone)]
pub struct DuplicateSuppressor {
    window: TimeDelta,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl DuplicateSuppressor {
    pub fn new(window: Duration) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            last_seen: HashMap::new(),
        }
    }

    pub fn is_duplicate(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.last_seen
            .get(key)
            .is_some_and(|seen| now.signed_duration_since(*seen) < self.window)
    }

    pub fn mark_processed(&mut self, key: &str, now: DateTime<Utc>) {
        self.last_seen.insert(key.to_string(), now);
        if self.last_seen.len() > SOFT_CAP {
            self.evict_stale(now);
        }
    }

    /// Returns `true` when the event should go through. Pings are always
    /// accepted and never recorded.
    pub fn check(&mut self, key: &str, is_ping: bool, now: DateTime<Utc>) -> bool {
        if is_ping {
            return true;
        }
        if self.is_duplicate(key, now) {
            return false;
        }
        self.mark_processed(key, now);
        true
    }

    fn evict_stale(&mut self, now: DateTime<Utc>) {
        let horizon = self.window.checked_mul(2).unwrap_or(TimeDelta::MAX);
        self.last_seen
            .retain(|_, seen| now.signed_duration_since(*seen) <= horizon);
    }
}
