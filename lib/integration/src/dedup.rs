//! Time-windowed de-duplication of notifications.
//!
//! The same change can arrive twice, once from a webhook and once from a
//! poller. Each notification carries a fingerprint; a fingerprint seen
//! again inside the window is suppressed.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Default suppression window in seconds.
pub const DEFAULT_WINDOW_SECS: u32 = 300;

/// Result of a de-duplication check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    /// First sighting inside the window.
    First,
    /// Already seen at `first_seen`.
    Duplicate { first_seen: DateTime<Utc> },
}

impl Seen {
    #[must_use]
    pub fn is_first(&self) -> bool {
        matches!(self, Self::First)
    }
}

/// Remembers fingerprints for a fixed window.
#[derive(Debug)]
pub struct Deduplicator {
    window: Duration,
    /// First sighting per fingerprint.
    seen: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl Deduplicator {
    #[must_use]
    pub fn new(window_secs: u32) -> Self {
        Self {
            window: Duration::seconds(i64::from(window_secs)),
            seen: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Records a sighting of `fingerprint` now.
    pub fn check_and_record(&self, fingerprint: &str) -> Seen {
        self.check_and_record_at(fingerprint, Utc::now())
    }

    /// Records a sighting of `fingerprint` at `now`.
    ///
    /// Expired entries are dropped on the way.
    pub fn check_and_record_at(&self, fingerprint: &str, now: DateTime<Utc>) -> Seen {
        let mut seen = self.seen.write().unwrap_or_else(PoisonError::into_inner);
        let window = self.window;
        seen.retain(|_, first_seen| now - *first_seen < window);

        if let Some(first_seen) = seen.get(fingerprint) {
            return Seen::Duplicate {
                first_seen: *first_seen,
            };
        }
        seen.insert(fingerprint.to_string(), now);
        Seen::First
    }

    /// Forgets a fingerprint.
    pub fn reset(&self, fingerprint: &str) {
        self.seen
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(fingerprint);
    }

    /// Fingerprints currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS)
    }
}

impl Clone for Deduplicator {
    fn clone(&self) -> Self {
        Self {
            window: self.window,
            seen: Arc::clone(&self.seen),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sighting_is_duplicate() {
        let dedup = Deduplicator::new(60);
        let start = Utc::now();
        assert!(dedup.check_and_record_at("pr:acme/site#7", start).is_first());
        assert_eq!(
            dedup.check_and_record_at("pr:acme/site#7", start + Duration::seconds(10)),
            Seen::Duplicate { first_seen: start }
        );
        assert!(dedup.check_and_record_at("pr:acme/site#8", start).is_first());
    }

    #[test]
    fn window_expiry_allows_again() {
        let dedup = Deduplicator::new(60);
        let start = Utc::now();
        dedup.check_and_record_at("branch:acme/site:feature", start);
        let later = start + Duration::seconds(61);
        assert!(dedup.check_and_record_at("branch:acme/site:feature", later).is_first());
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn reset_forgets() {
        let dedup = Deduplicator::default();
        dedup.check_and_record("x");
        dedup.reset("x");
        assert!(dedup.is_empty());
        assert!(dedup.check_and_record("x").is_first());
    }

    #[test]
    fn clones_share_state() {
        let dedup = Deduplicator::new(60);
        let other = dedup.clone();
        dedup.check_and_record("x");
        assert!(!other.check_and_record("x").is_first());
    }
}
