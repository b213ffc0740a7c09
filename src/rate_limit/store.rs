//! Window Table
//!
//! Per-identity fixed-window counters with idle eviction. The table itself is
//! synchronous and takes `now` from the caller; `RateLimiter` owns the lock
//! and the clock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::config::RateLimitConfig;

/// Counter state for one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Requests admitted in the current window
    pub count: u32,

    /// When the current window opened
    pub window_start: Instant,

    /// Last admission attempt, admitted or not
    pub last_seen: Instant,
}

impl WindowEntry {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_seen: now,
        }
    }
}

/// Outcome of one admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request counted against the window
    Admitted {
        /// Requests still available in this window
        remaining: u32,
    },
    /// Window is full
    Rejected {
        /// Time until the window closes
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Fixed-window counters keyed by identity
#[derive(Debug)]
pub struct WindowTable {
    entries: HashMap<String, WindowEntry>,
    limit: u32,
    window: Duration,
    idle_ttl: Duration,
    max_identities: usize,
}

impl WindowTable {
    /// Create an empty table from configuration
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            entries: HashMap::new(),
            limit: config.max_requests,
            window: config.window(),
            idle_ttl: config.idle_ttl(),
            max_identities: config.max_identities.max(1),
        }
    }

    /// Count one request for `identity` at `now`.
    ///
    /// The window restarts at `now` once more than one window length has
    /// passed since it opened. A rejected attempt leaves the counter and the
    /// window start untouched.
    pub fn try_admit(&mut self, identity: &str, now: Instant) -> Admission {
        if !self.entries.contains_key(identity) {
            self.make_room(now);
        }

        let entry = self
            .entries
            .entry(identity.to_string())
            .or_insert_with(|| WindowEntry::new(now));
        entry.last_seen = now;

        if now.saturating_duration_since(entry.window_start) > self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.limit {
            let closes_at = entry.window_start + self.window;
            return Admission::Rejected {
                retry_after: closes_at.saturating_duration_since(now),
            };
        }

        entry.count += 1;
        Admission::Admitted {
            remaining: self.limit - entry.count,
        }
    }

    /// Drop entries idle for longer than the TTL, returning how many went
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let idle_ttl = self.idle_ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle_ttl);
        before - self.entries.len()
    }

    /// Keep the table under its bound before a new identity is inserted
    fn make_room(&mut self, now: Instant) {
        if self.entries.len() < self.max_identities {
            return;
        }

        let swept = self.sweep(now);
        if swept > 0 {
            tracing::debug!("Swept {} idle rate-limit entries to make room", swept);
        }

        while self.entries.len() >= self.max_identities {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(identity, _)| identity.clone());

            match oldest {
                Some(identity) => {
                    tracing::debug!("Evicting least recently seen identity {}", identity);
                    self.entries.remove(&identity);
                }
                None => break,
            }
        }
    }

    /// Current entry for an identity
    pub fn get(&self, identity: &str) -> Option<&WindowEntry> {
        self.entries.get(identity)
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> WindowTable {
        WindowTable::new(&RateLimitConfig::default())
    }

    #[test]
    fn test_first_request_creates_entry() {
        let mut table = table();
        let now = Instant::now();

        assert_eq!(
            table.try_admit("a@x.com", now),
            Admission::Admitted { remaining: 9 }
        );
        let entry = table.get("a@x.com").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_start, now);
    }

    #[test]
    fn test_eleventh_request_rejected() {
        let mut table = table();
        let now = Instant::now();

        for i in 0..10 {
            let at = now + Duration::from_millis(i * 10);
            assert!(table.try_admit("c@x.com", at).is_admitted());
        }

        let at = now + Duration::from_millis(500);
        match table.try_admit("c@x.com", at) {
            Admission::Rejected { retry_after } => {
                assert_eq!(retry_after, Duration::from_millis(59_500));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_rejection_leaves_entry_unchanged() {
        let mut table = table();
        let now = Instant::now();
        for _ in 0..10 {
            table.try_admit("c@x.com", now);
        }
        let before = *table.get("c@x.com").unwrap();

        let later = now + Duration::from_secs(1);
        assert!(!table.try_admit("c@x.com", later).is_admitted());

        let after = table.get("c@x.com").unwrap();
        assert_eq!(after.count, before.count);
        assert_eq!(after.window_start, before.window_start);
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let mut table = table();
        let now = Instant::now();
        for _ in 0..10 {
            table.try_admit("c@x.com", now);
        }

        // Exactly one window later is still the same window
        let edge = now + Duration::from_secs(60);
        assert!(!table.try_admit("c@x.com", edge).is_admitted());

        let past = now + Duration::from_millis(60_001);
        assert_eq!(
            table.try_admit("c@x.com", past),
            Admission::Admitted { remaining: 9 }
        );
        assert_eq!(table.get("c@x.com").unwrap().window_start, past);
    }

    #[test]
    fn test_window_restarts_at_admitting_request() {
        let mut table = table();
        let now = Instant::now();
        table.try_admit("a@x.com", now);

        let much_later = now + Duration::from_secs(3600);
        table.try_admit("a@x.com", much_later);
        assert_eq!(table.get("a@x.com").unwrap().window_start, much_later);
    }

    #[test]
    fn test_identities_are_independent() {
        let mut table = table();
        let now = Instant::now();
        for _ in 0..10 {
            table.try_admit("c@x.com", now);
        }
        assert!(!table.try_admit("c@x.com", now).is_admitted());
        assert!(table.try_admit("d@x.com", now).is_admitted());
    }

    #[test]
    fn test_sweep_removes_idle_entries() {
        let mut table = table();
        let now = Instant::now();
        table.try_admit("old@x.com", now);
        table.try_admit("new@x.com", now + Duration::from_secs(500));

        let removed = table.sweep(now + Duration::from_secs(601));
        assert_eq!(removed, 1);
        assert!(table.get("old@x.com").is_none());
        assert!(table.get("new@x.com").is_some());
    }

    #[test]
    fn test_full_table_evicts_least_recently_seen() {
        let config = RateLimitConfig {
            max_identities: 2,
            ..RateLimitConfig::default()
        };
        let mut table = WindowTable::new(&config);
        let now = Instant::now();

        table.try_admit("first@x.com", now);
        table.try_admit("second@x.com", now + Duration::from_secs(1));
        table.try_admit("first@x.com", now + Duration::from_secs(2));
        table.try_admit("third@x.com", now + Duration::from_secs(3));

        assert_eq!(table.len(), 2);
        assert!(table.get("second@x.com").is_none());
        assert!(table.get("first@x.com").is_some());
        assert!(table.get("third@x.com").is_some());
    }

    proptest! {
        #[test]
        fn prop_never_more_than_limit_per_window(
            offsets in proptest::collection::vec(0u64..60_000, 1..60)
        ) {
            let mut table = table();
            let start = Instant::now();
            let mut sorted = offsets.clone();
            sorted.sort_unstable();

            let admitted = sorted
                .iter()
                .filter(|ms| table.try_admit("p@x.com", start + Duration::from_millis(**ms)).is_admitted())
                .count();

            prop_assert_eq!(admitted, sorted.len().min(10));
        }
    }
}
