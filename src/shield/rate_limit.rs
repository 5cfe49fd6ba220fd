//! Fixed-window per-identity request counters.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::shield::identity::ClientIdentity;

/// Length of one counting window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Request count for one identity inside the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRecord {
    pub count: u32,
    pub window_reset_at: Instant,
}

impl RateRecord {
    fn start(now: Instant) -> Self {
        Self {
            count: 1,
            window_reset_at: now + RATE_WINDOW,
        }
    }
}

/// Fixed-window limiter keyed by client identity.
///
/// Each record is mutated under its DashMap shard lock, so a window reset
/// replaces the record in one step and concurrent callers never see a
/// half-reset counter.
#[derive(Debug)]
pub struct RateLimiter {
    records: DashMap<ClientIdentity, RateRecord>,
    max_per_window: u32,
}

impl RateLimiter {
    pub fn new(max_requests_per_minute: u32) -> Self {
        Self {
            records: DashMap::new(),
            max_per_window: max_requests_per_minute,
        }
    }

    /// Count a request and report whether it fits in the current window.
    pub fn allow(&self, identity: &ClientIdentity) -> bool {
        self.allow_at(identity, Instant::now())
    }

    pub fn allow_at(&self, identity: &ClientIdentity, now: Instant) -> bool {
        match self.records.entry(identity.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(RateRecord::start(now));
                true
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if now > record.window_reset_at {
                    *record = RateRecord::start(now);
                    return true;
                }
                record.count = record.count.saturating_add(1);
                record.count <= self.max_per_window
            }
        }
    }

    /// Current record for an identity, if any.
    pub fn record(&self, identity: &ClientIdentity) -> Option<RateRecord> {
        self.records.get(identity).map(|r| *r.value())
    }

    /// Drop records whose window has already closed. Returns how many were removed.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.window_reset_at >= now);
        before.saturating_sub(self.records.len())
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientIdentity {
        ClientIdentity::new("203.0.113.9".parse().unwrap(), "Mozilla/5.0")
    }

    #[test]
    fn denies_request_past_ceiling() {
        let limiter = RateLimiter::new(3);
        let id = client();
        let t0 = Instant::now();

        assert!(limiter.allow_at(&id, t0));
        assert!(limiter.allow_at(&id, t0 + Duration::from_secs(1)));
        assert!(limiter.allow_at(&id, t0 + Duration::from_secs(2)));
        assert!(!limiter.allow_at(&id, t0 + Duration::from_secs(3)));
        assert!(!limiter.allow_at(&id, t0 + Duration::from_secs(59)));
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(1);
        let id = client();
        let t0 = Instant::now();

        assert!(limiter.allow_at(&id, t0));
        assert!(!limiter.allow_at(&id, t0 + Duration::from_secs(10)));
        // Boundary instant still belongs to the old window.
        assert!(!limiter.allow_at(&id, t0 + RATE_WINDOW));

        let later = t0 + RATE_WINDOW + Duration::from_millis(1);
        assert!(limiter.allow_at(&id, later));
        let record = limiter.record(&id).unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(record.window_reset_at, later + RATE_WINDOW);
    }

    #[test]
    fn identities_are_counted_separately() {
        let limiter = RateLimiter::new(1);
        let t0 = Instant::now();
        let a = client();
        let b = ClientIdentity::new("203.0.113.9".parse().unwrap(), "curl-like");

        assert!(limiter.allow_at(&a, t0));
        assert!(limiter.allow_at(&b, t0));
        assert!(!limiter.allow_at(&a, t0));
    }

    #[test]
    fn cleanup_drops_closed_windows() {
        let limiter = RateLimiter::new(5);
        let t0 = Instant::now();
        limiter.allow_at(&client(), t0);
        limiter.allow_at(&ClientIdentity::new("198.51.100.1".parse().unwrap(), ""), t0 + Duration::from_secs(30));

        assert_eq!(limiter.cleanup_at(t0 + Duration::from_secs(61)), 1);
        assert_eq!(limiter.tracked(), 1);
    }
}
