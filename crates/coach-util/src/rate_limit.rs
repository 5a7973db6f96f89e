//! Per-client request throttling

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Token bucket keyed by IPC client
#[derive(Debug)]
pub struct RateLimiter {
    max_tokens: u32,
    refill_interval: Duration,
    clients: HashMap<ClientId, ClientBucket>,
}

#[derive(Debug)]
struct ClientBucket {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    /// Allow `max_requests` per `interval` for each client
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_tokens: max_requests,
            refill_interval: interval,
            clients: HashMap::new(),
        }
    }

    /// Consume a token for `client_id`; `false` means the request is throttled
    pub fn check(&mut self, client_id: &ClientId) -> bool {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&mut self, client_id: &ClientId, now: Instant) -> bool {
        let max_tokens = self.max_tokens;
        let bucket = self.clients.entry(client_id.clone()).or_insert(ClientBucket {
            tokens: max_tokens,
            last_refill: now,
        });

        if now.duration_since(bucket.last_refill) >= self.refill_interval {
            bucket.tokens = max_tokens;
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Forget a disconnected client
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_throttles() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(1));
        let client = ClientId::new();

        for _ in 0..3 {
            assert!(limiter.check(&client));
        }
        assert!(!limiter.check(&client));
    }

    #[test]
    fn buckets_are_per_client() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a = ClientId::new();
        let b = ClientId::new();

        assert!(limiter.check(&a));
        assert!(!limiter.check(&a));
        assert!(limiter.check(&b));
    }

    #[test]
    fn refills_after_interval() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(500));
        let client = ClientId::new();
        let start = Instant::now();

        assert!(limiter.check_at(&client, start));
        assert!(!limiter.check_at(&client, start + Duration::from_millis(100)));
        assert!(limiter.check_at(&client, start + Duration::from_millis(600)));
    }

    #[test]
    fn remove_client_drops_state() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(1));
        let client = ClientId::new();
        limiter.check(&client);
        assert_eq!(limiter.tracked_clients(), 1);

        limiter.remove_client(&client);
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
