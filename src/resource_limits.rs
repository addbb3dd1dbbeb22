//! Request admission: a concurrency cap and per-client fixed-window rate limits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Resource limits for controlling system resource usage
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum concurrent requests (default: 100)
    pub max_concurrent_requests: usize,

    active_requests: Arc<AtomicUsize>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ResourceLimits {
    pub fn new(max_concurrent_requests: usize) -> Self {
        Self {
            max_concurrent_requests,
            active_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Try to acquire a request slot
    /// Returns Ok(RequestGuard) if successful, Err if limit exceeded
    pub fn try_acquire_request(&self) -> Result<RequestGuard, ResourceLimitError> {
        let current = self.active_requests.fetch_add(1, Ordering::SeqCst);

        if current >= self.max_concurrent_requests {
            self.active_requests.fetch_sub(1, Ordering::SeqCst);
            return Err(ResourceLimitError::TooManyRequests {
                current,
                max: self.max_concurrent_requests,
            });
        }

        Ok(RequestGuard {
            counter: self.active_requests.clone(),
        })
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::SeqCst)
    }
}

/// RAII guard that decrements active request counter on drop
pub struct RequestGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Errors related to resource limits
#[derive(Debug, thiserror::Error)]
pub enum ResourceLimitError {
    #[error("Too many concurrent requests: {current}/{max}")]
    TooManyRequests { current: usize, max: usize },

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter keyed by client address.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clients: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn check(&self, client: &str) -> Result<(), ResourceLimitError> {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> Result<(), ResourceLimitError> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entry = clients.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        if entry.count >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(ResourceLimitError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }
        entry.count += 1;
        Ok(())
    }

    /// Drop windows that have expired. Called periodically by the server.
    pub fn prune(&self, now: Instant) -> usize {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = clients.len();
        clients.retain(|_, w| now.duration_since(w.started) < self.window);
        before - clients.len()
    }
}

/// Client identity for rate limiting: first `x-forwarded-for` hop, then `x-real-ip`.
pub fn client_key(forwarded_for: Option<&str>, real_ip: Option<&str>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| real_ip.map(str::trim).filter(|v| !v.is_empty()))
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_guard_releases() {
        let limits = ResourceLimits::new(1);
        let guard = limits.try_acquire_request().unwrap();
        assert!(limits.try_acquire_request().is_err());
        drop(guard);
        assert_eq!(limits.active_requests(), 0);
        assert!(limits.try_acquire_request().is_ok());
    }

    #[test]
    fn test_fixed_window() {
        let limiter = RateLimiter::per_minute(2);
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).is_ok());
        assert!(limiter.check_at("a", t0).is_ok());
        match limiter.check_at("a", t0 + Duration::from_secs(15)) {
            Err(ResourceLimitError::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, 45)
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        // Other clients have their own window
        assert!(limiter.check_at("b", t0).is_ok());
        // Window resets
        assert!(limiter.check_at("a", t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_prune() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let t0 = Instant::now();
        limiter.check_at("a", t0).unwrap();
        limiter.check_at("b", t0 + Duration::from_secs(8)).unwrap();
        assert_eq!(limiter.prune(t0 + Duration::from_secs(11)), 1);
    }

    #[test]
    fn test_client_key() {
        assert_eq!(client_key(Some("10.0.0.1, 172.16.0.1"), Some("1.1.1.1")), "10.0.0.1");
        assert_eq!(client_key(None, Some("1.1.1.1")), "1.1.1.1");
        assert_eq!(client_key(Some(" "), None), "unknown");
    }
}
