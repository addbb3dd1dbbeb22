//! Circuit breaker for external services (the LLM endpoint).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open { .. } => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Returned without calling the service while the breaker is open.
#[derive(Debug, Error)]
#[error("{service} circuit breaker open")]
pub struct CircuitOpen {
    pub service: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub service: &'static str,
    pub state: &'static str,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    service: &'static str,
    failure_threshold: u32,
    recovery_threshold: u32,
    timeout: Duration,
    state: Arc<RwLock<CircuitState>>,
    failure_count: Arc<AtomicU32>,
    success_count: Arc<RwLock<u32>>,
}

impl CircuitBreaker {
    pub fn new(
        service: &'static str,
        failure_threshold: u32,
        recovery_threshold: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            failure_threshold,
            recovery_threshold,
            timeout,
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            failure_count: Arc::new(AtomicU32::new(0)),
            success_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Execute an async operation through the circuit breaker
    pub async fn call<F, T, E, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: From<CircuitOpen>,
    {
        let state = *self.state.read().await;
        if let CircuitState::Open { opened_at } = state {
            if opened_at.elapsed() >= self.timeout {
                *self.state.write().await = CircuitState::HalfOpen;
                *self.success_count.write().await = 0;
                tracing::info!(service = self.service, "Circuit breaker transitioning to half-open");
            } else {
                return Err(E::from(CircuitOpen {
                    service: self.service,
                }));
            }
        }

        match f().await {
            Ok(val) => {
                self.record_success().await;
                Ok(val)
            }
            Err(err) => {
                self.record_failure().await;
                Err(err)
            }
        }
    }

    pub async fn status(&self) -> BreakerStatus {
        BreakerStatus {
            service: self.service,
            state: self.state.read().await.as_str(),
            consecutive_failures: self.failure_count.load(Ordering::Relaxed),
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.write().await;
        match *state {
            CircuitState::HalfOpen => {
                let mut success = self.success_count.write().await;
                *success += 1;
                if *success >= self.recovery_threshold {
                    *state = CircuitState::Closed;
                    self.failure_count.store(0, Ordering::Relaxed);
                    tracing::info!(service = self.service, "Circuit breaker recovered (closed)");
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    async fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.write().await;
        // A failed half-open trial reopens immediately.
        let trip = match *state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => failures >= self.failure_threshold,
            CircuitState::Open { .. } => false,
        };
        if trip {
            *state = CircuitState::Open {
                opened_at: Instant::now(),
            };
            tracing::warn!(service = self.service, failures, "Circuit breaker tripped (open)");
        }
    }
}
