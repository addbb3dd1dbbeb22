//! Server state: shared resources handed to every request handler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::CrmConfig;
use crate::error::ErrorCategory;
use crate::error_recovery::CircuitBreaker;
use crate::llm::{LanguageModel, OllamaClient};
use crate::resource_limits::{RateLimiter, ResourceLimits};
use crate::storage::PgStorage;

/// Global server state, shared as `Arc<AppState>`.
pub struct AppState {
    pub config: Arc<CrmConfig>,
    pub storage: PgStorage,
    /// `None` when `[llm] enabled = false`; callers fall back to heuristics.
    pub llm: Option<Arc<dyn LanguageModel>>,
    /// Breaker shared with the LLM client, kept here for health reporting.
    pub llm_breaker: CircuitBreaker,
    pub limits: ResourceLimits,
    pub rate_limiter: RateLimiter,
    /// Stricter limiter for notification creation
    pub notification_limiter: RateLimiter,
    pub metrics: Arc<ServiceMetrics>,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: CrmConfig, storage: PgStorage, shutdown: CancellationToken) -> anyhow::Result<Self> {
        // LLM: 5 failures open the breaker, 2 successes close it, 30s before retrying
        let llm_breaker = CircuitBreaker::new("llm", 5, 2, Duration::from_secs(30));
        let llm: Option<Arc<dyn LanguageModel>> = if config.llm.enabled {
            let client = OllamaClient::new(&config.llm, llm_breaker.clone())?;
            tracing::info!(endpoint = %config.llm.endpoint, model = %config.llm.model, "LLM client configured");
            Some(Arc::new(client))
        } else {
            tracing::info!("LLM disabled, heuristic analysis only");
            None
        };

        Ok(Self {
            limits: ResourceLimits::new(config.server.max_concurrent_requests),
            rate_limiter: RateLimiter::per_minute(config.server.rate_limit_per_minute),
            notification_limiter: RateLimiter::per_minute(config.server.notification_writes_per_minute),
            config: Arc::new(config),
            storage,
            llm,
            llm_breaker,
            metrics: Arc::new(ServiceMetrics::new()),
            started_at: Instant::now(),
            shutdown,
        })
    }

    pub fn llm(&self) -> Option<&dyn LanguageModel> {
        self.llm.as_deref()
    }

    pub fn jwt_secret(&self) -> &str {
        self.config.auth.secret()
    }
}

/// Lock-free runtime counters for the service process.
#[derive(Default)]
pub struct ServiceMetrics {
    pub requests_served: AtomicUsize,
    /// Cumulative request latency in microseconds (divide by requests_served for avg)
    pub request_latency_us: AtomicUsize,
    pub validation_errors: AtomicUsize,
    pub database_errors: AtomicUsize,
    pub unexpected_errors: AtomicUsize,
    pub tasks_generated: AtomicUsize,
    pub calls_analyzed: AtomicUsize,
    pub llm_failures: AtomicUsize,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, latency_us: usize) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        self.request_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn record_error(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::Validation => &self.validation_errors,
            ErrorCategory::Database => &self.database_errors,
            ErrorCategory::Unexpected => &self.unexpected_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tasks(&self, count: usize) {
        self.tasks_generated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_call(&self) {
        self.calls_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_llm_failure(&self) {
        self.llm_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_latency_us(&self) -> usize {
        let requests = self.requests_served.load(Ordering::Relaxed);
        if requests > 0 {
            self.request_latency_us.load(Ordering::Relaxed) / requests
        } else {
            0
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "requests_served": self.requests_served.load(Ordering::Relaxed),
            "avg_request_latency_us": self.avg_latency_us(),
            "errors": {
                "validation": self.validation_errors.load(Ordering::Relaxed),
                "database": self.database_errors.load(Ordering::Relaxed),
                "unexpected": self.unexpected_errors.load(Ordering::Relaxed),
            },
            "tasks_generated": self.tasks_generated.load(Ordering::Relaxed),
            "calls_analyzed": self.calls_analyzed.load(Ordering::Relaxed),
            "llm_failures": self.llm_failures.load(Ordering::Relaxed),
        })
    }

    /// Export metrics in Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP ooak_requests_served_total Total HTTP requests served.\n\
             # TYPE ooak_requests_served_total counter\n\
             ooak_requests_served_total {}\n\
             # HELP ooak_request_latency_avg_us Average request latency in microseconds.\n\
             # TYPE ooak_request_latency_avg_us gauge\n\
             ooak_request_latency_avg_us {}\n\
             # HELP ooak_errors_total Failed requests by error category.\n\
             # TYPE ooak_errors_total counter\n\
             ooak_errors_total{{category=\"validation\"}} {}\n\
             ooak_errors_total{{category=\"database\"}} {}\n\
             ooak_errors_total{{category=\"unexpected\"}} {}\n\
             # HELP ooak_tasks_generated_total Tasks created by rules and call analysis.\n\
             # TYPE ooak_tasks_generated_total counter\n\
             ooak_tasks_generated_total {}\n\
             # HELP ooak_calls_analyzed_total Call transcriptions analysed.\n\
             # TYPE ooak_calls_analyzed_total counter\n\
             ooak_calls_analyzed_total {}\n\
             # HELP ooak_llm_failures_total LLM requests that failed or were refused.\n\
             # TYPE ooak_llm_failures_total counter\n\
             ooak_llm_failures_total {}\n",
            self.requests_served.load(Ordering::Relaxed),
            self.avg_latency_us(),
            self.validation_errors.load(Ordering::Relaxed),
            self.database_errors.load(Ordering::Relaxed),
            self.unexpected_errors.load(Ordering::Relaxed),
            self.tasks_generated.load(Ordering::Relaxed),
            self.calls_analyzed.load(Ordering::Relaxed),
            self.llm_failures.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_latency() {
        let metrics = ServiceMetrics::new();
        assert_eq!(metrics.snapshot()["avg_request_latency_us"], 0);

        metrics.record_request(100);
        metrics.record_request(300);
        let snap = metrics.snapshot();
        assert_eq!(snap["requests_served"], 2);
        assert_eq!(snap["avg_request_latency_us"], 200);
    }

    #[test]
    fn test_errors_by_category() {
        let metrics = ServiceMetrics::new();
        metrics.record_error(ErrorCategory::Validation);
        metrics.record_error(ErrorCategory::Validation);
        metrics.record_error(ErrorCategory::Database);

        let text = metrics.to_prometheus();
        assert!(text.contains("ooak_errors_total{category=\"validation\"} 2"));
        assert!(text.contains("ooak_errors_total{category=\"database\"} 1"));
        assert!(text.contains("ooak_errors_total{category=\"unexpected\"} 0"));
    }

    #[test]
    fn test_prometheus_counters() {
        let metrics = ServiceMetrics::new();
        metrics.record_tasks(3);
        metrics.record_call();
        metrics.record_llm_failure();

        let text = metrics.to_prometheus();
        assert!(text.contains("ooak_tasks_generated_total 3"));
        assert!(text.contains("ooak_calls_analyzed_total 1"));
        assert!(text.contains("ooak_llm_failures_total 1"));
        assert!(text.ends_with('\n'));
    }
}
