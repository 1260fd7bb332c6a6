//! Cache and optimistic-update metrics

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<MetricsInner> = OnceLock::new();

struct MetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    invalidations: CounterVec,
    dropped_stale_responses: CounterVec,
    optimistic_applied: CounterVec,
    rollbacks: CounterVec,
    supersedes: CounterVec,
}

impl MetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("campuslink_cache_hits_total", "Total cache hits"),
                &["query"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new("campuslink_cache_misses_total", "Total cache misses"),
                &["query"],
            )
            .expect("valid metric definition"),
            invalidations: CounterVec::new(
                Opts::new(
                    "campuslink_cache_invalidations_total",
                    "Total cache invalidations",
                ),
                &["query"],
            )
            .expect("valid metric definition"),
            dropped_stale_responses: CounterVec::new(
                Opts::new(
                    "campuslink_cache_dropped_stale_responses_total",
                    "Fetch responses dropped because their query epoch moved on",
                ),
                &["query"],
            )
            .expect("valid metric definition"),
            optimistic_applied: CounterVec::new(
                Opts::new(
                    "campuslink_optimistic_applied_total",
                    "Optimistic predictions applied to the cache",
                ),
                &["operation"],
            )
            .expect("valid metric definition"),
            rollbacks: CounterVec::new(
                Opts::new(
                    "campuslink_optimistic_rollbacks_total",
                    "Optimistic predictions rolled back after a failure",
                ),
                &["operation", "error"],
            )
            .expect("valid metric definition"),
            supersedes: CounterVec::new(
                Opts::new(
                    "campuslink_optimistic_supersedes_total",
                    "In-flight mutations superseded by a newer one on the same entity",
                ),
                &["operation"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.dropped_stale_responses.clone()))?;
        registry.register(Box::new(self.optimistic_applied.clone()))?;
        registry.register(Box::new(self.rollbacks.clone()))?;
        registry.register(Box::new(self.supersedes.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static MetricsInner {
    METRICS.get_or_init(MetricsInner::new)
}

/// Metrics wrapper shared by the cache and the mutation executor
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, query: &str) {
        get_metrics().hits.with_label_values(&[query]).inc();
    }

    pub fn record_miss(&self, query: &str) {
        get_metrics().misses.with_label_values(&[query]).inc();
    }

    pub fn record_invalidations(&self, count: usize) {
        get_metrics()
            .invalidations
            .with_label_values(&["all"])
            .inc_by(count as f64);
    }

    pub fn record_dropped_stale_response(&self, query: &str) {
        get_metrics()
            .dropped_stale_responses
            .with_label_values(&[query])
            .inc();
    }

    pub fn record_optimistic_applied(&self, operation: &str) {
        get_metrics()
            .optimistic_applied
            .with_label_values(&[operation])
            .inc();
    }

    pub fn record_rollback(&self, operation: &str, error: &str) {
        get_metrics()
            .rollbacks
            .with_label_values(&[operation, error])
            .inc();
    }

    pub fn record_supersede(&self, operation: &str) {
        get_metrics().supersedes.with_label_values(&[operation]).inc();
    }
}
