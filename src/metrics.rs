//! Request and provider counters.
//!
//! One `ServiceMetrics` lives in the shared server state. Counters are
//! relaxed atomics; the report is a point-in-time snapshot, not a
//! consistent cut across counters.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct ProviderCounters {
    calls: AtomicUsize,
    failures: AtomicUsize,
}

impl ProviderCounters {
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    fn report(&self) -> ProviderReport {
        let calls = self.calls();
        let failures = self.failures().min(calls);
        let success_rate = if calls > 0 {
            ((calls - failures) as f64 / calls as f64) * 100.0
        } else {
            0.0
        };

        ProviderReport {
            calls,
            failures,
            success_rate,
        }
    }
}

#[derive(Debug, Default)]
pub struct ServiceMetrics {
    /// DeepL translation calls
    pub translation: ProviderCounters,

    /// Groq analysis calls (cache hits are not counted as calls)
    pub analysis: ProviderCounters,

    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    sentences_segmented: AtomicUsize,
    feedback_saved: AtomicUsize,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segmented(&self, sentences: usize) {
        self.sentences_segmented
            .fetch_add(sentences, Ordering::Relaxed);
    }

    pub fn record_feedback_saved(&self) {
        self.feedback_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> MetricsReport {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let cache_hit_rate = if lookups > 0 {
            (hits as f64 / lookups as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            translation: self.translation.report(),
            analysis: self.analysis.report(),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate,
            sentences_segmented: self.sentences_segmented.load(Ordering::Relaxed),
            feedback_saved: self.feedback_saved.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReport {
    pub calls: usize,
    pub failures: usize,
    /// Percentage (0-100); 0 when there were no calls
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub translation: ProviderReport,
    pub analysis: ProviderReport,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Percentage (0-100); 0 when the cache was never consulted
    pub cache_hit_rate: f64,
    pub sentences_segmented: usize,
    pub feedback_saved: usize,
}
