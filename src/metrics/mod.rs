//! Lock-free dispatch and routing metrics.
//!
//! Every counter is a plain `AtomicU64` updated with `Ordering::Relaxed` — a
//! consistent snapshot across all fields is not required (callers tolerate
//! mild skew between counters read a few nanoseconds apart), so nothing here
//! pays for a lock.
//!
//! Latency is tracked as an exponentially-weighted moving average rather than
//! a full histogram, stored as an `f64` bit-pattern inside an `AtomicU64` and
//! updated via `fetch_update` — the same lock-free style as the counters,
//! just with a decode/encode step around the arithmetic.

use std::sync::atomic::{AtomicU64, Ordering};

const EWMA_ALPHA: f64 = 0.1;

#[derive(Debug, Default)]
struct EwmaNanos {
    bits: AtomicU64,
}

impl EwmaNanos {
    fn record(&self, sample_ns: u64) {
        let sample = sample_ns as f64;
        let _ = self.bits.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev_bits| {
            let prev = f64::from_bits(prev_bits);
            let next = if prev_bits == 0 {
                sample
            } else {
                EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * prev
            };
            Some(next.to_bits())
        });
    }

    fn read(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// A consistent-enough point-in-time read of every counter and latency
/// average. Individual fields may have been updated microseconds apart from
/// each other — this is a snapshot, not a transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub static_hits: u64,
    pub dynamic_hits: u64,
    pub not_found: u64,
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub static_lookup_ewma_ns: f64,
    pub dynamic_lookup_ewma_ns: f64,
    pub dispatch_ewma_ns: f64,
}

/// Atomic counters and latency accumulators for one router/dispatcher.
#[derive(Debug, Default)]
pub struct Metrics {
    total_lookups: AtomicU64,
    cache_hits: AtomicU64,
    static_hits: AtomicU64,
    dynamic_hits: AtomicU64,
    not_found: AtomicU64,
    total_requests: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    static_lookup_latency: EwmaNanos,
    dynamic_lookup_latency: EwmaNanos,
    dispatch_latency: EwmaNanos,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup(&self) {
        self.total_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_static_hit(&self, latency_ns: u64) {
        self.static_hits.fetch_add(1, Ordering::Relaxed);
        self.static_lookup_latency.record(latency_ns);
    }

    pub fn record_dynamic_hit(&self, latency_ns: u64) {
        self.dynamic_hits.fetch_add(1, Ordering::Relaxed);
        self.dynamic_lookup_latency.record(latency_ns);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self, succeeded: bool, latency_ns: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.dispatch_latency.record(latency_ns);
    }

    /// Reads every counter and latency average into one value. Not
    /// transactionally consistent across fields — see the module docs.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_lookups: self.total_lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            static_hits: self.static_hits.load(Ordering::Relaxed),
            dynamic_hits: self.dynamic_hits.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            static_lookup_ewma_ns: self.static_lookup_latency.read(),
            dynamic_lookup_ewma_ns: self.dynamic_lookup_latency.read(),
            dispatch_ewma_ns: self.dispatch_latency.read(),
        }
    }
}
