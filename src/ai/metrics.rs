//! Gateway Metrics Collection
//!
//! Process-wide counters for backend usage and cost. Every successful gateway
//! call increments them; they are monotonic and live until process exit.
//! Thread-safe for concurrent agent execution.
//!
//! ## Usage
//!
//! ```ignore
//! metrics::global().record(&usage, cost, latency);
//! let summary = metrics::global().snapshot();
//! ```

use crate::ai::provider::TokenUsage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// =============================================================================
// Metrics Collector
// =============================================================================

/// Lock-free metrics collector.
pub struct MetricsCollector {
    /// Successful backend calls
    api_calls: AtomicU64,
    /// Attempts that failed (including ones later rescued by a fallback)
    failed_attempts: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    total_latency_ms: AtomicU64,
    /// Total cost (stored as microdollars for atomic ops)
    total_cost_micros: AtomicU64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSummary {
    pub api_calls: u64,
    pub failed_attempts: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
    pub total_cost_usd: f64,
}

static GLOBAL: MetricsCollector = MetricsCollector::new();

/// Process-wide collector shared by every gateway
pub fn global() -> &'static MetricsCollector {
    &GLOBAL
}

impl MetricsCollector {
    pub const fn new() -> Self {
        Self {
            api_calls: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            total_cost_micros: AtomicU64::new(0),
        }
    }

    /// Record one successful backend call
    pub fn record(&self, usage: &TokenUsage, cost_usd: f64, latency: Duration) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(usage.prompt_tokens as u64, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(usage.completion_tokens as u64, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);

        let cost_micros = (cost_usd.max(0.0) * 1_000_000.0).round() as u64;
        self.total_cost_micros
            .fetch_add(cost_micros, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSummary {
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let input_tokens = self.input_tokens.load(Ordering::Relaxed);
        let output_tokens = self.output_tokens.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let avg_latency = if api_calls > 0 {
            total_latency as f64 / api_calls as f64
        } else {
            0.0
        };

        MetricsSummary {
            api_calls,
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            avg_latency_ms: avg_latency,
            total_cost_usd: self.total_cost_usd(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSummary {
    /// Format summary for display
    pub fn display(&self) -> String {
        format!(
            "API Calls: {} ({} failed attempts)\n\
             Tokens: {} (input: {}, output: {})\n\
             Avg Latency: {:.0}ms\n\
             Estimated Cost: ${:.4}",
            self.api_calls,
            self.failed_attempts,
            self.total_tokens,
            self.input_tokens,
            self.output_tokens,
            self.avg_latency_ms,
            self.total_cost_usd
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
