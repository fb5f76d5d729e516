//! Counter/histogram/gauge surface.
//!
//! Metrics are registered once at startup against a fixed, closed set of
//! names; calling any recording method with an unregistered name is a
//! programmer error surfaced as a typed `TelemetryError` rather than
//! silently dropped.

use std::collections::HashMap;

use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown counter: {0}")]
    UnknownCounter(String),
    #[error("unknown histogram: {0}")]
    UnknownHistogram(String),
    #[error("unknown gauge: {0}")]
    UnknownGauge(String),
    #[error("metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),
}

/// The closed set of counters the core emits.
pub const COUNTERS: &[(&str, &str, &[&str])] = &[
    ("requests_total", "total intents routed", &["mode"]),
    ("cache_hit_total", "cache hits", &[]),
    ("timed_out_total", "sandbox calls that hit the deadline", &[]),
    (
        "resource_exceeded_total",
        "sandbox calls killed for resource limits",
        &["kind"],
    ),
    ("fallback_total", "hybrid-mode fallbacks to protocol", &[]),
    ("overloaded_total", "requests rejected for overload", &[]),
];

/// The closed set of histograms the core emits.
pub const HISTOGRAMS: &[(&str, &str, &[&str])] = &[
    ("execution_time_ms", "end-to-end execute_intent latency", &["mode"]),
    ("tokens_used", "estimated tokens per request", &[]),
    ("sandbox_wall_time_ms", "sandbox wall-clock time", &[]),
];

/// The closed set of gauges the core emits.
pub const GAUGES: &[(&str, &str, &[&str])] = &[
    ("active_sessions", "sessions currently tracked", &[]),
    ("active_containers", "sandbox calls in flight", &[]),
];

pub struct Metrics {
    registry: Registry,
    counters: HashMap<&'static str, IntCounterVec>,
    histograms: HashMap<&'static str, HistogramVec>,
    gauges: HashMap<&'static str, IntGaugeVec>,
}

impl Metrics {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let mut counters = HashMap::new();
        for (name, help, labels) in COUNTERS {
            let vec = IntCounterVec::new(Opts::new(*name, *help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            counters.insert(*name, vec);
        }

        let mut histograms = HashMap::new();
        for (name, help, labels) in HISTOGRAMS {
            let vec = HistogramVec::new(prometheus::HistogramOpts::new(*name, *help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            histograms.insert(*name, vec);
        }

        let mut gauges = HashMap::new();
        for (name, help, labels) in GAUGES {
            let vec = IntGaugeVec::new(Opts::new(*name, *help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            gauges.insert(*name, vec);
        }

        Ok(Self {
            registry,
            counters,
            histograms,
            gauges,
        })
    }

    pub fn incr_counter(&self, name: &str, labels: &[&str]) -> Result<(), TelemetryError> {
        let vec = self
            .counters
            .get(name)
            .ok_or_else(|| TelemetryError::UnknownCounter(name.to_string()))?;
        vec.with_label_values(labels).inc();
        Ok(())
    }

    pub fn observe_histogram(
        &self,
        name: &str,
        labels: &[&str],
        value: f64,
    ) -> Result<(), TelemetryError> {
        let vec = self
            .histograms
            .get(name)
            .ok_or_else(|| TelemetryError::UnknownHistogram(name.to_string()))?;
        vec.with_label_values(labels).observe(value);
        Ok(())
    }

    pub fn set_gauge(&self, name: &str, labels: &[&str], value: i64) -> Result<(), TelemetryError> {
        let vec = self
            .gauges
            .get(name)
            .ok_or_else(|| TelemetryError::UnknownGauge(name.to_string()))?;
        vec.with_label_values(labels).set(value);
        Ok(())
    }

    pub fn incr_gauge(&self, name: &str, labels: &[&str]) -> Result<(), TelemetryError> {
        let vec = self
            .gauges
            .get(name)
            .ok_or_else(|| TelemetryError::UnknownGauge(name.to_string()))?;
        vec.with_label_values(labels).inc();
        Ok(())
    }

    pub fn decr_gauge(&self, name: &str, labels: &[&str]) -> Result<(), TelemetryError> {
        let vec = self
            .gauges
            .get(name)
            .ok_or_else(|| TelemetryError::UnknownGauge(name.to_string()))?;
        vec.with_label_values(labels).dec();
        Ok(())
    }

    /// Pull-based text export, suitable for a `/metrics` scrape handler the
    /// embedder wires up using `metrics_listen_addr`.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        // TextEncoder::encode only fails on an I/O error, which a Vec<u8>
        // writer cannot produce.
        encoder.encode(&families, &mut buf).expect("encode to Vec cannot fail");
        String::from_utf8(buf).expect("prometheus text format is valid UTF-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("static metric definitions are always valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_counter_rejected() {
        let metrics = Metrics::new().unwrap();
        let err = metrics.incr_counter("does_not_exist", &[]).unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownCounter(_)));
    }

    #[test]
    fn known_counter_increments_and_exports() {
        let metrics = Metrics::new().unwrap();
        metrics.incr_counter("requests_total", &["code_execution"]).unwrap();
        let text = metrics.encode();
        assert!(text.contains("requests_total"));
    }

    #[test]
    fn gauge_can_increment_and_decrement() {
        let metrics = Metrics::new().unwrap();
        metrics.incr_gauge("active_containers", &[]).unwrap();
        metrics.incr_gauge("active_containers", &[]).unwrap();
        metrics.decr_gauge("active_containers", &[]).unwrap();
        let text = metrics.encode();
        assert!(text.contains("active_containers 1"));
    }

    #[test]
    fn histogram_observation_recorded() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_histogram("tokens_used", &[], 42.0).unwrap();
        let text = metrics.encode();
        assert!(text.contains("tokens_used"));
    }
}
