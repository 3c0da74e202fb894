use std::collections::BTreeMap;
use std::fmt::Write;

use parking_lot::Mutex;

pub const DECISIONS_TOTAL: &str = "lmguard_decisions_total";
pub const STAGE_LATENCY_MS: &str = "lmguard_stage_latency_ms";
pub const AGENT_CALLS_TOTAL: &str = "lmguard_agent_calls_total";
pub const AGENT_FAILURES_TOTAL: &str = "lmguard_agent_failures_total";
pub const CACHE_HITS_TOTAL: &str = "lmguard_cache_hits_total";
pub const SCANNER_FAILURES_TOTAL: &str = "lmguard_scanner_failures_total";

/// Side-channel counters and timings. Calls must be cheap and infallible.
pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &'static str, labels: &[(&'static str, &str)]);
    fn observe_ms(&self, name: &'static str, labels: &[(&'static str, &str)], value: u64);
}

#[derive(Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn counter(&self, _name: &'static str, _labels: &[(&'static str, &str)]) {}

    fn observe_ms(&self, _name: &'static str, _labels: &[(&'static str, &str)], _value: u64) {}
}

type SeriesKey = (&'static str, Vec<(&'static str, String)>);

#[derive(Default)]
struct Summary {
    count: u64,
    sum: u64,
}

#[derive(Default)]
struct Registry {
    counters: BTreeMap<SeriesKey, u64>,
    summaries: BTreeMap<SeriesKey, Summary>,
}

/// Keeps every series in memory and renders Prometheus text exposition.
/// Timings are exported as `_sum`/`_count` pairs.
#[derive(Default)]
pub struct InMemoryMetrics {
    registry: Mutex<Registry>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_value(&self, name: &'static str, labels: &[(&'static str, &str)]) -> u64 {
        self.registry
            .lock()
            .counters
            .get(&key(name, labels))
            .copied()
            .unwrap_or(0)
    }

    pub fn observation_count(&self, name: &'static str, labels: &[(&'static str, &str)]) -> u64 {
        self.registry
            .lock()
            .summaries
            .get(&key(name, labels))
            .map(|s| s.count)
            .unwrap_or(0)
    }

    pub fn render(&self) -> String {
        let registry = self.registry.lock();
        let mut out = String::new();
        let mut last = "";
        for ((name, labels), value) in &registry.counters {
            if *name != last {
                let _ = writeln!(out, "# TYPE {name} counter");
                last = *name;
            }
            let _ = writeln!(out, "{name}{} {value}", render_labels(labels));
        }
        last = "";
        for ((name, labels), summary) in &registry.summaries {
            if *name != last {
                let _ = writeln!(out, "# TYPE {name} summary");
                last = *name;
            }
            let labels = render_labels(labels);
            let _ = writeln!(out, "{name}_sum{labels} {}", summary.sum);
            let _ = writeln!(out, "{name}_count{labels} {}", summary.count);
        }
        out
    }
}

impl MetricsSink for InMemoryMetrics {
    fn counter(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        *self
            .registry
            .lock()
            .counters
            .entry(key(name, labels))
            .or_default() += 1;
    }

    fn observe_ms(&self, name: &'static str, labels: &[(&'static str, &str)], value: u64) {
        let mut registry = self.registry.lock();
        let summary = registry.summaries.entry(key(name, labels)).or_default();
        summary.count += 1;
        summary.sum += value;
    }
}

fn key(name: &'static str, labels: &[(&'static str, &str)]) -> SeriesKey {
    let mut labels: Vec<(&'static str, String)> =
        labels.iter().map(|(k, v)| (*k, v.to_string())).collect();
    labels.sort();
    (name, labels)
}

fn render_labels(labels: &[(&'static str, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let body = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{body}}}")
}
