use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Type of metric.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
}

/// Point-in-time value of one metric series.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
    pub value: i64,
    pub metric_type: MetricType,
}

/// Metric key: name + labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            name: name.to_string(),
            labels: sorted,
        }
    }
}

/// Thread-safe in-memory counters and gauges.
///
/// Broadcast outcomes have no caller to report to, so they are tallied
/// here and exposed over `GET /metrics`.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: RwLock<HashMap<MetricKey, AtomicU64>>,
    gauges: RwLock<HashMap<MetricKey, AtomicI64>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = MetricKey::new(name, labels);
        if let Some(counter) = self.counters.read().get(&key) {
            counter.fetch_add(n, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        let key = MetricKey::new(name, labels);
        if let Some(gauge) = self.gauges.read().get(&key) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(key)
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .read()
            .get(&MetricKey::new(name, labels))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<i64> {
        self.gauges
            .read()
            .get(&MetricKey::new(name, labels))
            .map(|g| g.load(Ordering::Relaxed))
    }

    /// All series, sorted by name then labels.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        for (key, counter) in self.counters.read().iter() {
            samples.push(sample(key, counter.load(Ordering::Relaxed) as i64, MetricType::Counter));
        }
        for (key, gauge) in self.gauges.read().iter() {
            samples.push(sample(key, gauge.load(Ordering::Relaxed), MetricType::Gauge));
        }
        samples.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        samples
    }
}

fn sample(key: &MetricKey, value: i64, metric_type: MetricType) -> MetricSample {
    MetricSample {
        name: key.name.clone(),
        labels: key.labels.iter().cloned().collect(),
        value,
        metric_type,
    }
}
