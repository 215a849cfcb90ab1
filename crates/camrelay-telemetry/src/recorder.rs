//! Prometheus metrics recorder and the text served on `/metrics`.

use metrics::{counter, gauge, histogram, Label};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

/// Prometheus recorder owned by one process (or one test).
///
/// Not installed globally: every call records into this instance through
/// [`metrics::with_local_recorder`], so two recorders never see each other's
/// samples.
pub struct MetricsRecorder {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder").finish_non_exhaustive()
    }
}

/// Labels sorted by key so call sites may list them in any order.
fn sorted_labels(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut sorted: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
}

fn to_labels(labels: &[(&str, &str)]) -> Vec<Label> {
    sorted_labels(labels)
        .into_iter()
        .map(|(k, v)| Label::new(k, v))
        .collect()
}

/// Series identifier as it appears in the exposition text,
/// e.g. `camrelay_sessions_closed_total{reason="shutdown"}`.
fn series(name: &str, labels: &[(&str, &str)]) -> String {
    let labels = sorted_labels(labels);
    if labels.is_empty() {
        return name.to_string();
    }
    let pairs: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    format!("{name}{{{}}}", pairs.join(","))
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self { recorder, handle }
    }

    /// Increment a counter by n.
    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let labels = to_labels(labels);
        metrics::with_local_recorder(&self.recorder, || {
            counter!(name.to_string(), labels).increment(n);
        });
    }

    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let labels = to_labels(labels);
        metrics::with_local_recorder(&self.recorder, || {
            gauge!(name.to_string(), labels).set(value);
        });
    }

    /// Move a gauge by `delta`, which may be negative.
    pub fn gauge_inc(&self, name: &str, labels: &[(&str, &str)], delta: f64) {
        let labels = to_labels(labels);
        metrics::with_local_recorder(&self.recorder, || {
            let gauge = gauge!(name.to_string(), labels);
            if delta < 0.0 {
                gauge.decrement(-delta);
            } else {
                gauge.increment(delta);
            }
        });
    }

    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let labels = to_labels(labels);
        metrics::with_local_recorder(&self.recorder, || {
            histogram!(name.to_string(), labels).record(value);
        });
    }

    /// Prometheus exposition text for every metric recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Current value of a counter, 0 if it was never incremented.
    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.sample(name, labels).map_or(0, |v| v as u64)
    }

    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.sample(name, labels).unwrap_or(0.0)
    }

    /// Number of observations a histogram has seen.
    pub fn histogram_count(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.sample(&format!("{name}_count"), labels)
            .map_or(0, |v| v as u64)
    }

    pub fn histogram_sum(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.sample(&format!("{name}_sum"), labels).unwrap_or(0.0)
    }

    fn sample(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let wanted = series(name, labels);
        self.render()
            .lines()
            .filter(|line| !line.starts_with('#'))
            .find_map(|line| {
                let (key, value) = line.rsplit_once(' ')?;
                if key == wanted {
                    value.parse().ok()
                } else {
                    None
                }
            })
    }
}
