//! Metric aggregation — concurrent trends and rates with on-demand summaries.
//!
//! The [`MetricRegistry`] is one of only two shared mutable resources in the
//! engine (the other being the VU pool, which only the orchestrator touches).
//! Every VU records into it on every request, so writes must not funnel
//! through a single lock: the name table is behind a read-write lock that is
//! almost always taken in read mode, and each metric has its own mutex.
//! VUs recording different metrics never contend with each other.
//!
//! Trends retain every sample so percentiles are exact (nearest-rank).
//! Memory therefore grows linearly with sample count; for multi-hour soak
//! runs, summarize and swap in a fresh registry between reporting intervals
//! rather than letting one registry accumulate the whole run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Built-in rate tracking check failures and scenario iteration errors.
pub const ERRORS_RATE: &str = "errors";
/// Built-in rate with one sample per evaluated check predicate.
pub const CHECKS_RATE: &str = "checks";
/// Built-in trend of full scenario iteration durations, in milliseconds.
pub const ITERATION_DURATION: &str = "iteration_duration";
/// Built-in trend sampling the active VU count once per reconciliation tick.
pub const VUS_TREND: &str = "vus";

/// One numeric observation, timestamped relative to registry creation
/// (tokio clock, so timestamps stay deterministic under a paused test
/// clock). Written once at record time, never mutated.
#[derive(Clone, Copy, Debug)]
pub struct Sample {
    pub value: f64,
    pub at: Duration,
}

#[derive(Debug, Default)]
struct TrendData {
    samples: Vec<Sample>,
}

#[derive(Debug, Default)]
struct RateData {
    total: u64,
    trues: u64,
}

/// Thread-safe accumulator for numeric samples (trends) and boolean
/// outcomes (rates).
///
/// Summaries are computed from a consistent per-metric snapshot at query
/// time; every write that returned before the query call is included.
#[derive(Debug)]
pub struct MetricRegistry {
    epoch: Instant,
    trends: RwLock<HashMap<String, Arc<Mutex<TrendData>>>>,
    rates: RwLock<HashMap<String, Arc<Mutex<RateData>>>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            trends: RwLock::new(HashMap::new()),
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// Record one numeric sample into the named trend.
    pub fn trend(&self, name: &str, value: f64) {
        let cell = self.trend_cell(name);
        cell.lock().samples.push(Sample {
            value,
            at: self.epoch.elapsed(),
        });
    }

    /// Record one boolean outcome into the named rate.
    pub fn rate(&self, name: &str, hit: bool) {
        let cell = self.rate_cell(name);
        let mut data = cell.lock();
        data.total += 1;
        if hit {
            data.trues += 1;
        }
    }

    fn trend_cell(&self, name: &str) -> Arc<Mutex<TrendData>> {
        if let Some(cell) = self.trends.read().get(name) {
            return cell.clone();
        }
        self.trends.write().entry(name.to_owned()).or_default().clone()
    }

    fn rate_cell(&self, name: &str) -> Arc<Mutex<RateData>> {
        if let Some(cell) = self.rates.read().get(name) {
            return cell.clone();
        }
        self.rates.write().entry(name.to_owned()).or_default().clone()
    }

    /// Raw timestamped samples of one trend, for interval reporting or
    /// custom summaries; `None` if the trend does not exist.
    pub fn trend_samples(&self, name: &str) -> Option<Vec<Sample>> {
        let cell = self.trends.read().get(name)?.clone();
        let samples = cell.lock().samples.clone();
        Some(samples)
    }

    /// Summarize one trend; `None` if it holds no samples.
    pub fn trend_summary(&self, name: &str) -> Option<TrendSummary> {
        let cell = self.trends.read().get(name)?.clone();
        let data = cell.lock();
        TrendSummary::from_samples(&data.samples)
    }

    /// Summarize one rate; `None` if it holds no samples.
    pub fn rate_summary(&self, name: &str) -> Option<RateSummary> {
        let cell = self.rates.read().get(name)?.clone();
        let data = cell.lock();
        RateSummary::from_counts(data.total, data.trues)
    }

    /// Summaries for every metric that has at least one sample.
    pub fn summary(&self) -> MetricsSummary {
        let trend_cells: Vec<(String, Arc<Mutex<TrendData>>)> = self
            .trends
            .read()
            .iter()
            .map(|(name, cell)| (name.clone(), cell.clone()))
            .collect();
        let rate_cells: Vec<(String, Arc<Mutex<RateData>>)> = self
            .rates
            .read()
            .iter()
            .map(|(name, cell)| (name.clone(), cell.clone()))
            .collect();

        let mut trends = BTreeMap::new();
        for (name, cell) in trend_cells {
            let data = cell.lock();
            if let Some(summary) = TrendSummary::from_samples(&data.samples) {
                trends.insert(name, summary);
            }
        }
        let mut rates = BTreeMap::new();
        for (name, cell) in rate_cells {
            let data = cell.lock();
            if let Some(summary) = RateSummary::from_counts(data.total, data.trues) {
                rates.insert(name, summary);
            }
        }
        MetricsSummary { trends, rates }
    }
}

/// Statistics derived lazily from a trend's accumulated samples.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl TrendSummary {
    fn from_samples(samples: &[Sample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let sum: f64 = values.iter().sum();
        Some(Self {
            count: values.len() as u64,
            min: values[0],
            max: values[values.len() - 1],
            mean: sum / values.len() as f64,
            p90: nearest_rank(&values, 90.0),
            p95: nearest_rank(&values, 95.0),
            p99: nearest_rank(&values, 99.0),
        })
    }
}

/// Fraction of true outcomes among a rate's accumulated samples.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub count: u64,
    /// Fraction of samples that were true, in `[0, 1]`.
    pub rate: f64,
}

impl RateSummary {
    fn from_counts(total: u64, trues: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        Some(Self {
            count: total,
            rate: trues as f64 / total as f64,
        })
    }
}

/// Every per-metric summary for one run, keyed by metric name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub trends: BTreeMap<String, TrendSummary>,
    pub rates: BTreeMap<String, RateSummary>,
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = (percentile / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_trend_writes_are_all_counted() {
        let registry = Arc::new(MetricRegistry::new());
        let writers: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        registry.trend("latency", (t * 1_000 + i) as f64);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(registry.trend_summary("latency").unwrap().count, 8_000);
    }

    #[test]
    fn nearest_rank_percentiles_over_known_values() {
        let registry = MetricRegistry::new();
        for v in 1..=100 {
            registry.trend("t", v as f64);
        }
        let summary = registry.trend_summary("t").unwrap();
        assert_eq!(summary.count, 100);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 100.0);
        assert_eq!(summary.mean, 50.5);
        assert_eq!(summary.p90, 90.0);
        assert_eq!(summary.p95, 95.0);
        assert_eq!(summary.p99, 99.0);
    }

    #[test]
    fn single_sample_summary() {
        let registry = MetricRegistry::new();
        registry.trend("t", 42.0);
        let summary = registry.trend_summary("t").unwrap();
        assert_eq!(summary.min, 42.0);
        assert_eq!(summary.p99, 42.0);
    }

    #[test]
    fn rate_fraction_is_exact() {
        let registry = MetricRegistry::new();
        registry.rate("errors", true);
        registry.rate("errors", true);
        registry.rate("errors", true);
        registry.rate("errors", false);
        let summary = registry.rate_summary("errors").unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.rate, 0.75);
    }

    #[tokio::test(start_paused = true)]
    async fn samples_carry_clock_relative_timestamps() {
        let registry = MetricRegistry::new();
        registry.trend("t", 1.0);
        tokio::time::advance(Duration::from_millis(5)).await;
        registry.trend("t", 2.0);

        let samples = registry.trend_samples("t").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].at, Duration::ZERO);
        assert_eq!(samples[1].at, Duration::from_millis(5));
        assert!(registry.trend_samples("nope").is_none());
    }

    #[test]
    fn unknown_metrics_summarize_to_none() {
        let registry = MetricRegistry::new();
        assert!(registry.trend_summary("nope").is_none());
        assert!(registry.rate_summary("nope").is_none());
    }

    #[test]
    fn summary_collects_every_recorded_metric() {
        let registry = MetricRegistry::new();
        registry.trend("timing_registry", 12.5);
        registry.trend("timing_package", 3.0);
        registry.rate("errors", false);
        let summary = registry.summary();
        assert_eq!(summary.trends.len(), 2);
        assert!(summary.trends.contains_key("timing_registry"));
        assert_eq!(summary.rates["errors"].rate, 0.0);
    }
}
