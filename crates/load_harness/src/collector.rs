//! Results collection and percentile aggregation (spec.md §4.6, grounded in
//! `original_source/services/voice-gateway/tests/load/collector.py`'s
//! `RequestResult` / `AggregateStats` / `ResultsCollector`).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Outcome of a single virtual user's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Success,
    Error,
    Timeout,
}

/// Timing and outcome of one complete turn driven through the gateway,
/// mirroring `RequestResult`'s fields.
#[derive(Debug, Clone, Serialize)]
pub struct RequestResult {
    pub worker_id: u32,
    pub request_id: u32,
    pub audio_file: String,

    pub start: Instant,
    pub end: Instant,

    pub asr_latency: Option<Duration>,
    pub llm_ttft: Option<Duration>,
    pub llm_total: Option<Duration>,
    pub tts_latency: Option<Duration>,
    pub e2e_latency: Option<Duration>,

    pub status: RequestStatus,
    pub error_message: Option<String>,
}

impl RequestResult {
    pub fn total_duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Count/min/max/mean/median/p90/p95/p99/stddev over a set of latency
/// samples, computed exactly as `AggregateStats.from_values`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub stddev: f64,
}

impl AggregateStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = sorted.len();

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = percentile(&sorted, 0.50);
        let stddev = if n > 1 {
            let variance =
                sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Self {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
            p90: percentile(&sorted, 0.90),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            stddev,
        }
    }
}

/// `sorted[floor(n * q)]`, clamped for n == 1 -- matches the Python
/// reference's `sorted_values[int(n * q)] if n > 1 else sorted_values[0]`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() <= 1 {
        return sorted[0];
    }
    let idx = ((sorted.len() as f64) * q) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Full report produced at the end of a run, matching
/// `ResultsCollector.generate_report`'s shape closely enough to stay a
/// drop-in replacement for downstream tooling.
#[derive(Debug, Serialize)]
pub struct Report {
    pub total_duration_seconds: f64,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub timeout_requests: usize,
    pub success_rate: f64,
    pub requests_per_second: f64,
    pub latency: LatencyReport,
    pub errors: Vec<ErrorTally>,
}

#[derive(Debug, Default, Serialize)]
pub struct LatencyReport {
    pub e2e: Option<AggregateStats>,
    pub asr: Option<AggregateStats>,
    pub llm_ttft: Option<AggregateStats>,
    pub llm_total: Option<AggregateStats>,
    pub tts: Option<AggregateStats>,
    pub total_duration: Option<AggregateStats>,
}

#[derive(Debug, Serialize)]
pub struct ErrorTally {
    pub message: String,
    pub count: usize,
}

/// Thread-safe accumulator virtual users report results into.
pub struct ResultsCollector {
    results: Mutex<Vec<RequestResult>>,
    start: Instant,
}

impl ResultsCollector {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
            start: Instant::now(),
        }
    }

    pub fn add_result(&self, result: RequestResult) {
        self.results.lock().unwrap().push(result);
    }

    pub fn generate_report(&self) -> Report {
        let results = self.results.lock().unwrap();
        let total_duration = self.start.elapsed().as_secs_f64();

        let success: Vec<&RequestResult> = results
            .iter()
            .filter(|r| r.status == RequestStatus::Success)
            .collect();
        let failed = results
            .iter()
            .filter(|r| r.status == RequestStatus::Error)
            .count();
        let timed_out = results
            .iter()
            .filter(|r| r.status == RequestStatus::Timeout)
            .count();

        let collect = |f: fn(&RequestResult) -> Option<Duration>| -> Vec<f64> {
            success
                .iter()
                .filter_map(|r| f(r).map(|d| d.as_secs_f64()))
                .collect()
        };

        let latency = LatencyReport {
            e2e: non_empty_stats(&collect(|r| r.e2e_latency)),
            asr: non_empty_stats(&collect(|r| r.asr_latency)),
            llm_ttft: non_empty_stats(&collect(|r| r.llm_ttft)),
            llm_total: non_empty_stats(&collect(|r| r.llm_total)),
            tts: non_empty_stats(&collect(|r| r.tts_latency)),
            total_duration: non_empty_stats(
                &success.iter().map(|r| r.total_duration().as_secs_f64()).collect::<Vec<_>>(),
            ),
        };

        let mut tally: Vec<(String, usize)> = Vec::new();
        for r in results.iter().filter(|r| r.status == RequestStatus::Error) {
            let msg = r.error_message.clone().unwrap_or_else(|| "Unknown error".to_string());
            match tally.iter_mut().find(|(m, _)| *m == msg) {
                Some((_, count)) => *count += 1,
                None => tally.push((msg, 1)),
            }
        }
        tally.sort_by(|a, b| b.1.cmp(&a.1));
        let errors = tally
            .into_iter()
            .map(|(message, count)| ErrorTally { message, count })
            .collect();

        let total = results.len();
        Report {
            total_duration_seconds: total_duration,
            total_requests: total,
            successful_requests: success.len(),
            failed_requests: failed,
            timeout_requests: timed_out,
            success_rate: if total > 0 { success.len() as f64 / total as f64 } else { 0.0 },
            requests_per_second: if total_duration > 0.0 { total as f64 / total_duration } else { 0.0 },
            latency,
            errors,
        }
    }
}

impl Default for ResultsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_stats(values: &[f64]) -> Option<AggregateStats> {
    if values.is_empty() {
        None
    } else {
        Some(AggregateStats::from_values(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_stats_of_empty_is_default() {
        let stats = AggregateStats::from_values(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn aggregate_stats_single_value() {
        let stats = AggregateStats::from_values(&[1.5]);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.min, 1.5);
        assert_eq!(stats.max, 1.5);
        assert_eq!(stats.p99, 1.5);
    }

    #[test]
    fn aggregate_stats_percentiles_over_ordered_values() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let stats = AggregateStats::from_values(&values);
        assert_eq!(stats.count, 100);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 100.0);
        assert_eq!(stats.p90, values[90]);
        assert_eq!(stats.p99, values[99]);
    }

    #[test]
    fn report_on_no_results_has_zeroed_summary() {
        let collector = ResultsCollector::new();
        let report = collector.generate_report();
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.success_rate, 0.0);
    }

    #[test]
    fn report_aggregates_success_and_error_counts() {
        let collector = ResultsCollector::new();
        collector.add_result(RequestResult {
            worker_id: 0,
            request_id: 0,
            audio_file: "a.wav".to_string(),
            start: Instant::now(),
            end: Instant::now(),
            asr_latency: Some(Duration::from_millis(100)),
            llm_ttft: Some(Duration::from_millis(200)),
            llm_total: Some(Duration::from_millis(500)),
            tts_latency: Some(Duration::from_millis(150)),
            e2e_latency: Some(Duration::from_millis(350)),
            status: RequestStatus::Success,
            error_message: None,
        });
        collector.add_result(RequestResult {
            worker_id: 0,
            request_id: 1,
            audio_file: "a.wav".to_string(),
            start: Instant::now(),
            end: Instant::now(),
            asr_latency: None,
            llm_ttft: None,
            llm_total: None,
            tts_latency: None,
            e2e_latency: None,
            status: RequestStatus::Error,
            error_message: Some("connection refused".to_string()),
        });

        let report = collector.generate_report();
        assert_eq!(report.total_requests, 2);
        assert_eq!(report.successful_requests, 1);
        assert_eq!(report.failed_requests, 1);
        assert_eq!(report.success_rate, 0.5);
        assert!(report.latency.e2e.is_some());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].count, 1);
    }
}
