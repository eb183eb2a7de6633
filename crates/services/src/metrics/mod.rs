//! Metrics surface (spec.md §4.5): counters/histograms for per-stage
//! latency, error counts by kind, and the active-stream gauge. Recording
//! must never block the data path -- every method here is a cheap,
//! non-blocking call into an in-process registry; nothing here performs
//! I/O. `GET /metrics` (served by `crates/api`) renders the Prometheus
//! registry through [`PrometheusMetrics::render`].

use prometheus::{
    exponential_buckets, CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder,
};

/// Recording surface used by the turn pipeline and adapters. A trait so
/// tests can substitute [`CapturingMetricsService`] instead of standing up
/// a real registry.
pub trait MetricsServiceTrait: Send + Sync {
    fn record_request(&self, language: &str, status: &str, cached: bool);
    fn record_error(&self, stage: &str, error_kind: &str);
    fn inc_ws_connections(&self);
    fn dec_ws_connections(&self);
    fn inc_active_streams(&self);
    fn dec_active_streams(&self);
    fn observe_asr_latency_seconds(&self, seconds: f64);
    fn observe_asr_audio_duration_seconds(&self, seconds: f64);
    fn observe_llm_ttft_seconds(&self, seconds: f64);
    fn observe_llm_total_seconds(&self, seconds: f64);
    fn observe_tts_latency_seconds(&self, seconds: f64);
    fn observe_tts_text_length_chars(&self, chars: f64);
    fn observe_e2e_latency_seconds(&self, seconds: f64);
}

/// Production implementation backing `GET /metrics` with literal
/// Prometheus text exposition format.
pub struct PrometheusMetrics {
    registry: Registry,
    requests_total: CounterVec,
    errors_total: CounterVec,
    ws_connections_total: CounterVec,
    active_streams: Gauge,
    asr_latency_seconds: HistogramVec,
    asr_audio_duration_seconds: HistogramVec,
    llm_ttft_seconds: HistogramVec,
    llm_total_seconds: HistogramVec,
    tts_latency_seconds: HistogramVec,
    tts_text_length_chars: HistogramVec,
    e2e_latency_seconds: HistogramVec,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        // Sub-second voice latency: 50ms to ~5s.
        let latency_buckets = exponential_buckets(0.05, 1.8, 10).unwrap();

        let requests_total = CounterVec::new(
            Opts::new("requests_total", "Total completed turns"),
            &["language", "status", "cached"],
        )
        .unwrap();
        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total errors by pipeline stage and kind"),
            &["stage", "error_kind"],
        )
        .unwrap();
        let ws_connections_total = CounterVec::new(
            Opts::new("ws_connections_total", "Total WebSocket connections accepted"),
            &["outcome"],
        )
        .unwrap();
        let active_streams = Gauge::new("active_streams", "Currently live voice streams").unwrap();

        let asr_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("asr_latency_seconds", "ASR round-trip latency")
                .buckets(latency_buckets.clone()),
            &[],
        )
        .unwrap();
        let asr_audio_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "asr_audio_duration_seconds",
                "Duration of audio submitted to ASR",
            )
            .buckets(latency_buckets.clone()),
            &[],
        )
        .unwrap();
        let llm_ttft_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "llm_ttft_seconds",
                "Time from LLM request send to first token",
            )
            .buckets(latency_buckets.clone()),
            &[],
        )
        .unwrap();
        let llm_total_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("llm_total_seconds", "Total LLM generation time")
                .buckets(latency_buckets.clone()),
            &[],
        )
        .unwrap();
        let tts_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "tts_latency_seconds",
                "Time from TTS request send to first audio chunk",
            )
            .buckets(latency_buckets.clone()),
            &[],
        )
        .unwrap();
        let tts_text_length_chars = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "tts_text_length_chars",
                "Character length of text submitted to TTS per sentence",
            )
            .buckets(vec![4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0]),
            &[],
        )
        .unwrap();
        let e2e_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "e2e_latency_seconds",
                "Final transcript to first audio chunk",
            )
            .buckets(latency_buckets),
            &[],
        )
        .unwrap();

        registry.register(Box::new(requests_total.clone())).unwrap();
        registry.register(Box::new(errors_total.clone())).unwrap();
        registry.register(Box::new(ws_connections_total.clone())).unwrap();
        registry.register(Box::new(active_streams.clone())).unwrap();
        registry.register(Box::new(asr_latency_seconds.clone())).unwrap();
        registry.register(Box::new(asr_audio_duration_seconds.clone())).unwrap();
        registry.register(Box::new(llm_ttft_seconds.clone())).unwrap();
        registry.register(Box::new(llm_total_seconds.clone())).unwrap();
        registry.register(Box::new(tts_latency_seconds.clone())).unwrap();
        registry.register(Box::new(tts_text_length_chars.clone())).unwrap();
        registry.register(Box::new(e2e_latency_seconds.clone())).unwrap();

        Self {
            registry,
            requests_total,
            errors_total,
            ws_connections_total,
            active_streams,
            asr_latency_seconds,
            asr_audio_duration_seconds,
            llm_ttft_seconds,
            llm_total_seconds,
            tts_latency_seconds,
            tts_text_length_chars,
            e2e_latency_seconds,
        }
    }

    /// Render the registry in Prometheus text exposition format for
    /// `GET /metrics`.
    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf).unwrap_or_default();
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsServiceTrait for PrometheusMetrics {
    fn record_request(&self, language: &str, status: &str, cached: bool) {
        self.requests_total
            .with_label_values(&[language, status, if cached { "true" } else { "false" }])
            .inc();
    }

    fn record_error(&self, stage: &str, error_kind: &str) {
        self.errors_total.with_label_values(&[stage, error_kind]).inc();
    }

    fn inc_ws_connections(&self) {
        self.ws_connections_total.with_label_values(&["accepted"]).inc();
    }

    fn dec_ws_connections(&self) {}

    fn inc_active_streams(&self) {
        self.active_streams.inc();
    }

    fn dec_active_streams(&self) {
        self.active_streams.dec();
    }

    fn observe_asr_latency_seconds(&self, seconds: f64) {
        self.asr_latency_seconds.with_label_values(&[]).observe(seconds);
    }

    fn observe_asr_audio_duration_seconds(&self, seconds: f64) {
        self.asr_audio_duration_seconds.with_label_values(&[]).observe(seconds);
    }

    fn observe_llm_ttft_seconds(&self, seconds: f64) {
        self.llm_ttft_seconds.with_label_values(&[]).observe(seconds);
    }

    fn observe_llm_total_seconds(&self, seconds: f64) {
        self.llm_total_seconds.with_label_values(&[]).observe(seconds);
    }

    fn observe_tts_latency_seconds(&self, seconds: f64) {
        self.tts_latency_seconds.with_label_values(&[]).observe(seconds);
    }

    fn observe_tts_text_length_chars(&self, chars: f64) {
        self.tts_text_length_chars.with_label_values(&[]).observe(chars);
    }

    fn observe_e2e_latency_seconds(&self, seconds: f64) {
        self.e2e_latency_seconds.with_label_values(&[]).observe(seconds);
    }
}

/// Test double recording every call verbatim for assertions, the way the
/// teacher's `CapturingMetricsService` captures calls instead of exporting
/// them.
#[derive(Default)]
pub struct CapturingMetricsService {
    pub requests: std::sync::Mutex<Vec<(String, String, bool)>>,
    pub errors: std::sync::Mutex<Vec<(String, String)>>,
    pub asr_latencies: std::sync::Mutex<Vec<f64>>,
    pub llm_ttfts: std::sync::Mutex<Vec<f64>>,
    pub llm_totals: std::sync::Mutex<Vec<f64>>,
    pub tts_latencies: std::sync::Mutex<Vec<f64>>,
    pub e2e_latencies: std::sync::Mutex<Vec<f64>>,
    pub active_streams: std::sync::atomic::AtomicI64,
    pub ws_connections: std::sync::atomic::AtomicI64,
}

impl MetricsServiceTrait for CapturingMetricsService {
    fn record_request(&self, language: &str, status: &str, cached: bool) {
        self.requests.lock().unwrap().push((language.to_string(), status.to_string(), cached));
    }

    fn record_error(&self, stage: &str, error_kind: &str) {
        self.errors.lock().unwrap().push((stage.to_string(), error_kind.to_string()));
    }

    fn inc_ws_connections(&self) {
        self.ws_connections.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn dec_ws_connections(&self) {
        self.ws_connections.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn inc_active_streams(&self) {
        self.active_streams.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn dec_active_streams(&self) {
        self.active_streams.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn observe_asr_latency_seconds(&self, seconds: f64) {
        self.asr_latencies.lock().unwrap().push(seconds);
    }

    fn observe_asr_audio_duration_seconds(&self, _seconds: f64) {}

    fn observe_llm_ttft_seconds(&self, seconds: f64) {
        self.llm_ttfts.lock().unwrap().push(seconds);
    }

    fn observe_llm_total_seconds(&self, seconds: f64) {
        self.llm_totals.lock().unwrap().push(seconds);
    }

    fn observe_tts_latency_seconds(&self, seconds: f64) {
        self.tts_latencies.lock().unwrap().push(seconds);
    }

    fn observe_tts_text_length_chars(&self, _chars: f64) {}

    fn observe_e2e_latency_seconds(&self, seconds: f64) {
        self.e2e_latencies.lock().unwrap().push(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prometheus_render_contains_registered_metric_names() {
        let metrics = PrometheusMetrics::new();
        metrics.record_request("en-US", "ok", false);
        metrics.observe_e2e_latency_seconds(0.42);
        let rendered = metrics.render();
        assert!(rendered.contains("requests_total"));
        assert!(rendered.contains("e2e_latency_seconds"));
    }

    #[test]
    fn capturing_service_records_calls_verbatim() {
        let metrics = CapturingMetricsService::default();
        metrics.record_request("en-US", "ok", true);
        metrics.record_error("llm", "provider_timeout");
        assert_eq!(metrics.requests.lock().unwrap().len(), 1);
        assert_eq!(metrics.errors.lock().unwrap()[0].1, "provider_timeout");
    }
}
