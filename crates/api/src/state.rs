//! Shared application state handed to every route handler (spec.md §4.4,
//! §4.5, §6). One instance is built in `main` and cloned (cheaply, via
//! `Arc`s) into each Axum handler.

use std::sync::Arc;
use tonic::transport::Channel;

use config::GatewayConfig;
use inference_providers::ChannelPool;
use services::metrics::{MetricsServiceTrait, PrometheusMetrics};
use services::session::SessionStore;
use services::turn::TurnPipeline;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub sessions: Arc<SessionStore>,
    pub pipeline: Arc<TurnPipeline>,
    pub metrics: Arc<dyn MetricsServiceTrait>,
    /// The concrete Prometheus registry backing `metrics`, for `GET
    /// /metrics` text rendering. Kept alongside the trait object rather than
    /// downcast from it: production always wires `PrometheusMetrics`, but
    /// the trait exists so `CapturingMetricsService` can stand in for tests
    /// that never hit this endpoint.
    pub prometheus: Arc<PrometheusMetrics>,
    pub asr_pool: Arc<ChannelPool<Channel>>,
    pub tts_pool: Arc<ChannelPool<Channel>>,
}
