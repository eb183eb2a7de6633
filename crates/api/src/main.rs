use std::sync::Arc;
use std::time::Duration;

use config::GatewayConfig;
use inference_providers::{
    ChannelPool, HttpLlmProvider, LlmCache, RivaAsrProvider, RivaChannelFactory, RivaTtsProvider,
};
use services::metrics::PrometheusMetrics;
use services::session::SessionStore;
use services::turn::{TurnPipeline, TurnPipelineConfig};

use api::routes;
use api::shutdown;
use api::state::AppState;

/// Per-stage provider RPC timeouts (spec.md §5 "Cancellation and timeouts":
/// default 30s ASR/TTS, 60s LLM). Not exposed as environment overrides --
/// the env surface of spec.md §6 only covers pool sizing and endpoints.
const ASR_TIMEOUT: Duration = Duration::from_secs(30);
const TTS_TIMEOUT: Duration = Duration::from_secs(30);
const LLM_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let config = GatewayConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Application cannot start without a valid configuration.");
        std::process::exit(1);
    });

    init_tracing(&config.log_level);
    tracing::debug!(riva_uri = %config.riva_uri, llm_service_url = %config.llm_service_url, "configuration loaded");

    let asr_factory = Arc::new(RivaChannelFactory {
        uri: config.riva_uri.clone(),
        keep_alive: Default::default(),
    });
    let asr_pool = ChannelPool::new(asr_factory, config.asr_pool_size);
    let tts_factory = Arc::new(RivaChannelFactory {
        uri: config.riva_uri.clone(),
        keep_alive: Default::default(),
    });
    let tts_pool = ChannelPool::new(tts_factory, config.tts_pool_size);

    if let Err(e) = asr_pool.initialize().await {
        tracing::error!(error = %e, "failed to initialize ASR channel pool");
        std::process::exit(1);
    }
    if let Err(e) = tts_pool.initialize().await {
        tracing::error!(error = %e, "failed to initialize TTS channel pool");
        std::process::exit(1);
    }

    let asr = Arc::new(RivaAsrProvider::new(asr_pool.clone(), ASR_TIMEOUT));
    let tts = Arc::new(RivaTtsProvider::new(tts_pool.clone(), TTS_TIMEOUT, inference_providers::DEFAULT_CHUNK_SIZE));

    let llm_cache = match LlmCache::new(&config.redis_url(), config.session_timeout_seconds) {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            tracing::warn!(error = %e, "LLM response cache unavailable, continuing without it");
            None
        }
    };
    let llm = Arc::new(HttpLlmProvider::new(
        config.llm_service_url.clone(),
        config.llm_api_key.clone(),
        LLM_TIMEOUT,
        llm_cache,
    ));

    let prometheus = Arc::new(PrometheusMetrics::new());
    let metrics: Arc<dyn services::metrics::MetricsServiceTrait> = prometheus.clone();

    let sessions = SessionStore::new(Some(&config.redis_url()), config.session_timeout_seconds)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to construct session store");
            std::process::exit(1);
        });

    let prompts = domain::PromptTable::with_override(config.llm_system_prompt.as_deref());
    let pipeline = Arc::new(TurnPipeline::new(
        asr,
        llm,
        tts,
        metrics.clone(),
        prompts,
        TurnPipelineConfig {
            model: config.llm_model.clone(),
            max_tokens: config.llm_max_tokens,
            temperature: config.llm_temperature,
            tts_sample_rate: config.tts_sample_rate,
            tts_voice: None,
        },
    ));

    let asr_pool_for_shutdown = asr_pool.clone();
    let tts_pool_for_shutdown = tts_pool.clone();

    let app_state = AppState {
        config: Arc::new(config.clone()),
        sessions,
        pipeline,
        metrics,
        prometheus,
        asr_pool,
        tts_pool,
    };

    let app = routes::build_router(app_state.clone());
    let bind_address = format!("0.0.0.0:{}", config.grpc_port);
    let listener = tokio::net::TcpListener::bind(&bind_address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, address = %bind_address, "failed to bind listener");
        std::process::exit(1);
    });

    tracing::info!(address = %bind_address, "voice gateway listening");

    // Graceful shutdown (spec.md §5): stop accepting new connections as
    // soon as the signal fires, then give active turns up to
    // `shutdown_grace_period` to finish on their own before the server
    // future is dropped, aborting whatever is still in flight.
    let (stop_accepting_tx, stop_accepting_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = stop_accepting_rx.await;
    });
    tokio::pin!(server);

    let signal = shutdown::wait_for_signal();
    tokio::pin!(signal);

    tokio::select! {
        result = &mut server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server exited with error");
                std::process::exit(1);
            }
        }
        _ = &mut signal => {
            let _ = stop_accepting_tx.send(());
            let grace = Duration::from_secs(app_state.config.shutdown_grace_period);
            tracing::info!(grace_period_seconds = grace.as_secs(), "waiting for in-flight turns to complete");
            match tokio::time::timeout(grace, &mut server).await {
                Ok(Ok(())) => tracing::info!("all connections drained before grace period elapsed"),
                Ok(Err(e)) => tracing::error!(error = %e, "server exited with error during shutdown"),
                Err(_) => tracing::warn!("grace period elapsed, dropping remaining connections"),
            }
        }
    }

    asr_pool_for_shutdown.close().await;
    tts_pool_for_shutdown.close().await;
    tracing::info!("pools closed, exiting");
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt().with_env_filter(log_level.to_string()).compact().init();
}
