//! Graceful shutdown signal (spec.md §5 "Graceful shutdown"): resolves on
//! SIGTERM or SIGINT (Ctrl-C), whichever arrives first. `axum::serve`'s
//! `with_graceful_shutdown` stops accepting new connections as soon as this
//! future resolves and waits for in-flight handlers to finish on their own.

pub async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}
