use std::sync::Arc;

use anyhow::Result;
use tower_http::cors::{Any, CorsLayer};

use termhub_pty::SessionRegistry;

use crate::config::Config;
use crate::routes;
use crate::state::AppState;

/// Run the HTTP server until Ctrl-C or SIGTERM, then close every session.
pub async fn run(config: Config) -> Result<()> {
    let registry = Arc::new(SessionRegistry::new(config.registry_config()));
    registry.start();

    let state = AppState::new(Arc::clone(&registry), config.stream_interval());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::create_router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    log::info!("listening on http://{}", listener.local_addr()?);
    log::info!(
        "session timeout {}s, {} sessions per caller",
        config.session_timeout_secs,
        config.max_sessions_per_caller
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    registry.stop().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    log::info!("shutting down");
}
