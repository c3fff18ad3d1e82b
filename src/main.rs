// Main entry point - Dependency injection, browser launch and polling
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::sync::Arc;
use axum::{routing::get, Router};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::forecast_service::{ForecastService, PageSource};
use crate::application::render_session::RenderSession;
use crate::application::scheduler::{self, ScheduleSettings};
use crate::infrastructure::chromium_session::{resolve_executable, ChromiumSession, Platform};
use crate::infrastructure::config::load_config;
use crate::infrastructure::memory_state_sink::MemoryStateSink;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_state, health_check, list_states};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_config()?;
    tracing::info!("browser mode set to {}", config.browser.mode);

    let platform = Platform::current();
    let executable = match resolve_executable(config.browser.mode, config.browser.path.as_deref(), platform) {
        Ok(executable) => executable,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e.into());
        }
    };
    match &executable {
        Some(path) => tracing::info!("browser path set to {}", path.display()),
        None => tracing::info!("browser path set to chromiumoxide default"),
    }
    let format = config.display.display_format()?;

    // Launch the render session; failure here ends the process
    let session = Arc::new(ChromiumSession::new(executable));
    if let Err(e) = session.launch().await {
        tracing::error!("{}", e);
        return Err(e.into());
    }
    tracing::debug!("render session {:?}", session.state());

    // Wire the fetch cycle and start polling
    let states = Arc::new(MemoryStateSink::default());
    let service = Arc::new(ForecastService::new(
        session.clone(),
        states.clone(),
        PageSource::new(&config.source.base_url, &config.source.locale),
        format,
    ));
    let (_routing_key, routing_rx) = watch::channel(config.source.routing_key.clone());
    let polling = scheduler::start(service, routing_rx, ScheduleSettings::default());

    let served = serve_states(&config.server.bind, states).await;

    // Shutdown: triggers first, then targets and browser; errors never block it
    if !polling.is_polling() {
        tracing::debug!("periodic polling had already stopped");
    }
    polling.stop();
    if let Err(e) = session.teardown().await {
        tracing::warn!("error during browser teardown: {}", e);
    }
    tracing::info!("shutdown complete");

    served
}

async fn serve_states(bind: &str, states: Arc<MemoryStateSink>) -> anyhow::Result<()> {
    let state = Arc::new(AppState { states });

    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/states", get(list_states))
        .route("/states/:key", get(get_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("serving states on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Ctrl-C or, on unix, SIGTERM (what service managers and container runtimes send).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    first_of(ctrl_c, terminate).await;
    tracing::info!("shutdown signal received");
}

/// Resolves as soon as either future does.
async fn first_of(a: impl std::future::Future<Output = ()>, b: impl std::future::Future<Output = ()>) {
    tokio::select! {
        _ = a => {}
        _ = b => {}
    }
}
