use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use eventrelay::config::RelayConfig;
use eventrelay::dispatcher::report_discarded;
use eventrelay::ingress::{app, AppState};
use eventrelay::metrics::RelayMetrics;
use eventrelay::shutdown::ShutdownSignal;
use eventrelay::{Dispatcher, EventProcessor, EventQueue};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize Logging
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // 2. Configuration
    let config = RelayConfig::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    // 3. Core: router -> processor -> dispatcher -> queue
    let router = config.build_router();
    info!(
        handler_count = router.handler_count(),
        event_types = ?router.event_types(),
        has_default = router.has_default(),
        "Router configured"
    );

    let metrics = Arc::new(RelayMetrics::new());
    let processor = Arc::new(EventProcessor::new(Arc::new(router), metrics));
    let mut dispatcher = Dispatcher::new(processor)?;
    if let Some(max_workers) = config.dispatcher.max_concurrent_workers {
        info!(max_workers = max_workers, "Bounding concurrent workers");
        dispatcher = dispatcher.with_max_concurrent(max_workers);
    }
    let dispatcher = Arc::new(dispatcher);

    let queue = EventQueue::new(dispatcher.clone());
    queue.init()?;

    // 4. HTTP ingress
    let state = Arc::new(AppState::new(
        queue.clone(),
        dispatcher.clone(),
        config.server.api_key.clone(),
    ));
    if config.server.api_key.is_none() {
        info!("No API key configured, /event is unauthenticated");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("eventrelay listening on {}", addr);

    let shutdown = ShutdownSignal::with_timeout(config.dispatcher.drain_timeout());
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move { server_shutdown.wait().await })
        .await?;

    // 5. Drain
    info!(
        in_flight = dispatcher.in_flight(),
        "Server stopped, waiting for workers"
    );
    dispatcher.wait_idle_timeout(shutdown.timeout()).await;
    report_discarded(&queue);

    info!(stats = ?dispatcher.metrics().snapshot(), "Shutdown complete");
    Ok(())
}
