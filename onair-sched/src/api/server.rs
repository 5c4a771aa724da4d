//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::schedule::Scheduler;
use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub scheduler: Arc<Scheduler>,
}

impl AppContext {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

/// Build the router with every read endpoint
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/build_info", get(super::handlers::build_info))
        .route("/now-playing", get(super::handlers::now_playing))
        .route("/queue", get(super::handlers::queue))
        .route("/crossfade/curve", get(super::handlers::crossfade_curve))
        .layer(TraceLayer::new_for_http())
        // Listener pages are served from other origins
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Serve the API on `port` until `shutdown` completes
pub async fn run<F>(ctx: AppContext, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind {}: {}", addr, e)))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
