mod handlers;
mod state;

use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::location::LocationResolver;

pub fn build_router(resolver: LocationResolver) -> Router {
    let state = Arc::new(AppState { resolver });

    Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/location",
            get(handlers::current_location)
                .put(handlers::set_location)
                .delete(handlers::clear_location),
        )
        .route("/api/location/redetect", post(handlers::redetect))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the resolver over HTTP until the process is stopped.
pub async fn start(host: &str, port: u16, resolver: LocationResolver) -> std::io::Result<()> {
    resolver.start();

    let app = build_router(resolver);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "whereabouts server listening");
    eprintln!("  Whereabouts server listening on http://{}", addr);
    eprintln!("  Press Ctrl+C to stop.");

    axum::serve(listener, app).await
}
