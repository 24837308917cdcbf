use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::ServiceState;

pub mod api;
pub mod health;
pub mod plugin;

/// Plugin requests are tiny JSON documents
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Build the full HTTP surface: Docker plugin protocol plus health probes
pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/_status/livez", get(health::liveness::handler))
        .merge(plugin::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE)),
        )
}
