use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with all bridge endpoints.
///
/// Request bodies may carry one hex-encoded chunk plus JSON-RPC framing.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .limits
        .max_chunk_size
        .saturating_mul(2)
        .saturating_add(64 * 1024);
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/rpc", post(handler::rpc_handler))
        .route("/rpc/", post(handler::rpc_handler))
        .route("/get-by-hash/:digest", get(handler::get_by_hash_handler))
        .layer(DefaultBodyLimit::max(usize::try_from(body_limit).unwrap_or(usize::MAX)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
