use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppContext;

pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/tracks", get(handlers::list_tracks))
        .route("/releases", get(handlers::list_releases))
        .route("/artists", get(handlers::list_artists))
        .route("/cover", get(handlers::cover))
        .route("/similar", get(handlers::similar))
        .route("/stream", get(handlers::stream))
        .route("/download/:kind/:id", get(handlers::download))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
