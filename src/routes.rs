// src/routes.rs

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{dashboard, dataset, page},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Serves the HTML dashboard at `/`.
/// * Merges the JSON/SVG sub-routers (dashboard, dataset).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (config, dataset cache, remote sync).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST]);

    let dashboard_routes = Router::new()
        .route("/questions", get(dashboard::list_questions))
        .route("/panels", get(dashboard::get_panels))
        .route("/figure.svg", get(dashboard::get_figure));

    let dataset_routes = Router::new()
        .route("/meta", get(dataset::get_meta))
        .route("/export.csv", get(dataset::export_csv))
        .route("/sync", post(dataset::trigger_sync));

    Router::new()
        .route("/", get(page::index))
        .nest("/api/dashboard", dashboard_routes)
        .nest("/api/dataset", dataset_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
