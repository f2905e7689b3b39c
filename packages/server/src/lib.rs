pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod gc;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;

use axum::http::{HeaderValue, Method};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable as ScalarServable};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FleetHub Storage API",
        version = "1.0.0",
        description = "Capability-token object storage and fleet garbage collection"
    ),
    tags(
        (name = "Object Transfer", description = "Token-gated object upload and download"),
        (name = "Garbage Collection", description = "Mark, process, sweep and populate operations"),
        (name = "Health", description = "Liveness checks"),
    ),
)]
struct ApiDoc;

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors
        .allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::PUT, Method::DELETE])
        .max_age(std::time::Duration::from_secs(config.server.cors.max_age))
}

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    let cors = cors_layer(&state.config);

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(routes::api_routes(&state.config))
        .split_for_parts();

    router
        .layer(cors)
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api.clone()))
        .merge(Scalar::with_url("/scalar", api))
}
