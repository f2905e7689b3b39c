use axum::extract::DefaultBodyLimit;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn api_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let transfer = OpenApiRouter::new()
        .routes(routes!(
            handlers::transfer::upload_object,
            handlers::transfer::download_object
        ))
        .layer(DefaultBodyLimit::max(config.storage.max_object_size as usize));

    let gc = OpenApiRouter::new()
        .routes(routes!(handlers::gc::mark_device))
        .routes(routes!(handlers::gc::mark_unclaimed_devices))
        .routes(routes!(handlers::gc::mark_orphan_trails))
        .routes(routes!(handlers::gc::process_devices))
        .routes(routes!(handlers::gc::process_trails))
        .routes(routes!(handlers::gc::process_steps))
        .routes(routes!(handlers::gc::sweep))
        .routes(routes!(handlers::gc::populate_trails))
        .routes(routes!(handlers::gc::populate_steps));

    let health = OpenApiRouter::new().routes(routes!(handlers::health::healthz));

    transfer.merge(gc).merge(health)
}
