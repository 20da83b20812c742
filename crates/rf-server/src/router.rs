//! Axum router construction.
//!
//! Builds the full application router with all route groups, middleware
//! layers, and static file serving.

use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::auth::auth_middleware;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Slack on top of the upload limit for a single request body.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::videos::upload_chunk,
        routes::videos::list_videos,
        routes::videos::get_video,
        routes::videos::get_video_status,
        routes::videos::update_video,
        routes::videos::delete_video,
        routes::stream::hls_index,
        routes::stream::hls_segment,
        routes::events::events_handler,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::videos::VideoResponse,
        routes::videos::VideoStatusResponse,
        routes::videos::UpdateVideoRequest,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    crate::telemetry::install();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = usize::try_from(ctx.config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_SLACK);

    let api = Router::new()
        .route(
            "/videos",
            get(routes::videos::list_videos)
                .post(routes::videos::upload_chunk)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/videos/{id}",
            get(routes::videos::get_video)
                .put(routes::videos::update_video)
                .delete(routes::videos::delete_video),
        )
        .route("/videos/{id}/status", get(routes::videos::get_video_status))
        .route(
            "/videos/{id}/stream/index.m3u8",
            get(routes::stream::hls_index),
        )
        .route(
            "/videos/{id}/stream/{segment}",
            get(routes::stream::hls_segment),
        )
        .route("/events", get(routes::events::events_handler))
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            app = app.nest_service("/static", tower_http::services::ServeDir::new(&dir));
        } else {
            tracing::warn!("Static directory {:?} does not exist; not serving it", dir);
        }
    }

    app
}
