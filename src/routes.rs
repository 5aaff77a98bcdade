// src/routes.rs

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, patch},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{health, images, posts},
    state::AppState,
};

/// Upload requests carry the file plus a few form fields.
const UPLOAD_BODY_LIMIT: usize = 12 * 1024 * 1024;

/// Assembles the main application router.
///
/// * Mounts every `/v1` route.
/// * Applies global middleware (rate limit, CORS, Trace, panic recovery).
/// * Injects global state (stores, upload directory, config).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_trusted_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let post_routes = Router::new()
        .route("/", get(posts::list_posts).post(posts::create_post))
        .route(
            "/{id}",
            get(posts::get_post).patch(posts::update_post).delete(posts::delete_post),
        )
        .route(
            "/{id}/images",
            get(images::list_post_images)
                .post(images::upload_image)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/{id}/images/order", patch(images::reorder_images))
        .route("/{id}/featured-image", patch(images::set_featured_image));

    // `{image}` is the generated filename for GET and the numeric id otherwise.
    let image_routes = Router::new().route(
        "/{image}",
        get(images::serve_image).patch(images::update_image).delete(images::delete_image),
    );

    let mut router = Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route("/debug/vars", get(health::debug_vars))
        .route("/v1/slug/{slug}", get(posts::get_post_by_slug))
        .nest("/v1/posts", post_routes)
        .nest("/v1/images", image_routes)
        .fallback(health::not_found);

    if state.config.limiter_enabled {
        match GovernorConfigBuilder::default()
            .per_second(state.config.limiter_replenish_secs)
            .burst_size(state.config.limiter_burst)
            .finish()
        {
            Some(governor_conf) => router = router.layer(GovernorLayer::new(Arc::new(governor_conf))),
            None => tracing::warn!("rate limiter settings must be non-zero, limiter disabled"),
        }
    }

    router
        // Global Middleware (applied from outside in)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
