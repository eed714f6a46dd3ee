// src/routes.rs

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    handlers::{community, interaction, thread},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (posts, comments, metrics, hashtags).
/// * Applies global middleware (Trace, CORS, request timeout).
/// * Injects global state (store, config, side-effect queue).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let post_routes = Router::new()
        .route("/", post(community::create_post))
        .route(
            "/{id}",
            get(community::get_post)
                .put(community::update_post)
                .delete(community::delete_post),
        )
        .route(
            "/{id}/comments",
            get(thread::post_thread).post(interaction::create_comment),
        )
        .route("/{id}/comments/top-level", get(thread::list_top_level))
        .route(
            "/{id}/likes",
            get(community::post_likers)
                .post(community::like_post)
                .delete(community::unlike_post),
        );

    let comment_routes = Router::new()
        .route(
            "/{id}",
            get(thread::comment_thread)
                .put(interaction::update_comment)
                .delete(interaction::delete_comment),
        )
        .route("/{id}/replies", get(thread::list_replies))
        .route("/{id}/parent", put(interaction::reparent_comment))
        .route(
            "/{id}/likes",
            get(interaction::comment_likers)
                .post(interaction::like_comment)
                .delete(interaction::unlike_comment),
        );

    let metric_routes = Router::new()
        .route("/{kind}/{id}", get(interaction::get_metrics))
        .route("/{kind}/{id}/{metric}", post(interaction::record_engagement));

    let hashtag_routes = Router::new().route("/usage", get(community::hashtag_usage));

    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .nest("/api/posts", post_routes)
        .nest("/api/comments", comment_routes)
        .nest("/api/metrics", metric_routes)
        .nest("/api/hashtags", hashtag_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}
