use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        hashtag::HashtagUsageParams,
        metric::{LikeRequest, Subject},
        post::{CreatePostRequest, UpdatePostRequest},
    },
    state::AppState,
};

/// Create a new post.
/// Hashtags in the content are indexed after the response is sent.
pub async fn create_post(
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Validate payload
    payload.validate()?;

    // 2. Insert Post
    let post = state.posts().create(payload.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": post.id})),
    ))
}

/// Get a single post by ID, with its counters.
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let post = state.posts().get(id).await?;
    Ok(Json(post))
}

/// Partially update a post. Missing fields keep their value.
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let post = state.posts().update(id, payload.into()).await?;
    Ok(Json(post))
}

/// Delete a post with its whole comment tree.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.posts().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<LikeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let inserted = state
        .counters()
        .like(Subject::post(id), payload.user_id)
        .await?;
    Ok(Json(serde_json::json!({ "liked": true, "changed": inserted })))
}

pub async fn unlike_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<LikeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state
        .counters()
        .unlike(Subject::post(id), payload.user_id)
        .await?;
    Ok(Json(serde_json::json!({ "liked": false, "changed": removed })))
}

/// User ids that liked the post.
pub async fn post_likers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let users = state.counters().likers(Subject::post(id)).await?;
    Ok(Json(users))
}

/// Most used hashtags over a window of days.
pub async fn hashtag_usage(
    State(state): State<AppState>,
    Query(params): Query<HashtagUsageParams>,
) -> Result<impl IntoResponse, AppError> {
    let days = params.days.unwrap_or(7);
    let limit = params.limit.unwrap_or(20);

    let usage = state.hashtags().usage(days, limit).await?;
    Ok(Json(usage))
}
