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
        comment::{
            CreateCommentRequest, DeleteCommentParams, ReparentCommentRequest,
            UpdateCommentRequest,
        },
        metric::{EngagementRequest, LikeRequest, MetricKind, Subject, SubjectKind},
    },
    state::AppState,
};

/// Create a new comment, optionally as a reply.
pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let new_id = state
        .comments()
        .create(
            post_id,
            payload.author_id,
            &payload.content,
            payload.parent_id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": new_id })),
    ))
}

/// Edit a comment's text.
pub async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let comment = state
        .comments()
        .update(id, payload.content.as_deref())
        .await?;
    Ok(Json(comment))
}

/// Delete a comment. `?mode=cascade|tombstone` overrides the configured default.
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteCommentParams>,
) -> Result<impl IntoResponse, AppError> {
    let comments = state.comments();
    match params.mode {
        Some(mode) => comments.delete_with(id, mode).await?,
        None => comments.delete(id).await?,
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Move a comment under another comment of the same post, or to top level.
pub async fn reparent_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ReparentCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let comment = state.comments().reparent(id, payload.parent_id).await?;
    Ok(Json(comment))
}

pub async fn like_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<LikeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let inserted = state
        .counters()
        .like(Subject::comment(id), payload.user_id)
        .await?;
    Ok(Json(serde_json::json!({ "liked": true, "changed": inserted })))
}

pub async fn unlike_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<LikeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state
        .counters()
        .unlike(Subject::comment(id), payload.user_id)
        .await?;
    Ok(Json(serde_json::json!({ "liked": false, "changed": removed })))
}

pub async fn comment_likers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let users = state.counters().likers(Subject::comment(id)).await?;
    Ok(Json(users))
}

/// Record a view or an impression on a post or comment.
pub async fn record_engagement(
    State(state): State<AppState>,
    Path((kind, id, metric)): Path<(String, i64, String)>,
    Query(params): Query<EngagementRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subject = Subject {
        kind: kind.parse::<SubjectKind>()?,
        id,
    };
    let metric = metric.parse::<MetricKind>()?;

    let value = state
        .counters()
        .increment(subject, metric, params.delta.unwrap_or(1))
        .await?;

    Ok(Json(serde_json::json!({ "metric": metric, "value": value })))
}

/// Counter bundle of a post or comment.
pub async fn get_metrics(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let subject = Subject {
        kind: kind.parse::<SubjectKind>()?,
        id,
    };
    let bundle = state.counters().get_bundle(subject).await?;
    Ok(Json(bundle))
}
