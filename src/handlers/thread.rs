use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::comment::{forest_json, node_json},
    state::AppState,
};

/// Pre-encoded JSON body.
fn json_body(body: Vec<u8>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], body)
}

/// Full comment forest of a post, each node with its counters.
pub async fn post_thread(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let forest = state.threads().materialize_post_thread(post_id).await?;
    Ok(json_body(forest_json(&forest)?))
}

/// One comment with all replies below it.
pub async fn comment_thread(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let node = state.threads().materialize_comment_thread(id).await?;
    Ok(json_body(node_json(&node)?))
}

/// Top-level comments only, oldest first.
pub async fn list_top_level(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let comments = state.comments().list_top_level(post_id).await?;
    Ok(Json(comments))
}

/// Direct replies of a comment, oldest first.
pub async fn list_replies(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let comments = state.comments().list_children(id).await?;
    Ok(Json(comments))
}
