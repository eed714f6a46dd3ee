use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::{error::AppError, models::metric::MetricBundle};

/// Represents the 'comments' table in the database.
///
/// `post_id` is denormalized onto every comment regardless of depth, so a
/// whole thread can be scoped by post without walking parent pointers.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub parent_comment_id: Option<i64>,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Set when the comment was tombstoned; its replies stay in place.
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Comment {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Validated input for inserting a comment.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: i64,
    pub parent_comment_id: Option<i64>,
    pub content: String,
}

/// How a comment delete treats the replies below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Keep the row as a content-less placeholder so replies stay addressable.
    #[default]
    Tombstone,
    /// Remove the comment and its whole subtree.
    Cascade,
}

impl FromStr for DeleteMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tombstone" => Ok(DeleteMode::Tombstone),
            "cascade" => Ok(DeleteMode::Cascade),
            other => Err(AppError::Validation(format!("Unknown delete mode '{other}'"))),
        }
    }
}

/// One materialized node of a comment tree.
///
/// Serialized by [`forest_json`] / [`node_json`] with an explicit stack, never
/// through a derive that recurses once per level.
pub struct CommentNode {
    pub id: i64,
    pub post_id: i64,
    /// `None` for tombstoned comments.
    pub author_id: Option<i64>,
    pub parent_comment_id: Option<i64>,
    /// `None` for tombstoned comments.
    pub content: Option<String>,
    pub deleted: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub metrics: MetricBundle,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    pub fn new(comment: Comment, metrics: MetricBundle, children: Vec<CommentNode>) -> Self {
        let deleted = comment.is_deleted();
        CommentNode {
            id: comment.id,
            post_id: comment.post_id,
            author_id: (!deleted).then_some(comment.author_id),
            parent_comment_id: comment.parent_comment_id,
            content: (!deleted).then_some(comment.content),
            deleted,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            metrics,
            children,
        }
    }

    /// Total number of nodes in this subtree, the node itself included.
    pub fn size(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.children.iter());
        }
        total
    }
}

impl fmt::Debug for CommentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentNode")
            .field("id", &self.id)
            .field("post_id", &self.post_id)
            .field("parent_comment_id", &self.parent_comment_id)
            .field("deleted", &self.deleted)
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

impl Drop for CommentNode {
    // Flattens the subtree first so very deep reply chains drop without recursion.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// The scalar part of a node; `children` is written by hand around it.
#[derive(Serialize)]
struct NodeFields<'a> {
    id: i64,
    post_id: i64,
    author_id: Option<i64>,
    parent_comment_id: Option<i64>,
    content: Option<&'a str>,
    deleted: bool,
    created_at: &'a chrono::DateTime<chrono::Utc>,
    updated_at: &'a chrono::DateTime<chrono::Utc>,
    metrics: &'a MetricBundle,
}

enum Step<'a> {
    Open { node: &'a CommentNode, first: bool },
    Close,
}

/// Writes `nodes` as comma separated JSON objects, children nested under
/// `"children"`, without recursing per level.
fn write_nodes(nodes: &[CommentNode], out: &mut Vec<u8>) -> Result<(), AppError> {
    let mut stack: Vec<Step<'_>> = nodes
        .iter()
        .enumerate()
        .rev()
        .map(|(i, node)| Step::Open { node, first: i == 0 })
        .collect();

    while let Some(step) = stack.pop() {
        match step {
            Step::Open { node, first } => {
                if !first {
                    out.push(b',');
                }
                let fields = NodeFields {
                    id: node.id,
                    post_id: node.post_id,
                    author_id: node.author_id,
                    parent_comment_id: node.parent_comment_id,
                    content: node.content.as_deref(),
                    deleted: node.deleted,
                    created_at: &node.created_at,
                    updated_at: &node.updated_at,
                    metrics: &node.metrics,
                };
                serde_json::to_writer(&mut *out, &fields).map_err(|e| {
                    AppError::InternalServerError(format!("Failed to encode comment {}: {e}", node.id))
                })?;
                // Reopen the object to append the children array.
                out.pop();
                out.extend_from_slice(b",\"children\":[");
                stack.push(Step::Close);
                stack.extend(
                    node.children
                        .iter()
                        .enumerate()
                        .rev()
                        .map(|(i, child)| Step::Open { node: child, first: i == 0 }),
                );
            }
            Step::Close => out.extend_from_slice(b"]}"),
        }
    }
    Ok(())
}

/// JSON array of the given roots.
pub fn forest_json(roots: &[CommentNode]) -> Result<Vec<u8>, AppError> {
    let mut out = Vec::with_capacity(256 * roots.len().max(1));
    out.push(b'[');
    write_nodes(roots, &mut out)?;
    out.push(b']');
    Ok(out)
}

/// JSON object of a single node and its subtree.
pub fn node_json(root: &CommentNode) -> Result<Vec<u8>, AppError> {
    let mut out = Vec::with_capacity(256);
    write_nodes(std::slice::from_ref(root), &mut out)?;
    Ok(out)
}

fn non_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("Comment must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    pub author_id: i64,

    #[validate(
        length(max = 1000, message = "Comment must be at most 1000 characters"),
        custom(function = "non_blank")
    )]
    pub content: String,

    /// Optional: the ID of the comment being replied to.
    pub parent_id: Option<i64>,
}

/// DTO for editing a comment. A missing `content` leaves the text as is.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(
        length(max = 1000, message = "Comment must be at most 1000 characters"),
        custom(function = "non_blank")
    )]
    pub content: Option<String>,
}

/// DTO for moving a comment; `parent_id: null` moves it to top level.
#[derive(Debug, Deserialize)]
pub struct ReparentCommentRequest {
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteCommentParams {
    pub mode: Option<DeleteMode>,
}
