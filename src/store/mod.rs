//! Relational storage behind the discussion engine.
//!
//! Services never issue SQL themselves; they compose the primitives below.
//! `PgStore` is the production backend, `MemoryStore` mirrors its observable
//! behaviour (constraints, ordering, cascades) in-process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        comment::{Comment, DeleteMode, NewComment},
        hashtag::HashtagCount,
        metric::{MetricBundle, MetricKind, Subject, SubjectKind},
        post::{NewPost, Post, PostChanges},
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Shared handle used by services and handlers.
pub type DynStore = Arc<dyn ThreadStore>;

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn insert_post(&self, post: &NewPost) -> Result<Post, AppError>;

    async fn find_post(&self, post_id: i64) -> Result<Option<Post>, AppError>;

    /// Coalesces every `None` field to the stored value and touches `updated_at`.
    async fn update_post(&self, post_id: i64, changes: &PostChanges)
    -> Result<Option<Post>, AppError>;

    /// Removes the post with its comments, likes, counters and hashtag links.
    async fn delete_post(&self, post_id: i64) -> Result<bool, AppError>;

    /// Fails with `ForeignKeyViolation` when the post or the parent is missing,
    /// or when the parent belongs to another post.
    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, AppError>;

    /// Returns tombstoned rows too.
    async fn find_comment(&self, comment_id: i64) -> Result<Option<Comment>, AppError>;

    async fn update_comment(
        &self,
        comment_id: i64,
        content: Option<&str>,
    ) -> Result<Option<Comment>, AppError>;

    /// Moves a live comment under `parent_id`, or to top level for `None`.
    ///
    /// The ancestry check and the write are atomic with respect to other moves
    /// on the same post: `Validation` when `parent_id` is the comment or one of
    /// its descendants, `ForeignKeyViolation` when the parent is missing or on
    /// another post. `Ok(None)` when the comment is missing or tombstoned.
    async fn set_comment_parent(
        &self,
        comment_id: i64,
        parent_id: Option<i64>,
    ) -> Result<Option<Comment>, AppError>;

    async fn delete_comment(&self, comment_id: i64, mode: DeleteMode) -> Result<bool, AppError>;

    /// Top-level comments of a post, ordered by `(created_at, id)`.
    async fn list_top_level(&self, post_id: i64) -> Result<Vec<Comment>, AppError>;

    /// Direct replies of a comment, ordered by `(created_at, id)`.
    async fn list_children(&self, comment_id: i64) -> Result<Vec<Comment>, AppError>;

    /// Every comment of a post at any depth, ordered by `(created_at, id)`.
    async fn list_post_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError>;

    /// Every descendant of a comment (the comment itself excluded),
    /// ordered by `(created_at, id)`.
    async fn list_descendants(&self, comment_id: i64) -> Result<Vec<Comment>, AppError>;

    /// True when the subject exists and is not tombstoned.
    async fn subject_exists(&self, subject: Subject) -> Result<bool, AppError>;

    /// Returns whether a new like row was inserted.
    async fn add_like(&self, subject: Subject, user_id: i64) -> Result<bool, AppError>;

    /// Returns whether a like row was removed.
    async fn remove_like(&self, subject: Subject, user_id: i64) -> Result<bool, AppError>;

    /// User ids that liked the subject, ascending.
    async fn likers(&self, subject: Subject) -> Result<Vec<i64>, AppError>;

    /// Single atomic upsert-or-add; returns the new value.
    async fn increment_metric(
        &self,
        subject: Subject,
        metric: MetricKind,
        delta: i64,
    ) -> Result<i64, AppError>;

    /// `None` when the counter was never incremented.
    async fn metric(&self, subject: Subject, metric: MetricKind) -> Result<Option<i64>, AppError>;

    /// Counter bundles for many subjects of one kind in a fixed number of queries.
    /// Ids without any engagement are present with zeroed bundles.
    async fn metric_bundles(
        &self,
        kind: SubjectKind,
        ids: &[i64],
    ) -> Result<HashMap<i64, MetricBundle>, AppError>;

    /// Ensures the hashtag row and the post association exist, atomically per tag.
    async fn register_post_hashtag(
        &self,
        post_id: i64,
        author_id: i64,
        name: &str,
    ) -> Result<(), AppError>;

    /// Association counts per tag over the last `days` days, most used first.
    async fn hashtag_usage(&self, days: i32, limit: i64) -> Result<Vec<HashtagCount>, AppError>;
}
