use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};

use crate::{
    config::Config,
    error::AppError,
    models::{
        comment::{Comment, DeleteMode, NewComment},
        hashtag::HashtagCount,
        metric::{MetricBundle, MetricKind, Subject, SubjectKind},
        post::{NewPost, Post, PostChanges},
    },
    store::ThreadStore,
};

const POST_COLUMNS: &str =
    "id, author_id, title, content, language_code, status, is_pinned, created_at, updated_at";

const COMMENT_COLUMNS: &str =
    "id, post_id, author_id, parent_comment_id, content, created_at, updated_at, deleted_at";

/// Builds the bounded connection pool.
///
/// Pool acquisition is bounded by `acquire_timeout`, statements by the
/// server-side `statement_timeout`; both surface as `AppError::Transient`.
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(&config.database_url)?
        .options([("statement_timeout", config.statement_timeout_ms.to_string())]);

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await
}

/// Table and column names for the two kinds of subject.
struct SubjectTables {
    subject: &'static str,
    metrics: &'static str,
    metrics_key: &'static str,
    likes: &'static str,
    likes_key: &'static str,
}

fn tables(kind: SubjectKind) -> SubjectTables {
    match kind {
        SubjectKind::Post => SubjectTables {
            subject: "posts",
            metrics: "post_metrics",
            metrics_key: "post_id",
            likes: "post_likes",
            likes_key: "post_id",
        },
        SubjectKind::Comment => SubjectTables {
            subject: "comments",
            metrics: "comment_metrics",
            metrics_key: "comment_id",
            likes: "comment_likes",
            likes_key: "comment_id",
        },
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    async fn comments_where(&self, filter: &str, id: i64) -> Result<Vec<Comment>, AppError> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE {filter} ORDER BY created_at ASC, id ASC"
        );
        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(comments)
    }
}

#[async_trait]
impl ThreadStore for PgStore {
    async fn insert_post(&self, post: &NewPost) -> Result<Post, AppError> {
        let sql = format!(
            r#"
            INSERT INTO posts (author_id, title, content, language_code, status, is_pinned)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {POST_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(post.author_id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.language_code)
            .bind(post.status.as_str())
            .bind(post.is_pinned)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create post: {:?}", e);
                AppError::from(e)
            })
    }

    async fn find_post(&self, post_id: i64) -> Result<Option<Post>, AppError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn update_post(
        &self,
        post_id: i64,
        changes: &PostChanges,
    ) -> Result<Option<Post>, AppError> {
        let sql = format!(
            r#"
            UPDATE posts SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                language_code = COALESCE($4, language_code),
                status = COALESCE($5, status),
                is_pinned = COALESCE($6, is_pinned),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        );
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .bind(changes.title.as_deref())
            .bind(changes.content.as_deref())
            .bind(changes.language_code.as_deref())
            .bind(changes.status.map(|s| s.as_str()))
            .bind(changes.is_pinned)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn delete_post(&self, post_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete post: {:?}", e);
                AppError::from(e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, AppError> {
        // The composite foreign key rejects a parent from another post.
        let sql = format!(
            r#"
            INSERT INTO comments (post_id, author_id, parent_comment_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING {COMMENT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Comment>(&sql)
            .bind(comment.post_id)
            .bind(comment.author_id)
            .bind(comment.parent_comment_id)
            .bind(&comment.content)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                let err = AppError::from(e);
                if !matches!(err, AppError::ForeignKeyViolation(_)) {
                    tracing::error!("Failed to create comment: {:?}", err);
                }
                err
            })
    }

    async fn find_comment(&self, comment_id: i64) -> Result<Option<Comment>, AppError> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(comment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn update_comment(
        &self,
        comment_id: i64,
        content: Option<&str>,
    ) -> Result<Option<Comment>, AppError> {
        let sql = format!(
            r#"
            UPDATE comments SET
                content = COALESCE($2, content),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COMMENT_COLUMNS}
            "#
        );
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(comment_id)
            .bind(content)
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn set_comment_parent(
        &self,
        comment_id: i64,
        parent_id: Option<i64>,
    ) -> Result<Option<Comment>, AppError> {
        let mut tx = self.pool.begin().await?;

        let post_id = sqlx::query_scalar::<_, i64>(
            "SELECT post_id FROM comments WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(comment_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(post_id) = post_id else {
            return Ok(None);
        };

        // Moves within one post serialize on the post row.
        sqlx::query("SELECT id FROM posts WHERE id = $1 FOR NO KEY UPDATE")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        if let Some(parent_id) = parent_id {
            let creates_cycle = sqlx::query_scalar::<_, bool>(
                r#"
                WITH RECURSIVE ancestors AS (
                    SELECT id, parent_comment_id FROM comments WHERE id = $1
                    UNION
                    SELECT c.id, c.parent_comment_id FROM comments c
                    JOIN ancestors a ON c.id = a.parent_comment_id
                )
                SELECT EXISTS(SELECT 1 FROM ancestors WHERE id = $2)
                "#,
            )
            .bind(parent_id)
            .bind(comment_id)
            .fetch_one(&mut *tx)
            .await?;
            if creates_cycle {
                return Err(AppError::Validation(format!(
                    "Comment {parent_id} is a reply below comment {comment_id}"
                )));
            }
        }

        let sql = format!(
            r#"
            UPDATE comments SET
                parent_comment_id = $2,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COMMENT_COLUMNS}
            "#
        );
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(comment_id)
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(comment)
    }

    async fn delete_comment(&self, comment_id: i64, mode: DeleteMode) -> Result<bool, AppError> {
        let query = match mode {
            DeleteMode::Tombstone => sqlx::query(
                r#"
                UPDATE comments SET
                    content = '',
                    deleted_at = NOW(),
                    updated_at = NOW()
                WHERE id = $1 AND deleted_at IS NULL
                "#,
            ),
            // Descendants go with it through ON DELETE CASCADE.
            DeleteMode::Cascade => sqlx::query("DELETE FROM comments WHERE id = $1"),
        };
        let result = query.bind(comment_id).execute(&self.pool).await.map_err(|e| {
            tracing::error!("Failed to delete comment: {:?}", e);
            AppError::from(e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_top_level(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        self.comments_where("post_id = $1 AND parent_comment_id IS NULL", post_id)
            .await
    }

    async fn list_children(&self, comment_id: i64) -> Result<Vec<Comment>, AppError> {
        self.comments_where("parent_comment_id = $1", comment_id).await
    }

    async fn list_post_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        self.comments_where("post_id = $1", post_id).await
    }

    async fn list_descendants(&self, comment_id: i64) -> Result<Vec<Comment>, AppError> {
        let sql = format!(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT id FROM comments WHERE parent_comment_id = $1
                UNION
                SELECT c.id FROM comments c
                JOIN subtree s ON c.parent_comment_id = s.id
            )
            SELECT {COMMENT_COLUMNS}
            FROM comments
            WHERE id IN (SELECT id FROM subtree)
            ORDER BY created_at ASC, id ASC
            "#
        );
        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(comment_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(comments)
    }

    async fn subject_exists(&self, subject: Subject) -> Result<bool, AppError> {
        let sql = match subject.kind {
            SubjectKind::Post => "SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)",
            SubjectKind::Comment => {
                "SELECT EXISTS(SELECT 1 FROM comments WHERE id = $1 AND deleted_at IS NULL)"
            }
        };
        let exists = sqlx::query_scalar::<_, bool>(sql)
            .bind(subject.id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn add_like(&self, subject: Subject, user_id: i64) -> Result<bool, AppError> {
        let t = tables(subject.kind);
        let sql = format!(
            "INSERT INTO {} ({}, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            t.likes, t.likes_key
        );
        let result = sqlx::query(&sql)
            .bind(subject.id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_like(&self, subject: Subject, user_id: i64) -> Result<bool, AppError> {
        let t = tables(subject.kind);
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1 AND user_id = $2",
            t.likes, t.likes_key
        );
        let result = sqlx::query(&sql)
            .bind(subject.id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn likers(&self, subject: Subject) -> Result<Vec<i64>, AppError> {
        let t = tables(subject.kind);
        let sql = format!(
            "SELECT user_id FROM {} WHERE {} = $1 ORDER BY user_id",
            t.likes, t.likes_key
        );
        let users = sqlx::query_scalar::<_, i64>(&sql)
            .bind(subject.id)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn increment_metric(
        &self,
        subject: Subject,
        metric: MetricKind,
        delta: i64,
    ) -> Result<i64, AppError> {
        let t = tables(subject.kind);
        let sql = format!(
            r#"
            INSERT INTO {table} ({key}, metric_type, counter)
            VALUES ($1, $2, $3)
            ON CONFLICT ({key}, metric_type)
            DO UPDATE SET counter = {table}.counter + EXCLUDED.counter
            RETURNING counter
            "#,
            table = t.metrics,
            key = t.metrics_key,
        );
        let value = sqlx::query_scalar::<_, i64>(&sql)
            .bind(subject.id)
            .bind(metric.as_str())
            .bind(delta)
            .fetch_one(&self.pool)
            .await?;
        Ok(value)
    }

    async fn metric(&self, subject: Subject, metric: MetricKind) -> Result<Option<i64>, AppError> {
        let t = tables(subject.kind);
        let sql = format!(
            "SELECT counter FROM {} WHERE {} = $1 AND metric_type = $2",
            t.metrics, t.metrics_key
        );
        let value = sqlx::query_scalar::<_, i64>(&sql)
            .bind(subject.id)
            .bind(metric.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn metric_bundles(
        &self,
        kind: SubjectKind,
        ids: &[i64],
    ) -> Result<HashMap<i64, MetricBundle>, AppError> {
        let mut bundles: HashMap<i64, MetricBundle> =
            ids.iter().map(|id| (*id, MetricBundle::default())).collect();
        if ids.is_empty() {
            return Ok(bundles);
        }
        let t = tables(kind);

        let counters_sql = format!(
            "SELECT {key}, metric_type, counter FROM {table} WHERE {key} = ANY($1)",
            key = t.metrics_key,
            table = t.metrics,
        );
        let counters = sqlx::query_as::<_, (i64, String, i64)>(&counters_sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        for (id, metric_type, counter) in counters {
            let Ok(metric) = metric_type.parse::<MetricKind>() else {
                tracing::warn!("Ignoring unknown metric type '{}' on {}", metric_type, id);
                continue;
            };
            bundles.entry(id).or_default().set(metric, counter);
        }

        let likes_sql = format!(
            "SELECT {key}, COUNT(*) FROM {table} WHERE {key} = ANY($1) GROUP BY {key}",
            key = t.likes_key,
            table = t.likes,
        );
        let likes = sqlx::query_as::<_, (i64, i64)>(&likes_sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        for (id, count) in likes {
            bundles.entry(id).or_default().likes = count;
        }

        // A post counts every live comment below it, a comment only its direct replies.
        let replies_key = match kind {
            SubjectKind::Post => "post_id",
            SubjectKind::Comment => "parent_comment_id",
        };
        let replies_sql = format!(
            r#"
            SELECT {key}, COUNT(*) FROM comments
            WHERE {key} = ANY($1) AND deleted_at IS NULL
            GROUP BY {key}
            "#,
            key = replies_key,
        );
        let replies = sqlx::query_as::<_, (i64, i64)>(&replies_sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        for (id, count) in replies {
            bundles.entry(id).or_default().replies = count;
        }

        tracing::trace!("Loaded {} metric bundles from {}", bundles.len(), t.subject);
        Ok(bundles)
    }

    async fn register_post_hashtag(
        &self,
        post_id: i64,
        author_id: i64,
        name: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO hashtags (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO post_hashtags (post_id, hashtag_id, author_id)
            SELECT $1, id, $2 FROM hashtags WHERE name = $3
            ON CONFLICT (post_id, hashtag_id) DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn hashtag_usage(&self, days: i32, limit: i64) -> Result<Vec<HashtagCount>, AppError> {
        let usage = sqlx::query_as::<_, HashtagCount>(
            r#"
            SELECT h.name, COUNT(*) AS count
            FROM post_hashtags ph
            JOIN hashtags h ON h.id = ph.hashtag_id
            WHERE ph.created_at >= NOW() - make_interval(days => $1)
            GROUP BY h.name
            ORDER BY count DESC, h.name ASC
            LIMIT $2
            "#,
        )
        .bind(days)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(usage)
    }
}
