use crate::{
    error::AppError,
    models::comment::{Comment, DeleteMode, NewComment},
    store::DynStore,
    tasks::{Task, TaskQueue},
};

/// Owns the comment rows and the tree invariants:
/// a parent always exists before its child, lives under the same post,
/// and is never one of the child's own descendants.
#[derive(Clone)]
pub struct CommentRepository {
    store: DynStore,
    tasks: TaskQueue,
    delete_mode: DeleteMode,
}

fn normalized(content: &str) -> Result<&str, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Comment must not be blank".to_string()));
    }
    Ok(content)
}

impl CommentRepository {
    pub fn new(store: DynStore, tasks: TaskQueue, delete_mode: DeleteMode) -> Self {
        CommentRepository {
            store,
            tasks,
            delete_mode,
        }
    }

    /// Persists a comment and schedules hashtag indexing of its text.
    pub async fn create(
        &self,
        post_id: i64,
        author_id: i64,
        content: &str,
        parent_id: Option<i64>,
    ) -> Result<i64, AppError> {
        let content = normalized(content)?;

        if self.store.find_post(post_id).await?.is_none() {
            return Err(AppError::ForeignKeyViolation(format!(
                "Post {post_id} not found"
            )));
        }

        if let Some(pid) = parent_id {
            let parent = self
                .store
                .find_comment(pid)
                .await?
                .filter(|p| !p.is_deleted())
                .ok_or_else(|| {
                    AppError::ForeignKeyViolation(format!("Parent comment {pid} not found"))
                })?;
            if parent.post_id != post_id {
                return Err(AppError::ForeignKeyViolation(format!(
                    "Parent comment {pid} does not belong to post {post_id}"
                )));
            }
        }

        let comment = self
            .store
            .insert_comment(&NewComment {
                post_id,
                author_id,
                parent_comment_id: parent_id,
                content: content.to_string(),
            })
            .await?;

        tracing::debug!(
            "Comment {} created on post {} (parent: {:?})",
            comment.id,
            post_id,
            parent_id
        );

        self.tasks.enqueue(Task::IndexHashtags {
            author_id,
            post_id,
            content: comment.content,
        });

        Ok(comment.id)
    }

    /// Partial update; `None` keeps the current text. Counters are untouched.
    pub async fn update(
        &self,
        comment_id: i64,
        new_content: Option<&str>,
    ) -> Result<Comment, AppError> {
        let new_content = new_content.map(normalized).transpose()?;

        let comment = self
            .store
            .update_comment(comment_id, new_content)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {comment_id} not found")))?;

        if new_content.is_some() {
            self.tasks.enqueue(Task::IndexHashtags {
                author_id: comment.author_id,
                post_id: comment.post_id,
                content: comment.content.clone(),
            });
        }

        Ok(comment)
    }

    /// Deletes with the configured default mode.
    pub async fn delete(&self, comment_id: i64) -> Result<(), AppError> {
        self.delete_with(comment_id, self.delete_mode).await
    }

    pub async fn delete_with(&self, comment_id: i64, mode: DeleteMode) -> Result<(), AppError> {
        if !self.store.delete_comment(comment_id, mode).await? {
            return Err(AppError::NotFound(format!("Comment {comment_id} not found")));
        }
        tracing::debug!("Comment {} deleted ({:?})", comment_id, mode);
        Ok(())
    }

    /// Moves a comment (with its subtree) under `new_parent`, or to top level.
    pub async fn reparent(
        &self,
        comment_id: i64,
        new_parent: Option<i64>,
    ) -> Result<Comment, AppError> {
        let comment = self
            .store
            .find_comment(comment_id)
            .await?
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("Comment {comment_id} not found")))?;

        if let Some(pid) = new_parent {
            if pid == comment_id {
                return Err(AppError::Validation(
                    "A comment cannot be its own parent".to_string(),
                ));
            }
            let parent = self
                .store
                .find_comment(pid)
                .await?
                .filter(|p| !p.is_deleted())
                .ok_or_else(|| {
                    AppError::ForeignKeyViolation(format!("Parent comment {pid} not found"))
                })?;
            if parent.post_id != comment.post_id {
                return Err(AppError::ForeignKeyViolation(format!(
                    "Parent comment {pid} does not belong to post {}",
                    comment.post_id
                )));
            }
        }

        // The store rejects a descendant as new parent atomically with the write.
        self.store
            .set_comment_parent(comment_id, new_parent)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {comment_id} not found")))
    }

    pub async fn get(&self, comment_id: i64) -> Result<Comment, AppError> {
        self.store
            .find_comment(comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {comment_id} not found")))
    }

    /// Top-level comments, oldest first.
    pub async fn list_top_level(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        if self.store.find_post(post_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Post {post_id} not found")));
        }
        self.store.list_top_level(post_id).await
    }

    /// Direct replies only, oldest first.
    pub async fn list_children(&self, comment_id: i64) -> Result<Vec<Comment>, AppError> {
        self.get(comment_id).await?;
        self.store.list_children(comment_id).await
    }
}
