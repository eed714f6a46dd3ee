use crate::{
    error::AppError,
    models::{
        metric::SubjectKind,
        post::{NewPost, Post, PostChanges, PostView},
    },
    store::DynStore,
    tasks::{Task, TaskQueue},
};

#[derive(Clone)]
pub struct PostService {
    store: DynStore,
    tasks: TaskQueue,
}

fn trimmed(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be blank")));
    }
    Ok(value.to_string())
}

impl PostService {
    pub fn new(store: DynStore, tasks: TaskQueue) -> Self {
        PostService { store, tasks }
    }

    pub async fn create(&self, mut post: NewPost) -> Result<Post, AppError> {
        post.content = trimmed(&post.content, "Content")?;
        post.language_code = trimmed(&post.language_code, "Language code")?;
        post.title = post.title.trim().to_string();

        let post = self.store.insert_post(&post).await?;
        tracing::info!("Post {} created by user {}", post.id, post.author_id);

        self.tasks.enqueue(Task::IndexHashtags {
            author_id: post.author_id,
            post_id: post.id,
            content: post.content.clone(),
        });
        Ok(post)
    }

    pub async fn get(&self, post_id: i64) -> Result<PostView, AppError> {
        let post = self
            .store
            .find_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {post_id} not found")))?;
        let metrics = self
            .store
            .metric_bundles(SubjectKind::Post, &[post_id])
            .await?
            .remove(&post_id)
            .unwrap_or_default();
        Ok(PostView { post, metrics })
    }

    /// Coalescing partial update. Hashtags of new content are added; tags that
    /// disappeared from the text stay linked.
    pub async fn update(&self, post_id: i64, mut changes: PostChanges) -> Result<Post, AppError> {
        changes.content = changes
            .content
            .as_deref()
            .map(|c| trimmed(c, "Content"))
            .transpose()?;
        changes.language_code = changes
            .language_code
            .as_deref()
            .map(|l| trimmed(l, "Language code"))
            .transpose()?;
        changes.title = changes.title.map(|t| t.trim().to_string());

        let post = self
            .store
            .update_post(post_id, &changes)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {post_id} not found")))?;

        if changes.content.is_some() {
            self.tasks.enqueue(Task::IndexHashtags {
                author_id: post.author_id,
                post_id: post.id,
                content: post.content.clone(),
            });
        }
        Ok(post)
    }

    /// Removes the post and everything hanging off it.
    pub async fn delete(&self, post_id: i64) -> Result<(), AppError> {
        if !self.store.delete_post(post_id).await? {
            return Err(AppError::NotFound(format!("Post {post_id} not found")));
        }
        tracing::info!("Post {} deleted", post_id);
        Ok(())
    }
}
