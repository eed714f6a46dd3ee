use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::{error::AppError, models::metric::MetricBundle};

/// Lifecycle status of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    #[default]
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            other => Err(AppError::Validation(format!("Unknown post status '{other}'"))),
        }
    }
}

impl TryFrom<String> for PostStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub language_code: String,
    #[sqlx(try_from = "String")]
    pub status: PostStatus,
    pub is_pinned: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A post together with its engagement counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub metrics: MetricBundle,
}

/// Validated input for inserting a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub language_code: String,
    pub status: PostStatus,
    pub is_pinned: bool,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub language_code: Option<String>,
    pub status: Option<PostStatus>,
    pub is_pinned: Option<bool>,
}

/// DTO for creating a new post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    pub author_id: i64,

    #[serde(default)]
    #[validate(length(max = 100, message = "Title must be at most 100 chars"))]
    pub title: String,

    #[validate(length(
        min = 1,
        max = 10000,
        message = "Content length must be between 1 and 10000 chars"
    ))]
    pub content: String,

    #[validate(length(
        min = 2,
        max = 8,
        message = "Language code must be between 2 and 8 chars"
    ))]
    pub language_code: String,

    pub status: Option<PostStatus>,
    pub is_pinned: Option<bool>,
}

impl From<CreatePostRequest> for NewPost {
    fn from(req: CreatePostRequest) -> Self {
        NewPost {
            author_id: req.author_id,
            title: req.title,
            content: req.content,
            language_code: req.language_code,
            status: req.status.unwrap_or_default(),
            is_pinned: req.is_pinned.unwrap_or(false),
        }
    }
}

/// DTO for a partial post update.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(max = 100, message = "Title must be at most 100 chars"))]
    pub title: Option<String>,

    #[validate(length(
        min = 1,
        max = 10000,
        message = "Content length must be between 1 and 10000 chars"
    ))]
    pub content: Option<String>,

    #[validate(length(
        min = 2,
        max = 8,
        message = "Language code must be between 2 and 8 chars"
    ))]
    pub language_code: Option<String>,

    pub status: Option<PostStatus>,
    pub is_pinned: Option<bool>,
}

impl From<UpdatePostRequest> for PostChanges {
    fn from(req: UpdatePostRequest) -> Self {
        PostChanges {
            title: req.title,
            content: req.content,
            language_code: req.language_code,
            status: req.status,
            is_pinned: req.is_pinned,
        }
    }
}
