use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::{error::AppError, models::hashtag::HashtagCount, store::DynStore};

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\w+)").expect("hashtag pattern is valid"));

const MAX_USAGE_LIMIT: i64 = 100;

/// Lowercased, de-duplicated hashtags found in `text`.
pub fn extract(text: &str) -> BTreeSet<String> {
    HASHTAG
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Maintains the tag → post reverse index.
#[derive(Clone)]
pub struct HashtagIndexer {
    store: DynStore,
}

impl HashtagIndexer {
    pub fn new(store: DynStore) -> Self {
        HashtagIndexer { store }
    }

    /// Links every tag in `text` to the post. Safe to repeat.
    ///
    /// Tags are registered independently; a failing tag does not stop the
    /// others, and any failure is reported once all tags were attempted.
    pub async fn register_for_post(
        &self,
        author_id: i64,
        post_id: i64,
        text: &str,
    ) -> Result<Vec<String>, AppError> {
        let tags = extract(text);
        let mut registered = Vec::with_capacity(tags.len());
        let mut failures = Vec::new();

        for tag in tags {
            match self
                .store
                .register_post_hashtag(post_id, author_id, &tag)
                .await
            {
                Ok(()) => registered.push(tag),
                // A concurrent registration won the race; the rows exist.
                Err(AppError::Conflict(msg)) => {
                    tracing::debug!("Hashtag '{}' already linked to post {}: {}", tag, post_id, msg);
                    registered.push(tag);
                }
                Err(e) => {
                    tracing::warn!("Failed to register hashtag '{}' for post {}: {}", tag, post_id, e);
                    failures.push((tag, e));
                }
            }
        }

        if failures.is_empty() {
            return Ok(registered);
        }
        Err(partial_failure(post_id, registered.len(), failures))
    }

    /// Most used tags over the last `days` days.
    pub async fn usage(&self, days: i32, limit: i64) -> Result<Vec<HashtagCount>, AppError> {
        if days < 1 {
            return Err(AppError::Validation("days must be at least 1".to_string()));
        }
        if limit < 1 {
            return Err(AppError::Validation("limit must be at least 1".to_string()));
        }
        self.store
            .hashtag_usage(days, limit.min(MAX_USAGE_LIMIT))
            .await
    }
}

/// Folds per-tag failures into one error. The category follows the most
/// actionable cause: a vanished post, then anything retryable.
fn partial_failure(post_id: i64, succeeded: usize, failures: Vec<(String, AppError)>) -> AppError {
    let tags: Vec<&str> = failures.iter().map(|(tag, _)| tag.as_str()).collect();
    let msg = format!(
        "hashtag registration for post {} failed for [{}] ({} succeeded)",
        post_id,
        tags.join(", "),
        succeeded
    );
    let errors = || failures.iter().map(|(_, e)| e);
    if errors().any(|e| matches!(e, AppError::ForeignKeyViolation(_) | AppError::NotFound(_))) {
        AppError::NotFound(msg)
    } else if errors().any(AppError::is_retryable) {
        AppError::Transient(msg)
    } else {
        AppError::InternalServerError(msg)
    }
}
