use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    error::AppError,
    models::{
        comment::{Comment, DeleteMode, NewComment},
        hashtag::HashtagCount,
        metric::{MetricBundle, MetricKind, Subject, SubjectKind},
        post::{NewPost, Post, PostChanges},
    },
    store::ThreadStore,
};

#[derive(Debug)]
struct PostHashtag {
    post_id: i64,
    hashtag_id: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    likes: HashSet<(Subject, i64)>,
    metrics: HashMap<(Subject, MetricKind), i64>,
    hashtags: BTreeMap<String, i64>,
    post_hashtags: Vec<PostHashtag>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn sorted(mut comments: Vec<Comment>) -> Vec<Comment> {
        comments.sort_by_key(|c| (c.created_at, c.id));
        comments
    }

    fn comments_matching(&self, keep: impl Fn(&Comment) -> bool) -> Vec<Comment> {
        Self::sorted(self.comments.values().filter(|c| keep(c)).cloned().collect())
    }

    /// Ids of every comment strictly below `root`.
    fn descendant_ids(&self, root: i64) -> HashSet<i64> {
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for c in self.comments.values() {
            if let Some(parent) = c.parent_comment_id {
                children.entry(parent).or_default().push(c.id);
            }
        }
        let mut found = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for child in children.get(&id).into_iter().flatten() {
                if found.insert(*child) {
                    stack.push(*child);
                }
            }
        }
        found
    }

    fn remove_subject_rows(&mut self, removed: &HashSet<Subject>) {
        self.likes.retain(|(subject, _)| !removed.contains(subject));
        self.metrics
            .retain(|(subject, _), _| !removed.contains(subject));
    }

    fn subject_exists(&self, subject: Subject) -> bool {
        match subject.kind {
            SubjectKind::Post => self.posts.contains_key(&subject.id),
            SubjectKind::Comment => self
                .comments
                .get(&subject.id)
                .is_some_and(|c| !c.is_deleted()),
        }
    }
}

/// In-process `ThreadStore` with the same constraints as the Postgres schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::InternalServerError("memory store poisoned".to_string()))
    }

    /// Rewrites the creation time of a hashtag association, for windowed queries.
    pub fn backdate_post_hashtags(&self, post_id: i64, days: i64) -> Result<(), AppError> {
        let mut t = self.lock()?;
        for link in t.post_hashtags.iter_mut().filter(|l| l.post_id == post_id) {
            link.created_at -= Duration::days(days);
        }
        Ok(())
    }

    pub fn hashtag_count(&self) -> Result<usize, AppError> {
        Ok(self.lock()?.hashtags.len())
    }

    pub fn post_hashtag_count(&self, post_id: i64) -> Result<usize, AppError> {
        Ok(self
            .lock()?
            .post_hashtags
            .iter()
            .filter(|l| l.post_id == post_id)
            .count())
    }
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn insert_post(&self, post: &NewPost) -> Result<Post, AppError> {
        let mut t = self.lock()?;
        let now = Utc::now();
        let row = Post {
            id: t.next_id(),
            author_id: post.author_id,
            title: post.title.clone(),
            content: post.content.clone(),
            language_code: post.language_code.clone(),
            status: post.status,
            is_pinned: post.is_pinned,
            created_at: now,
            updated_at: now,
        };
        t.posts.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_post(&self, post_id: i64) -> Result<Option<Post>, AppError> {
        Ok(self.lock()?.posts.get(&post_id).cloned())
    }

    async fn update_post(
        &self,
        post_id: i64,
        changes: &PostChanges,
    ) -> Result<Option<Post>, AppError> {
        let mut t = self.lock()?;
        let Some(post) = t.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        if let Some(title) = &changes.title {
            post.title = title.clone();
        }
        if let Some(content) = &changes.content {
            post.content = content.clone();
        }
        if let Some(language_code) = &changes.language_code {
            post.language_code = language_code.clone();
        }
        if let Some(status) = changes.status {
            post.status = status;
        }
        if let Some(is_pinned) = changes.is_pinned {
            post.is_pinned = is_pinned;
        }
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, post_id: i64) -> Result<bool, AppError> {
        let mut t = self.lock()?;
        if t.posts.remove(&post_id).is_none() {
            return Ok(false);
        }
        let mut removed: HashSet<Subject> = HashSet::from([Subject::post(post_id)]);
        t.comments.retain(|id, c| {
            if c.post_id == post_id {
                removed.insert(Subject::comment(*id));
                false
            } else {
                true
            }
        });
        t.remove_subject_rows(&removed);
        t.post_hashtags.retain(|l| l.post_id != post_id);
        Ok(true)
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, AppError> {
        let mut t = self.lock()?;
        if !t.posts.contains_key(&comment.post_id) {
            return Err(AppError::ForeignKeyViolation(format!(
                "Post {} not found",
                comment.post_id
            )));
        }
        if let Some(parent_id) = comment.parent_comment_id {
            match t.comments.get(&parent_id) {
                Some(parent) if parent.post_id == comment.post_id => {}
                _ => {
                    return Err(AppError::ForeignKeyViolation(format!(
                        "Parent comment {} not found on post {}",
                        parent_id, comment.post_id
                    )));
                }
            }
        }
        let now = Utc::now();
        let row = Comment {
            id: t.next_id(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            parent_comment_id: comment.parent_comment_id,
            content: comment.content.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        t.comments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_comment(&self, comment_id: i64) -> Result<Option<Comment>, AppError> {
        Ok(self.lock()?.comments.get(&comment_id).cloned())
    }

    async fn update_comment(
        &self,
        comment_id: i64,
        content: Option<&str>,
    ) -> Result<Option<Comment>, AppError> {
        let mut t = self.lock()?;
        let Some(comment) = t.comments.get_mut(&comment_id).filter(|c| !c.is_deleted()) else {
            return Ok(None);
        };
        if let Some(content) = content {
            comment.content = content.to_string();
        }
        comment.updated_at = Utc::now();
        Ok(Some(comment.clone()))
    }

    async fn set_comment_parent(
        &self,
        comment_id: i64,
        parent_id: Option<i64>,
    ) -> Result<Option<Comment>, AppError> {
        let mut t = self.lock()?;
        let Some(post_id) = t
            .comments
            .get(&comment_id)
            .filter(|c| !c.is_deleted())
            .map(|c| c.post_id)
        else {
            return Ok(None);
        };
        if let Some(parent_id) = parent_id {
            let same_post = t.comments.get(&parent_id).is_some_and(|p| p.post_id == post_id);
            if !same_post {
                return Err(AppError::ForeignKeyViolation(format!(
                    "Parent comment {} not found on post {}",
                    parent_id, post_id
                )));
            }
            // Checked under the same lock as the write below.
            if parent_id == comment_id || t.descendant_ids(comment_id).contains(&parent_id) {
                return Err(AppError::Validation(format!(
                    "Comment {parent_id} is a reply below comment {comment_id}"
                )));
            }
        }
        let Some(comment) = t.comments.get_mut(&comment_id) else {
            return Ok(None);
        };
        comment.parent_comment_id = parent_id;
        comment.updated_at = Utc::now();
        Ok(Some(comment.clone()))
    }

    async fn delete_comment(&self, comment_id: i64, mode: DeleteMode) -> Result<bool, AppError> {
        let mut t = self.lock()?;
        match mode {
            DeleteMode::Tombstone => {
                let Some(comment) = t.comments.get_mut(&comment_id).filter(|c| !c.is_deleted())
                else {
                    return Ok(false);
                };
                let now = Utc::now();
                comment.content.clear();
                comment.deleted_at = Some(now);
                comment.updated_at = now;
                Ok(true)
            }
            DeleteMode::Cascade => {
                if !t.comments.contains_key(&comment_id) {
                    return Ok(false);
                }
                let mut doomed = t.descendant_ids(comment_id);
                doomed.insert(comment_id);
                t.comments.retain(|id, _| !doomed.contains(id));
                let removed = doomed.into_iter().map(Subject::comment).collect();
                t.remove_subject_rows(&removed);
                Ok(true)
            }
        }
    }

    async fn list_top_level(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        Ok(self
            .lock()?
            .comments_matching(|c| c.post_id == post_id && c.parent_comment_id.is_none()))
    }

    async fn list_children(&self, comment_id: i64) -> Result<Vec<Comment>, AppError> {
        Ok(self
            .lock()?
            .comments_matching(|c| c.parent_comment_id == Some(comment_id)))
    }

    async fn list_post_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        Ok(self.lock()?.comments_matching(|c| c.post_id == post_id))
    }

    async fn list_descendants(&self, comment_id: i64) -> Result<Vec<Comment>, AppError> {
        let t = self.lock()?;
        let ids = t.descendant_ids(comment_id);
        Ok(t.comments_matching(|c| ids.contains(&c.id)))
    }

    async fn subject_exists(&self, subject: Subject) -> Result<bool, AppError> {
        Ok(self.lock()?.subject_exists(subject))
    }

    async fn add_like(&self, subject: Subject, user_id: i64) -> Result<bool, AppError> {
        let mut t = self.lock()?;
        let present = match subject.kind {
            SubjectKind::Post => t.posts.contains_key(&subject.id),
            SubjectKind::Comment => t.comments.contains_key(&subject.id),
        };
        if !present {
            return Err(AppError::ForeignKeyViolation(format!("{subject} not found")));
        }
        Ok(t.likes.insert((subject, user_id)))
    }

    async fn remove_like(&self, subject: Subject, user_id: i64) -> Result<bool, AppError> {
        Ok(self.lock()?.likes.remove(&(subject, user_id)))
    }

    async fn likers(&self, subject: Subject) -> Result<Vec<i64>, AppError> {
        let t = self.lock()?;
        let mut users: Vec<i64> = t
            .likes
            .iter()
            .filter(|(liked, _)| *liked == subject)
            .map(|(_, user_id)| *user_id)
            .collect();
        users.sort_unstable();
        Ok(users)
    }

    async fn increment_metric(
        &self,
        subject: Subject,
        metric: MetricKind,
        delta: i64,
    ) -> Result<i64, AppError> {
        let mut t = self.lock()?;
        let present = match subject.kind {
            SubjectKind::Post => t.posts.contains_key(&subject.id),
            SubjectKind::Comment => t.comments.contains_key(&subject.id),
        };
        if !present {
            return Err(AppError::ForeignKeyViolation(format!("{subject} not found")));
        }
        let counter = t.metrics.entry((subject, metric)).or_insert(0);
        *counter = counter.checked_add(delta).ok_or_else(|| {
            AppError::Validation(format!("{metric} counter of {subject} would overflow"))
        })?;
        Ok(*counter)
    }

    async fn metric(&self, subject: Subject, metric: MetricKind) -> Result<Option<i64>, AppError> {
        Ok(self.lock()?.metrics.get(&(subject, metric)).copied())
    }

    async fn metric_bundles(
        &self,
        kind: SubjectKind,
        ids: &[i64],
    ) -> Result<HashMap<i64, MetricBundle>, AppError> {
        let t = self.lock()?;
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        let mut bundles: HashMap<i64, MetricBundle> =
            ids.iter().map(|id| (*id, MetricBundle::default())).collect();

        for ((subject, metric), value) in &t.metrics {
            if subject.kind == kind && wanted.contains(&subject.id) {
                bundles.entry(subject.id).or_default().set(*metric, *value);
            }
        }
        for (subject, _) in &t.likes {
            if subject.kind == kind && wanted.contains(&subject.id) {
                bundles.entry(subject.id).or_default().likes += 1;
            }
        }
        for comment in t.comments.values().filter(|c| !c.is_deleted()) {
            let owner = match kind {
                SubjectKind::Post => Some(comment.post_id),
                SubjectKind::Comment => comment.parent_comment_id,
            };
            if let Some(owner) = owner.filter(|id| wanted.contains(id)) {
                bundles.entry(owner).or_default().replies += 1;
            }
        }
        Ok(bundles)
    }

    async fn register_post_hashtag(
        &self,
        post_id: i64,
        _author_id: i64,
        name: &str,
    ) -> Result<(), AppError> {
        let mut t = self.lock()?;
        if !t.posts.contains_key(&post_id) {
            return Err(AppError::ForeignKeyViolation(format!("Post {post_id} not found")));
        }
        let hashtag_id = match t.hashtags.get(name) {
            Some(id) => *id,
            None => {
                let id = t.next_id();
                t.hashtags.insert(name.to_string(), id);
                id
            }
        };
        let linked = t
            .post_hashtags
            .iter()
            .any(|l| l.post_id == post_id && l.hashtag_id == hashtag_id);
        if !linked {
            t.post_hashtags.push(PostHashtag {
                post_id,
                hashtag_id,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn hashtag_usage(&self, days: i32, limit: i64) -> Result<Vec<HashtagCount>, AppError> {
        let t = self.lock()?;
        let since = Utc::now() - Duration::days(i64::from(days));
        let names: HashMap<i64, &str> = t
            .hashtags
            .iter()
            .map(|(name, id)| (*id, name.as_str()))
            .collect();

        let mut counts: HashMap<&str, i64> = HashMap::new();
        for link in t.post_hashtags.iter().filter(|l| l.created_at >= since) {
            if let Some(name) = names.get(&link.hashtag_id) {
                *counts.entry(name).or_default() += 1;
            }
        }

        let mut usage: Vec<HashtagCount> = counts
            .into_iter()
            .map(|(name, count)| HashtagCount {
                name: name.to_string(),
                count,
            })
            .collect();
        usage.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        usage.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(usage)
    }
}
