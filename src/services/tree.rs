//! Expands the flat parent-pointer rows of a thread into nested nodes.
//!
//! A thread is fetched with one query for the rows and a fixed number of
//! queries for the counters, then grouped by parent id in a single pass.
//! Assembly walks the tree with an explicit stack, so arbitrarily deep reply
//! chains never grow the call stack.

use std::collections::HashMap;

use crate::{
    error::AppError,
    models::{
        comment::{Comment, CommentNode},
        metric::{MetricBundle, SubjectKind},
    },
    store::DynStore,
};

/// Nodes assembled between two cooperative yields. A dropped request
/// future stops at the next yield point.
const YIELD_EVERY: usize = 1024;

#[derive(Clone)]
pub struct TreeMaterializer {
    store: DynStore,
}

impl TreeMaterializer {
    pub fn new(store: DynStore) -> Self {
        TreeMaterializer { store }
    }

    /// The whole comment forest of a post. Empty when nobody commented yet.
    pub async fn materialize_post_thread(&self, post_id: i64) -> Result<Vec<CommentNode>, AppError> {
        if self.store.find_post(post_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Post {post_id} not found")));
        }
        let comments = self.store.list_post_comments(post_id).await?;
        self.assemble(comments, |c| c.parent_comment_id.is_none())
            .await
    }

    /// A single comment with every reply below it.
    pub async fn materialize_comment_thread(&self, comment_id: i64) -> Result<CommentNode, AppError> {
        let root = self
            .store
            .find_comment(comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {comment_id} not found")))?;

        let mut comments = vec![root];
        comments.extend(self.store.list_descendants(comment_id).await?);

        self.assemble(comments, |c| c.id == comment_id)
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("Comment {comment_id} not found")))
    }

    async fn assemble(
        &self,
        comments: Vec<Comment>,
        is_root: impl Fn(&Comment) -> bool,
    ) -> Result<Vec<CommentNode>, AppError> {
        let ids: Vec<i64> = comments.iter().map(|c| c.id).collect();
        let bundles = self
            .store
            .metric_bundles(SubjectKind::Comment, &ids)
            .await?;
        Ok(build_forest(comments, is_root, bundles).await)
    }
}

/// Groups `comments` (already ordered by creation) under their parents.
///
/// Siblings keep the input order at every depth. Rows whose parent is not in
/// the input are left out rather than promoted to roots.
pub async fn build_forest(
    comments: Vec<Comment>,
    is_root: impl Fn(&Comment) -> bool,
    mut bundles: HashMap<i64, MetricBundle>,
) -> Vec<CommentNode> {
    let n = comments.len();
    let position: HashMap<i64, usize> = comments
        .iter()
        .enumerate()
        .map(|(pos, c)| (c.id, pos))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (pos, c) in comments.iter().enumerate() {
        if is_root(c) {
            roots.push(pos);
            continue;
        }
        match c.parent_comment_id.and_then(|p| position.get(&p)) {
            Some(&parent) => children[parent].push(pos),
            None => tracing::warn!(
                "Comment {} skipped: parent {:?} is not part of the thread",
                c.id,
                c.parent_comment_id
            ),
        }
    }

    let mut rows: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..n).map(|_| None).collect();
    let mut visited = vec![false; n];
    let mut assembled = 0usize;

    // Post-order walk: a node is built once all of its children are.
    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&r| (r, false)).collect();
    while let Some((pos, expanded)) = stack.pop() {
        if expanded {
            let kids: Vec<CommentNode> = children[pos]
                .iter()
                .filter_map(|&k| built[k].take())
                .collect();
            if let Some(comment) = rows[pos].take() {
                let metrics = bundles.remove(&comment.id).unwrap_or_default();
                built[pos] = Some(CommentNode::new(comment, metrics, kids));
            }
            assembled += 1;
            if assembled % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
            continue;
        }
        if visited[pos] {
            continue;
        }
        visited[pos] = true;
        stack.push((pos, true));
        stack.extend(children[pos].iter().rev().map(|&k| (k, false)));
    }

    roots.into_iter().filter_map(|r| built[r].take()).collect()
}
