//! Fire-and-forget side effects scheduled by write paths.
//!
//! Requests enqueue and return immediately; a worker drains the channel and
//! retries failures with exponential backoff. Delivery is at-least-once, so
//! every task handler must be idempotent.

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{error::AppError, services::HashtagIndexer};

const BASE_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Link the hashtags found in `content` to the post.
    IndexHashtags {
        author_id: i64,
        post_id: i64,
        content: String,
    },
}

/// Sending half of the side-effect channel.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Task>,
}

impl TaskQueue {
    pub fn channel() -> (TaskQueue, mpsc::UnboundedReceiver<Task>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (TaskQueue { sender }, receiver)
    }

    /// Never blocks and never fails the caller; a closed queue is only logged.
    pub fn enqueue(&self, task: Task) {
        if let Err(e) = self.sender.send(task) {
            tracing::error!("Side-effect queue closed, dropping {:?}", e.0);
        }
    }
}

/// Spawns the consumer. Each task runs on its own so a retrying task does
/// not hold back the rest of the queue.
pub fn spawn_worker(
    indexer: HashtagIndexer,
    mut receiver: mpsc::UnboundedReceiver<Task>,
    max_attempts: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(task) = receiver.recv().await {
            let indexer = indexer.clone();
            tokio::spawn(async move {
                run_with_retry(&indexer, task, max_attempts).await;
            });
        }
        tracing::info!("Side-effect queue drained, worker stopping");
    })
}

async fn run(indexer: &HashtagIndexer, task: &Task) -> Result<(), AppError> {
    match task {
        Task::IndexHashtags {
            author_id,
            post_id,
            content,
        } => {
            let tags = indexer
                .register_for_post(*author_id, *post_id, content)
                .await?;
            tracing::debug!("Indexed {} hashtag(s) for post {}", tags.len(), post_id);
            Ok(())
        }
    }
}

/// Whether another attempt could succeed.
fn worth_retrying(err: &AppError) -> bool {
    !matches!(
        err,
        AppError::Validation(_) | AppError::NotFound(_) | AppError::ForeignKeyViolation(_)
    )
}

fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.saturating_pow(attempt.saturating_sub(1).min(10))
}

pub async fn run_with_retry(indexer: &HashtagIndexer, task: Task, max_attempts: u32) {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match run(indexer, &task).await {
            Ok(()) => return,
            Err(e) if attempt < max_attempts && worth_retrying(&e) => {
                let delay = backoff(attempt);
                tracing::warn!(
                    "Task {:?} failed (attempt {}/{}): {}; retrying in {:?}",
                    task,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!("Task {:?} abandoned after {} attempt(s): {}", task, attempt, e);
                return;
            }
        }
    }
}
