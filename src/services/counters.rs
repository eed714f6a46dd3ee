use crate::{
    error::AppError,
    models::metric::{MetricBundle, MetricKind, Subject},
    store::DynStore,
};

/// Engagement counters and likes.
///
/// Views and impressions are stored accumulators updated with a single upsert.
/// Likes and replies are counted from their own tables on every read.
#[derive(Clone)]
pub struct CounterStore {
    store: DynStore,
}

impl CounterStore {
    pub fn new(store: DynStore) -> Self {
        CounterStore { store }
    }

    async fn ensure_exists(&self, subject: Subject) -> Result<(), AppError> {
        if !self.store.subject_exists(subject).await? {
            return Err(AppError::NotFound(format!("{subject} not found")));
        }
        Ok(())
    }

    /// Adds `delta` to the counter, creating it on first use. Returns the new value.
    pub async fn increment(
        &self,
        subject: Subject,
        metric: MetricKind,
        delta: i64,
    ) -> Result<i64, AppError> {
        if delta < 1 {
            return Err(AppError::Validation(
                "Counters only move forward, delta must be at least 1".to_string(),
            ));
        }
        self.ensure_exists(subject).await?;

        // The subject can vanish between the check and the upsert.
        self.store
            .increment_metric(subject, metric, delta)
            .await
            .map_err(|e| match e {
                AppError::ForeignKeyViolation(_) => {
                    AppError::NotFound(format!("{subject} not found"))
                }
                other => other,
            })
    }

    /// Current value, 0 when the counter was never incremented.
    pub async fn get(&self, subject: Subject, metric: MetricKind) -> Result<i64, AppError> {
        Ok(self.store.metric(subject, metric).await?.unwrap_or(0))
    }

    pub async fn get_bundle(&self, subject: Subject) -> Result<MetricBundle, AppError> {
        let mut bundles = self
            .store
            .metric_bundles(subject.kind, &[subject.id])
            .await?;
        Ok(bundles.remove(&subject.id).unwrap_or_default())
    }

    /// Returns false when the user already liked the subject.
    pub async fn like(&self, subject: Subject, user_id: i64) -> Result<bool, AppError> {
        self.ensure_exists(subject).await?;
        self.store.add_like(subject, user_id).await.map_err(|e| match e {
            AppError::ForeignKeyViolation(_) => AppError::NotFound(format!("{subject} not found")),
            other => other,
        })
    }

    /// Returns false when there was no like to remove.
    pub async fn unlike(&self, subject: Subject, user_id: i64) -> Result<bool, AppError> {
        self.ensure_exists(subject).await?;
        self.store.remove_like(subject, user_id).await
    }

    pub async fn likers(&self, subject: Subject) -> Result<Vec<i64>, AppError> {
        self.ensure_exists(subject).await?;
        self.store.likers(subject).await
    }
}
