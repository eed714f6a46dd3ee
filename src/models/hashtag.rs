use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Usage of a tag within a time window.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct HashtagCount {
    pub name: String,
    pub count: i64,
}

/// Query parameters for the usage ranking.
#[derive(Debug, Deserialize)]
pub struct HashtagUsageParams {
    /// Window size in days (default: 7).
    pub days: Option<i32>,

    /// Number of tags to return (default: 20, max: 100).
    pub limit: Option<i64>,
}
