use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// What kind of row a counter or engagement event points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Post,
    Comment,
}

impl FromStr for SubjectKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(SubjectKind::Post),
            "comment" => Ok(SubjectKind::Comment),
            other => Err(AppError::Validation(format!("Unknown subject kind '{other}'"))),
        }
    }
}

/// Stored counters. Likes and replies are never stored, they are counted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Views,
    Impressions,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Views => "views",
            MetricKind::Impressions => "impressions",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "views" => Ok(MetricKind::Views),
            "impressions" => Ok(MetricKind::Impressions),
            other => Err(AppError::Validation(format!("Unknown metric '{other}'"))),
        }
    }
}

/// A post or a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: i64,
}

impl Subject {
    pub fn post(id: i64) -> Self {
        Subject {
            kind: SubjectKind::Post,
            id,
        }
    }

    pub fn comment(id: i64) -> Self {
        Subject {
            kind: SubjectKind::Comment,
            id,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SubjectKind::Post => write!(f, "post {}", self.id),
            SubjectKind::Comment => write!(f, "comment {}", self.id),
        }
    }
}

/// Engagement counters attached to every materialized node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricBundle {
    pub views: i64,
    pub impressions: i64,
    pub likes: i64,
    pub replies: i64,
}

impl MetricBundle {
    pub fn set(&mut self, metric: MetricKind, value: i64) {
        match metric {
            MetricKind::Views => self.views = value,
            MetricKind::Impressions => self.impressions = value,
        }
    }
}

/// DTO for like / unlike requests; identity comes from the caller.
#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub user_id: i64,
}

/// Optional body of an engagement event.
#[derive(Debug, Default, Deserialize)]
pub struct EngagementRequest {
    pub delta: Option<i64>,
}
