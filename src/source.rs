use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FeedError;
use crate::models::{CitationRecord, DailyTotal};

/// Read side of citation storage.
#[async_trait]
pub trait CitationSource: Send + Sync {
    /// Most recent citation whose number starts with `prefix`.
    async fn latest_citation(&self, prefix: &str) -> Result<Option<CitationRecord>, FeedError>;

    /// Today's precomputed total per prefix.
    async fn daily_totals(&self) -> Result<Vec<DailyTotal>, FeedError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
