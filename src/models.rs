use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest citation issued under one officer prefix, as read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationRecord {
    pub officer_prefix: String,
    pub citation_timestamp: String,
    pub location_descriptor: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    pub officer_prefix: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One row of the officer feed. Always present for every configured prefix.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficerFeedEntry {
    pub officer_prefix: String,
    pub display_label: String,
    pub relative_time_label: String,
    pub formatted_location: String,
    pub raw_timestamp: Option<DateTime<Utc>>,
    pub today_total: f64,
    #[serde(skip)]
    pub coordinates: Option<Coordinates>,
}

impl OfficerFeedEntry {
    pub fn officer_label(&self) -> String {
        format!("Officer {}", self.display_label)
    }

    pub fn total_label(&self) -> String {
        format!("${:.2} tdy.", self.today_total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMarker {
    pub officer_prefix: String,
    pub coordinates: Coordinates,
    pub entry: OfficerFeedEntry,
}

/// Result of one successful refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub entries: Vec<OfficerFeedEntry>,
    pub markers: Vec<ActiveMarker>,
    pub computed_at: DateTime<Utc>,
}
