use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Daily totals are keyed by the first two characters of the citation
/// number, so every officer prefix has exactly this many digits.
pub const PREFIX_LEN: usize = 2;

/// How long a citation counts as live on the map. Held in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecencyWindow {
    minutes: i64,
}

impl RecencyWindow {
    pub fn from_minutes(minutes: i64) -> Result<Self, FeedError> {
        if minutes <= 0 {
            return Err(FeedError::InvalidConfig(format!(
                "recency window must be positive, got {minutes} minutes"
            )));
        }
        Ok(Self { minutes })
    }

    pub fn minutes(self) -> i64 {
        self.minutes
    }

    pub fn as_duration(self) -> Duration {
        Duration::minutes(self.minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep showing the last good feed alongside the error.
    #[default]
    Retain,
    /// Drop the feed and show only the error.
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub officer_prefixes: Vec<String>,
    pub officer_numbering: BTreeMap<String, String>,
    pub recency_window_minutes: i64,
    pub refresh_interval_ms: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let officer_numbering = [("11", "01"), ("73", "02"), ("04", "03"), ("72", "04")]
            .into_iter()
            .map(|(prefix, label)| (prefix.to_string(), label.to_string()))
            .collect();

        Self {
            officer_prefixes: vec!["73".to_string(), "11".to_string(), "04".to_string()],
            officer_numbering,
            recency_window_minutes: 30,
            refresh_interval_ms: 30_000,
            failure_policy: FailurePolicy::Retain,
        }
    }
}

impl FeedConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, FeedError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FeedError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            FeedError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        if self.officer_prefixes.is_empty() {
            return Err(FeedError::InvalidConfig(
                "at least one officer prefix is required".to_string(),
            ));
        }

        for prefix in &self.officer_prefixes {
            if prefix.len() != PREFIX_LEN || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                return Err(FeedError::InvalidConfig(format!(
                    "officer prefix {prefix:?} must be exactly {PREFIX_LEN} digits"
                )));
            }
        }

        // A prefix of another prefix would match that officer's citations too.
        for (i, a) in self.officer_prefixes.iter().enumerate() {
            for b in &self.officer_prefixes[i + 1..] {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    return Err(FeedError::InvalidConfig(format!(
                        "officer prefixes {a:?} and {b:?} overlap"
                    )));
                }
            }
        }

        if self.refresh_interval_ms == 0 {
            return Err(FeedError::InvalidConfig(
                "refresh interval must be positive".to_string(),
            ));
        }

        RecencyWindow::from_minutes(self.recency_window_minutes)?;
        Ok(())
    }

    pub fn recency_window(&self) -> Result<RecencyWindow, FeedError> {
        RecencyWindow::from_minutes(self.recency_window_minutes)
    }

    pub fn refresh_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.refresh_interval_ms)
    }

    /// Badge label for a prefix, falling back to the prefix itself.
    pub fn display_label<'a>(&'a self, prefix: &'a str) -> &'a str {
        self.officer_numbering
            .get(prefix)
            .map_or(prefix, String::as_str)
    }
}
