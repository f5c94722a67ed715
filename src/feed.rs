use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::FeedConfig;
use crate::location::{CoordinateTable, NO_LOCATION_LABEL};
use crate::models::{CitationRecord, DailyTotal, OfficerFeedEntry};
use crate::timefmt::{self, NO_DATA_LABEL};

/// Builds one feed entry per configured prefix, newest citation first.
///
/// Either input may be empty; a prefix with no citation gets the "no data"
/// entry and a prefix with no total gets zero.
pub fn aggregate(
    citations: &[CitationRecord],
    totals: &[DailyTotal],
    config: &FeedConfig,
    table: &CoordinateTable,
    now: DateTime<Utc>,
) -> Vec<OfficerFeedEntry> {
    let totals_by_prefix: HashMap<&str, f64> = totals
        .iter()
        .map(|total| (total.officer_prefix.as_str(), total.total_amount))
        .collect();

    let mut entries: Vec<OfficerFeedEntry> = config
        .officer_prefixes
        .iter()
        .map(|prefix| {
            let citation = citations
                .iter()
                .find(|record| record.officer_prefix == *prefix);
            let today_total = totals_by_prefix.get(prefix.as_str()).copied().unwrap_or(0.0);
            build_entry(prefix, citation, today_total, config, table, now)
        })
        .collect();

    sort_feed(&mut entries);
    entries
}

fn build_entry(
    prefix: &str,
    citation: Option<&CitationRecord>,
    today_total: f64,
    config: &FeedConfig,
    table: &CoordinateTable,
    now: DateTime<Utc>,
) -> OfficerFeedEntry {
    let mut entry = OfficerFeedEntry {
        officer_prefix: prefix.to_string(),
        display_label: config.display_label(prefix).to_string(),
        relative_time_label: NO_DATA_LABEL.to_string(),
        formatted_location: NO_LOCATION_LABEL.to_string(),
        raw_timestamp: None,
        today_total,
        coordinates: None,
    };

    let Some(citation) = citation else {
        return entry;
    };

    match timefmt::parse_citation_timestamp(&citation.citation_timestamp) {
        Ok(instant) => {
            let location = table.resolve(&citation.location_descriptor);
            entry.relative_time_label = timefmt::relative_label(instant, now);
            entry.formatted_location = location.formatted;
            entry.coordinates = location.coordinates;
            entry.raw_timestamp = Some(instant);
        }
        Err(e) => {
            log::warn!("Officer {prefix}: {e}; showing no data");
        }
    }

    entry
}

/// Stable sort: newest timestamp first, entries without one last in their
/// original order.
pub fn sort_feed(entries: &mut [OfficerFeedEntry]) {
    entries.sort_by(|a, b| match (a.raw_timestamp, b.raw_timestamp) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
