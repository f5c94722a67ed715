use chrono::{DateTime, Utc};

use crate::config::RecencyWindow;
use crate::models::{ActiveMarker, OfficerFeedEntry};

/// Feed entries recent enough and located well enough to pin on the map.
///
/// An entry qualifies when `now - timestamp` is strictly inside the window
/// and its location resolved to coordinates.
pub fn select_active(
    feed: &[OfficerFeedEntry],
    now: DateTime<Utc>,
    window: RecencyWindow,
) -> Vec<ActiveMarker> {
    feed.iter()
        .filter_map(|entry| {
            let timestamp = entry.raw_timestamp?;
            let coordinates = entry.coordinates?;
            if now - timestamp >= window.as_duration() {
                return None;
            }
            Some(ActiveMarker {
                officer_prefix: entry.officer_prefix.clone(),
                coordinates,
                entry: entry.clone(),
            })
        })
        .collect()
}

/// Which marker popup is open, if any. Owned by the view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: Option<String>,
}

impl Selection {
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Clicking the open marker closes it; clicking another one replaces it.
    pub fn click_marker(&mut self, prefix: &str) {
        self.selected = match self.selected.take() {
            Some(current) if current == prefix => None,
            _ => Some(prefix.to_string()),
        };
    }

    pub fn click_background(&mut self) {
        self.selected = None;
    }

    /// Drops the selection if its marker is no longer on the map. Returns
    /// `true` when something was cleared.
    pub fn retain_visible(&mut self, markers: &[ActiveMarker]) -> bool {
        let Some(current) = self.selected.as_deref() else {
            return false;
        };
        if markers.iter().any(|m| m.officer_prefix == current) {
            return false;
        }
        log::debug!("Marker {current} aged out while its popup was open; closing popup");
        self.selected = None;
        true
    }
}

/// What the core needs from a map widget.
pub trait MapSurface {
    fn clear(&mut self);
    fn place_marker(&mut self, latitude: f64, longitude: f64, content: &str);
    fn show_popup(&mut self, latitude: f64, longitude: f64, content: &str);
}
