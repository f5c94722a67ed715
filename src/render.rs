use std::fmt::Write;

use crate::models::{ActiveMarker, OfficerFeedEntry};
use crate::recency::{MapSurface, Selection};
use crate::scheduler::ViewState;

pub fn render_entry(entry: &OfficerFeedEntry) -> String {
    format!(
        "{}  {}  {} • {}",
        entry.officer_label(),
        entry.total_label(),
        entry.formatted_location,
        entry.relative_time_label
    )
}

pub fn render_feed(entries: &[OfficerFeedEntry]) -> String {
    let mut output = String::new();

    if entries.is_empty() {
        let _ = writeln!(output, "No officers configured.");
        return output;
    }

    for entry in entries {
        let _ = writeln!(output, "{}", render_entry(entry));
    }

    output
}

pub fn render_state(state: &ViewState, selection: &Selection) -> String {
    let mut output = String::new();

    if let Some(error) = &state.error {
        let _ = writeln!(output, "Error loading data. ({error})");
    }

    let Some(snapshot) = &state.snapshot else {
        if state.error.is_none() {
            let _ = writeln!(output, "Loading...");
        }
        return output;
    };

    let _ = writeln!(output, "## Latest Citations");
    output.push_str(&render_feed(&snapshot.entries));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Live Map");

    if snapshot.markers.is_empty() {
        let _ = writeln!(output, "No recent citations on the map.");
    } else {
        let mut map = TextMap::default();
        draw_map(&mut map, &snapshot.markers, selection);
        output.push_str(&map.into_string());
    }

    output
}

/// Places every marker, then the popup of the selected one if it is still
/// on the map.
pub fn draw_map(surface: &mut dyn MapSurface, markers: &[ActiveMarker], selection: &Selection) {
    surface.clear();

    for marker in markers {
        surface.place_marker(
            marker.coordinates.latitude,
            marker.coordinates.longitude,
            &marker.entry.officer_label(),
        );
    }

    let open = selection
        .selected()
        .and_then(|prefix| markers.iter().find(|m| m.officer_prefix == prefix));
    if let Some(marker) = open {
        surface.show_popup(
            marker.coordinates.latitude,
            marker.coordinates.longitude,
            &render_entry(&marker.entry),
        );
    }
}

/// Map surface that lists pins as text lines.
#[derive(Debug, Default)]
pub struct TextMap {
    lines: Vec<String>,
}

impl TextMap {
    pub fn into_string(self) -> String {
        let mut output = String::new();
        for line in self.lines {
            let _ = writeln!(output, "{line}");
        }
        output
    }
}

impl MapSurface for TextMap {
    fn clear(&mut self) {
        self.lines.clear();
    }

    fn place_marker(&mut self, latitude: f64, longitude: f64, content: &str) {
        self.lines
            .push(format!("- pin ({latitude:.5}, {longitude:.5}) {content}"));
    }

    fn show_popup(&mut self, latitude: f64, longitude: f64, content: &str) {
        self.lines
            .push(format!("  popup ({latitude:.5}, {longitude:.5}) {content}"));
    }
}
