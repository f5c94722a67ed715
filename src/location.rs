use std::collections::BTreeMap;

use crate::models::Coordinates;

pub const NO_LOCATION_LABEL: &str = "N/A";

/// Known campus locations, keyed by normalized descriptor.
const CAMPUS_LOCATIONS: &[(&str, f64, f64)] = &[
    ("PG1: GOLD GARAGE", 25.754_46, -80.372_03),
    ("PG2: BLUE GARAGE", 25.753_38, -80.371_86),
    ("PG3: PANTHER GARAGE", 25.758_97, -80.379_87),
    ("PG4: RED GARAGE", 25.760_24, -80.373_49),
    ("PG5: MARKET STATION", 25.760_83, -80.371_78),
    ("PG6: TECH STATION", 25.760_02, -80.376_97),
    ("LOT1: NORTH OF ARENA", 25.759_88, -80.380_91),
    ("LOT3: EAST OF BOOK STORE", 25.757_61, -80.373_01),
    ("LOT5: WEST OF STADIUM", 25.752_31, -80.380_44),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub formatted: String,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateTable {
    entries: BTreeMap<String, Coordinates>,
}

impl Default for CoordinateTable {
    fn default() -> Self {
        Self::from_entries(
            CAMPUS_LOCATIONS
                .iter()
                .map(|(name, latitude, longitude)| {
                    (
                        *name,
                        Coordinates {
                            latitude: *latitude,
                            longitude: *longitude,
                        },
                    )
                }),
        )
    }
}

impl CoordinateTable {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, Coordinates)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, coordinates)| (normalize_key(name), coordinates))
                .collect(),
        }
    }

    /// Exact match on the normalized key. No fuzzy matching.
    pub fn lookup(&self, descriptor: &str) -> Option<Coordinates> {
        self.entries.get(&normalize_key(descriptor)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, descriptor: &str) -> ResolvedLocation {
        ResolvedLocation {
            formatted: format_location(descriptor),
            coordinates: self.lookup(descriptor),
        }
    }
}

pub fn normalize_key(descriptor: &str) -> String {
    descriptor.trim().to_uppercase()
}

/// `"PG1: gold garage"` becomes `"PG1: Gold Garage"`. Descriptors without a
/// colon come back unchanged. Words are split on any whitespace, and the
/// separators inside the remainder are kept as they were.
pub fn format_location(descriptor: &str) -> String {
    let Some((prefix, remainder)) = descriptor.split_once(':') else {
        return descriptor.to_string();
    };

    format!("{prefix}: {}", title_case(remainder.trim()))
}

fn title_case(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut word_start = true;

    for c in text.chars() {
        if c.is_whitespace() {
            output.push(c);
            word_start = true;
        } else if word_start {
            output.extend(c.to_uppercase());
            word_start = false;
        } else {
            output.extend(c.to_lowercase());
        }
    }

    output
}
