//! Live feed of parking citations per enforcement officer.
//!
//! Each refresh reads the latest citation for every configured officer
//! prefix plus today's revenue totals, turns them into a sorted feed with
//! elapsed-time labels and formatted locations, and picks the citations
//! recent enough to pin on the map.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod location;
pub mod models;
pub mod recency;
pub mod render;
pub mod scheduler;
pub mod source;
pub mod timefmt;

pub use config::{FailurePolicy, FeedConfig, RecencyWindow};
pub use error::FeedError;
pub use models::{ActiveMarker, CitationRecord, Coordinates, DailyTotal, FeedSnapshot, OfficerFeedEntry};
pub use scheduler::{RefreshHandle, RefreshScheduler, ViewState};
pub use source::{CitationSource, Clock, SystemClock};
