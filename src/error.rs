/// Errors surfaced by the citation feed.
///
/// A location without a coordinate match is not an error; it shows up as
/// `coordinates: None` on the feed entry.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The persistence layer could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// A specific read against the persistence layer failed.
    #[error("query `{query}` failed: {message}")]
    Query {
        /// Name of the failed read, e.g. `latest_citation(73)`.
        query: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A stored timestamp was not a timezone-qualified instant.
    #[error("malformed citation timestamp: {value:?}")]
    MalformedTimestamp {
        /// The raw stored value.
        value: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FeedError {
    pub fn query(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            query: query.into(),
            message: message.into(),
        }
    }
}
