use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::{PgPool, Row};

use crate::error::FeedError;
use crate::models::{CitationRecord, DailyTotal};
use crate::source::CitationSource;
use crate::timefmt;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed [`CitationSource`].
#[derive(Debug, Clone)]
pub struct PgCitationSource {
    pool: PgPool,
}

impl PgCitationSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn classify(query: &str, err: sqlx::Error) -> FeedError {
    match err {
        e @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed) => FeedError::Connection(e.to_string()),
        e => FeedError::query(query, e.to_string()),
    }
}

#[async_trait]
impl CitationSource for PgCitationSource {
    async fn latest_citation(&self, prefix: &str) -> Result<Option<CitationRecord>, FeedError> {
        let query_name = format!("latest_citation({prefix})");

        let row = sqlx::query(
            r#"
            SELECT c.citation_date, c.location
            FROM citation_feed.citations c
            WHERE c.citation_number LIKE $1
            ORDER BY c.citation_date DESC
            LIMIT 1
            "#,
        )
        .bind(format!("{prefix}%"))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(&query_name, e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let citation_date: DateTime<Utc> = row
            .try_get("citation_date")
            .map_err(|e| classify(&query_name, e))?;

        Ok(Some(CitationRecord {
            officer_prefix: prefix.to_string(),
            citation_timestamp: citation_timestamp(citation_date),
            location_descriptor: row
                .try_get("location")
                .map_err(|e| classify(&query_name, e))?,
        }))
    }

    async fn daily_totals(&self) -> Result<Vec<DailyTotal>, FeedError> {
        const QUERY: &str = "daily_totals";

        let rows = sqlx::query(
            "SELECT prefix, total_amount::float8 AS total_amount \
             FROM citation_feed.get_daily_totals()",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(QUERY, e))?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in rows {
            let officer_prefix: String = row.try_get("prefix").map_err(|e| classify(QUERY, e))?;
            let total_amount: Option<f64> = row
                .try_get("total_amount")
                .map_err(|e| classify(QUERY, e))?;

            totals.push(daily_total(officer_prefix, total_amount)?);
        }

        Ok(totals)
    }
}

/// `timestamptz` decodes as an instant, independent of the session
/// `DateStyle`; RFC 3339 keeps its offset explicit for the feed.
fn citation_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Totals arrive pre-aggregated; a missing or negative amount means the
/// aggregate itself is broken.
fn daily_total(officer_prefix: String, amount: Option<f64>) -> Result<DailyTotal, FeedError> {
    match amount {
        Some(total_amount) if total_amount >= 0.0 => Ok(DailyTotal {
            officer_prefix,
            total_amount,
        }),
        other => Err(FeedError::query(
            "daily_totals",
            format!("invalid total {other:?} for prefix {officer_prefix}"),
        )),
    }
}

const UPSERT_CITATION: &str = r#"
    INSERT INTO citation_feed.citations
    (citation_number, citation_date, violation, location, fine_amount)
    VALUES ($1, $2, $3, $4, $5::numeric)
    ON CONFLICT (citation_number) DO NOTHING
"#;

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let now = Utc::now();
    let citations = vec![
        ("1125173201", 4, "EXPIRED PERMIT", "PG1: GOLD GARAGE", 35.0),
        ("1125173202", 25, "NO VALID PERMIT", "LOT3: EAST OF BOOK STORE", 50.0),
        ("7325173195", 12, "PARKED IN RESERVED SPACE", "PG5: MARKET STATION", 75.0),
        ("7325173196", 48, "EXPIRED METER", "PG2: BLUE GARAGE", 25.0),
        ("0425173190", 190, "FIRE LANE", "Lot 9 overflow", 100.0),
    ];

    let mut inserted = 0usize;
    for (number, minutes_ago, violation, location, fine) in citations {
        let result = sqlx::query(UPSERT_CITATION)
            .bind(number)
            .bind(now - Duration::minutes(minutes_ago))
            .bind(violation)
            .bind(location)
            .bind(fine)
            .execute(pool)
            .await
            .with_context(|| format!("failed to seed citation {number}"))?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        citation_number: String,
        citation_date: String,
        violation: String,
        location: String,
        fine_amount: f64,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let citation_date = timefmt::parse_citation_timestamp(&row.citation_date)
            .with_context(|| format!("row {}: citation_date needs an explicit offset", line + 1))?;
        if row.fine_amount < 0.0 {
            anyhow::bail!("row {}: fine_amount must not be negative", line + 1);
        }

        let result = sqlx::query(UPSERT_CITATION)
            .bind(&row.citation_number)
            .bind(citation_date)
            .bind(&row.violation)
            .bind(&row.location)
            .bind(row.fine_amount)
            .execute(pool)
            .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
