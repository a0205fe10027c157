//! Read side of the register: listings, details, counters and dashboard figures.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::database::models::{Counter, Document, ProtocolRecord, ProtocolSummary};
use crate::registry::error::FilingError;
use crate::types::ProtocolType;

/// Maximum rows returned by a register listing
pub const LIST_LIMIT: i64 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilter {
    pub year: Option<i32>,
    #[serde(alias = "type")]
    pub protocol_type: Option<ProtocolType>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeTotals {
    pub total: i64,
    pub incoming: i64,
    pub outgoing: i64,
    pub internal: i64,
}

impl TypeTotals {
    fn add(&mut self, protocol_type: &str, count: i64) {
        match protocol_type.trim().parse::<ProtocolType>() {
            Ok(ProtocolType::Incoming) => self.incoming += count,
            Ok(ProtocolType::Outgoing) => self.outgoing += count,
            Ok(ProtocolType::Internal) => self.internal += count,
            Err(_) => {}
        }
        self.total += count;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Register {
    pub year: i32,
    pub totals: TypeTotals,
    pub records: Vec<ProtocolSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtocolDetail {
    #[serde(flatten)]
    pub record: ProtocolRecord,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PeriodCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub year: i32,
    pub totals: TypeTotals,
    pub last_7_days: i64,
    /// Percent change of this month against the previous one
    pub month_variation: i64,
    pub per_month: Vec<PeriodCount>,
    pub per_day: Vec<PeriodCount>,
    pub recent: Vec<ProtocolRecord>,
}

/// Escape `LIKE` wildcards and wrap for substring matching
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Month-over-month change in percent; an empty previous month counts as one
pub fn month_variation(current: i64, previous: i64) -> i64 {
    let previous = if previous == 0 { 1 } else { previous };
    (((current - previous) as f64 / previous as f64) * 100.0).round() as i64
}

async fn year_totals(pool: &PgPool, year: i32) -> Result<TypeTotals, FilingError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT protocol_type::text, COUNT(*) FROM protocol_records WHERE year = $1 GROUP BY protocol_type",
    )
    .bind(year)
    .fetch_all(pool)
    .await
    .map_err(FilingError::Database)?;

    let mut totals = TypeTotals::default();
    for (protocol_type, count) in rows {
        totals.add(&protocol_type, count);
    }
    Ok(totals)
}

/// Register for one year, newest first, optionally narrowed by type and text
pub async fn list(pool: &PgPool, year: i32, filter: &ListFilter) -> Result<Register, FilingError> {
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern);

    let records: Vec<ProtocolSummary> = sqlx::query_as(
        "SELECT p.*, COUNT(d.id) AS document_count
         FROM protocol_records p
         LEFT JOIN documents d ON d.protocol_id = p.id
         WHERE p.year = $1
           AND ($2::text IS NULL OR p.protocol_type = $2)
           AND ($3::text IS NULL
                OR p.protocol_number ILIKE $3
                OR p.subject ILIKE $3
                OR p.counterparty ILIKE $3)
         GROUP BY p.id
         ORDER BY p.sequence DESC, p.id DESC
         LIMIT $4",
    )
    .bind(year)
    .bind(filter.protocol_type.map(|t| t.code()))
    .bind(search)
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(FilingError::Database)?;

    Ok(Register {
        year,
        totals: year_totals(pool, year).await?,
        records,
    })
}

pub async fn get(pool: &PgPool, id: i64) -> Result<ProtocolDetail, FilingError> {
    let record: ProtocolRecord = sqlx::query_as("SELECT * FROM protocol_records WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(FilingError::Database)?
        .ok_or_else(|| FilingError::NotFound(id.to_string()))?;

    let documents: Vec<Document> = sqlx::query_as(
        "SELECT * FROM documents WHERE protocol_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .map_err(FilingError::Database)?;

    Ok(ProtocolDetail { record, documents })
}

/// Look a protocol up by its formatted number
pub async fn find_by_number(pool: &PgPool, number: &str) -> Result<ProtocolRecord, FilingError> {
    sqlx::query_as("SELECT * FROM protocol_records WHERE protocol_number = $1")
        .bind(number)
        .fetch_optional(pool)
        .await
        .map_err(FilingError::Database)?
        .ok_or_else(|| FilingError::NotFound(number.to_string()))
}

pub async fn counters(pool: &PgPool, year: Option<i32>) -> Result<Vec<Counter>, FilingError> {
    sqlx::query_as(
        "SELECT year, protocol_type::text AS protocol_type, last_seq, updated_at
         FROM counters
         WHERE $1::int IS NULL OR year = $1
         ORDER BY year DESC, protocol_type",
    )
    .bind(year)
    .fetch_all(pool)
    .await
    .map_err(FilingError::Database)
}

pub async fn dashboard(pool: &PgPool, year: i32) -> Result<Dashboard, FilingError> {
    let totals = year_totals(pool, year).await?;

    let (last_7_days, current_month, previous_month): (i64, i64, i64) = sqlx::query_as(
        "SELECT
            COUNT(*) FILTER (WHERE protocol_date >= NOW() - INTERVAL '7 days'),
            COUNT(*) FILTER (WHERE protocol_date >= DATE_TRUNC('month', NOW())),
            COUNT(*) FILTER (WHERE protocol_date >= DATE_TRUNC('month', NOW() - INTERVAL '1 month')
                               AND protocol_date < DATE_TRUNC('month', NOW()))
         FROM protocol_records
         WHERE year = $1",
    )
    .bind(year)
    .fetch_one(pool)
    .await
    .map_err(FilingError::Database)?;

    let per_month: Vec<PeriodCount> = sqlx::query_as(
        "SELECT TO_CHAR(DATE_TRUNC('month', protocol_date), 'YYYY-MM') AS label, COUNT(*) AS count
         FROM protocol_records
         WHERE protocol_date >= DATE_TRUNC('month', NOW()) - INTERVAL '5 months'
         GROUP BY 1
         ORDER BY 1",
    )
    .fetch_all(pool)
    .await
    .map_err(FilingError::Database)?;

    let per_day: Vec<PeriodCount> = sqlx::query_as(
        "SELECT TO_CHAR(DATE(protocol_date), 'DD/MM') AS label, COUNT(*) AS count
         FROM protocol_records
         WHERE protocol_date >= NOW() - INTERVAL '7 days'
         GROUP BY DATE(protocol_date)
         ORDER BY DATE(protocol_date)",
    )
    .fetch_all(pool)
    .await
    .map_err(FilingError::Database)?;

    let recent: Vec<ProtocolRecord> = sqlx::query_as(
        "SELECT * FROM protocol_records WHERE year = $1 ORDER BY protocol_date DESC, id DESC LIMIT 10",
    )
    .bind(year)
    .fetch_all(pool)
    .await
    .map_err(FilingError::Database)?;

    Ok(Dashboard {
        year,
        totals,
        last_7_days,
        month_variation: month_variation(current_month, previous_month),
        per_month,
        per_day,
        recent,
    })
}
