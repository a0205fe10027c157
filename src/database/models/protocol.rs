use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProtocolRecord {
    pub id: i64,
    pub protocol_number: String,
    pub year: i32,
    pub sequence: i32,
    pub protocol_type: String,
    pub subject: String,
    pub counterparty: String,
    pub category: String,
    pub protocol_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Register listing row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProtocolSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: ProtocolRecord,
    pub document_count: i64,
}
