use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Counter {
    pub year: i32,
    pub protocol_type: String,
    pub last_seq: i32,
    pub updated_at: DateTime<Utc>,
}
