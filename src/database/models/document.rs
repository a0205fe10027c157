use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored artifact of a protocol. Replacements update the newest row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub protocol_id: i64,
    pub original_file_name: String,
    pub stored_file_name: String,
    pub storage_url: String,
    pub size_kb: i32,
    pub mime_type: String,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}
