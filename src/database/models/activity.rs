use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgConnection};

/// Activity events written by the registry workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    ProtocolFiled,
    DocumentReplaced,
    ProtocolDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProtocolFiled => "PROTOCOL_FILED",
            EventType::DocumentReplaced => "DOCUMENT_REPLACED",
            EventType::ProtocolDeleted => "PROTOCOL_DELETED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityEntry {
    pub id: i64,
    pub event_type: String,
    pub description: String,
    pub protocol_id: Option<i64>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    /// Append an entry on the given connection (normally a transaction)
    pub async fn append(
        conn: &mut PgConnection,
        event: EventType,
        description: &str,
        protocol_id: Option<i64>,
        metadata: Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO activity_log (event_type, description, protocol_id, metadata)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(event.as_str())
        .bind(description)
        .bind(protocol_id)
        .bind(metadata)
        .execute(conn)
        .await?;
        Ok(())
    }
}
