use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::database::models::{ActivityEntry, EventType};
use crate::registry::error::FilingError;
use crate::registry::filing::FilingService;

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub protocol_id: i64,
    pub protocol_number: String,
    pub documents_deleted: u64,
    pub activity_deleted: u64,
    pub remote_files_deleted: usize,
    pub remote_files_failed: usize,
}

impl FilingService {
    /// Remove a protocol with its documents and activity.
    ///
    /// Remote files are deleted after commit and never fail the request. The
    /// counter is left as is: a deleted number is not reissued.
    pub async fn delete_protocol(&self, protocol_id: i64, deleted_by: &str) -> Result<DeletionReport, FilingError> {
        let mut tx = self.pool.begin().await.map_err(FilingError::Database)?;

        let (protocol_number,): (String,) =
            sqlx::query_as("SELECT protocol_number FROM protocol_records WHERE id = $1 FOR UPDATE")
                .bind(protocol_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(FilingError::Database)?
                .ok_or_else(|| FilingError::NotFound(protocol_id.to_string()))?;

        let urls: Vec<String> = sqlx::query_scalar("SELECT storage_url FROM documents WHERE protocol_id = $1")
            .bind(protocol_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(FilingError::Database)?;

        let activity_deleted = sqlx::query("DELETE FROM activity_log WHERE protocol_id = $1")
            .bind(protocol_id)
            .execute(&mut *tx)
            .await
            .map_err(FilingError::Database)?
            .rows_affected();

        let documents_deleted = sqlx::query("DELETE FROM documents WHERE protocol_id = $1")
            .bind(protocol_id)
            .execute(&mut *tx)
            .await
            .map_err(FilingError::Database)?
            .rows_affected();

        sqlx::query("DELETE FROM protocol_records WHERE id = $1")
            .bind(protocol_id)
            .execute(&mut *tx)
            .await
            .map_err(FilingError::Database)?;

        ActivityEntry::append(
            &mut *tx,
            EventType::ProtocolDeleted,
            &format!("Protocol {} deleted ({} remote files)", protocol_number, urls.len()),
            None,
            json!({
                "protocol_number": protocol_number,
                "deleted_by": deleted_by,
                "documents": documents_deleted,
                "activity_entries": activity_deleted,
                "remote_files": urls.len(),
            }),
        )
        .await
        .map_err(FilingError::Database)?;

        tx.commit().await.map_err(FilingError::Database)?;
        info!(%protocol_number, deleted_by, "Protocol deleted");

        let outcomes = join_all(urls.iter().map(|url| self.storage.delete(url))).await;
        let mut remote_files_deleted = 0;
        let mut remote_files_failed = 0;
        for (url, outcome) in urls.iter().zip(outcomes) {
            match outcome {
                Ok(()) => remote_files_deleted += 1,
                Err(e) => {
                    remote_files_failed += 1;
                    warn!(%url, error = %e, "Could not delete remote file of deleted protocol");
                }
            }
        }

        Ok(DeletionReport {
            protocol_id,
            protocol_number,
            documents_deleted,
            activity_deleted,
            remote_files_deleted,
            remote_files_failed,
        })
    }
}
