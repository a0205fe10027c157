// Document replacement - new artifact under an existing protocol number
//
// The counter is never touched. The protocol row is locked for the duration so
// two replacements of the same protocol serialize. The previous remote file is
// left in place as a backup.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Postgres, Transaction};
use tracing::info;

use crate::database::models::{ActivityEntry, EventType, ProtocolRecord};
use crate::registry::error::FilingError;
use crate::registry::filing::{
    as_base64, sha256_hex, size_kb, stored_file_name, FilingService, FilingStage, Progress,
    DEFAULT_ORIGINAL_FILE_NAME, PDF_MIME,
};
use crate::registry::number::ProtocolNumber;
use crate::storage::UploadTarget;
use crate::types::ProtocolType;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplaceRequest {
    pub pdf_base64: Option<String>,
    pub file_name: Option<String>,
    pub reason: Option<String>,
    #[serde(skip)]
    pub replaced_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaceReceipt {
    pub protocol_id: i64,
    pub protocol_number: String,
    pub storage_url: String,
    pub previous_url: Option<String>,
    pub stored_file_name: String,
    pub size_kb: i32,
    pub sha256: String,
    #[serde(rename = "pdf_base64", serialize_with = "as_base64")]
    pub pdf: Vec<u8>,
}

/// Newest document of a protocol, if any
#[derive(Debug, sqlx::FromRow)]
struct CurrentDocument {
    id: i64,
    stored_file_name: String,
    storage_url: String,
}

impl FilingService {
    pub async fn replace_document(&self, protocol_id: i64, request: ReplaceRequest) -> Result<ReplaceReceipt, FilingError> {
        self.replace_document_at(protocol_id, request, Local::now()).await
    }

    pub async fn replace_document_at(
        &self,
        protocol_id: i64,
        request: ReplaceRequest,
        now: DateTime<Local>,
    ) -> Result<ReplaceReceipt, FilingError> {
        let pdf = self.decode_pdf(request.pdf_base64.as_deref()).await?;

        let mut progress = Progress::new();
        let mut tx = self.pool.begin().await.map_err(FilingError::Persistence)?;

        let result = self
            .within_deadline(self.execute_replace(&mut tx, protocol_id, &request, &pdf, now, &mut progress))
            .await;
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                self.abort(tx, &progress, &e).await;
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            let e = FilingError::Persistence(e);
            self.discard_orphan(&progress, &e).await;
            return Err(e);
        }
        progress.reach(FilingStage::Committed);

        info!(
            protocol_number = %receipt.protocol_number,
            url = %receipt.storage_url,
            previous = ?receipt.previous_url,
            "Document replaced"
        );
        Ok(receipt)
    }

    async fn execute_replace(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        protocol_id: i64,
        request: &ReplaceRequest,
        pdf: &[u8],
        now: DateTime<Local>,
        progress: &mut Progress,
    ) -> Result<ReplaceReceipt, FilingError> {
        let record: ProtocolRecord = sqlx::query_as("SELECT * FROM protocol_records WHERE id = $1 FOR UPDATE")
            .bind(protocol_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(FilingError::Persistence)?
            .ok_or_else(|| FilingError::NotFound(protocol_id.to_string()))?;

        // The number was issued earlier; replacement reuses it verbatim
        let number = record
            .protocol_number
            .parse::<ProtocolNumber>()
            .map_err(|e| FilingError::validation(e.to_string()))?;
        let protocol_type: ProtocolType = number.protocol_type;
        progress.number = Some(number.clone());
        progress.reach(FilingStage::NumberAllocated);

        let stamped = self.stamp_pdf(pdf, &number, now.date_naive()).await?;
        progress.reach(FilingStage::Stamped);

        let current: Option<CurrentDocument> = sqlx::query_as(
            "SELECT id, stored_file_name, storage_url FROM documents
             WHERE protocol_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(protocol_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(FilingError::Persistence)?;

        let file_name = match &current {
            Some(doc) => doc.stored_file_name.clone(),
            None => stored_file_name(&number, &self.file_tag, &record.subject),
        };
        let target = UploadTarget {
            year: record.year,
            protocol_type,
            file_name,
            mime_type: PDF_MIME.to_string(),
        };
        let stored = self
            .storage
            .upload(&target, &stamped)
            .await
            .map_err(FilingError::Upload)?;
        progress.uploaded = Some(stored.clone());
        progress.reach(FilingStage::Uploaded);

        let size_kb = size_kb(stamped.len());
        let sha256 = sha256_hex(&stamped);
        let original_file_name = request
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_ORIGINAL_FILE_NAME);

        match &current {
            Some(doc) => {
                sqlx::query(
                    "UPDATE documents
                     SET original_file_name = $1, storage_url = $2, size_kb = $3, sha256 = $4, created_at = $5
                     WHERE id = $6",
                )
                .bind(original_file_name)
                .bind(&stored.url)
                .bind(size_kb)
                .bind(&sha256)
                .bind(now.with_timezone(&Utc))
                .bind(doc.id)
                .execute(&mut **tx)
                .await
                .map_err(FilingError::Persistence)?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO documents
                        (protocol_id, original_file_name, stored_file_name, storage_url, size_kb, mime_type, sha256)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(protocol_id)
                .bind(original_file_name)
                .bind(&target.file_name)
                .bind(&stored.url)
                .bind(size_kb)
                .bind(PDF_MIME)
                .bind(&sha256)
                .execute(&mut **tx)
                .await
                .map_err(FilingError::Persistence)?;
            }
        }

        sqlx::query("UPDATE protocol_records SET updated_at = NOW() WHERE id = $1")
            .bind(protocol_id)
            .execute(&mut **tx)
            .await
            .map_err(FilingError::Persistence)?;

        let previous_url = current.map(|doc| doc.storage_url);
        ActivityEntry::append(
            &mut **tx,
            EventType::DocumentReplaced,
            &format!("Document of protocol {} replaced", record.protocol_number),
            Some(protocol_id),
            json!({
                "user": request.replaced_by,
                "reason": request.reason.as_deref().unwrap_or("not specified"),
                "previous_url": previous_url,
                "new_url": stored.url,
            }),
        )
        .await
        .map_err(FilingError::Persistence)?;
        progress.reach(FilingStage::Persisted);

        Ok(ReplaceReceipt {
            protocol_id,
            protocol_number: record.protocol_number,
            storage_url: stored.url,
            previous_url,
            stored_file_name: target.file_name,
            size_kb,
            sha256,
            pdf: stamped,
        })
    }
}
