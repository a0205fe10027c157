// Filing transaction - allocate, stamp, upload, persist, log, commit
//
// Remote storage cannot take part in the database transaction. The upload
// happens after the number is allocated and before commit, so an upload
// failure rolls everything back without consuming the number. When the upload
// succeeds and a later step fails, the uploaded object is orphaned: it is
// logged and a best-effort delete is attempted.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::database::models::{ActivityEntry, EventType};
use crate::registry::counter::SequenceAllocator;
use crate::registry::error::FilingError;
use crate::registry::number::ProtocolNumber;
use crate::stamp::{StampError, Stamper};
use crate::storage::{StorageBackend, StoredObject, UploadTarget};
use crate::types::ProtocolType;

pub const PDF_MIME: &str = "application/pdf";
pub const DEFAULT_SUBJECT: &str = "Documento caricato";
pub const DEFAULT_COUNTERPARTY: &str = "N/A";
pub const DEFAULT_ORIGINAL_FILE_NAME: &str = "documento_caricato.pdf";
const FILE_NAME_SUBJECT_FALLBACK: &str = "documento";
const MAX_SUBJECT_IN_FILE_NAME: usize = 150;

/// Workflow position. Anything short of `Committed` rolls back to `Start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilingStage {
    Start,
    NumberAllocated,
    Stamped,
    Uploaded,
    Persisted,
    Committed,
}

impl FilingStage {
    pub fn next(self) -> Option<FilingStage> {
        match self {
            FilingStage::Start => Some(FilingStage::NumberAllocated),
            FilingStage::NumberAllocated => Some(FilingStage::Stamped),
            FilingStage::Stamped => Some(FilingStage::Uploaded),
            FilingStage::Uploaded => Some(FilingStage::Persisted),
            FilingStage::Persisted => Some(FilingStage::Committed),
            FilingStage::Committed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilingStage::Start => "start",
            FilingStage::NumberAllocated => "number_allocated",
            FilingStage::Stamped => "stamped",
            FilingStage::Uploaded => "uploaded",
            FilingStage::Persisted => "persisted",
            FilingStage::Committed => "committed",
        }
    }
}

impl fmt::Display for FilingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filing input as received from the API or CLI
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilingRequest {
    #[serde(alias = "type")]
    pub protocol_type: Option<String>,
    pub subject: Option<String>,
    pub counterparty: Option<String>,
    pub file_name: Option<String>,
    pub pdf_base64: Option<String>,
    /// Username of the operator, set from the authenticated session
    #[serde(skip)]
    pub filed_by: Option<String>,
}

/// A request that passed validation
#[derive(Debug, Clone)]
pub(crate) struct ValidatedFiling {
    pub protocol_type: ProtocolType,
    pub subject: String,
    pub counterparty: String,
    pub original_file_name: String,
    pub file_name_subject: String,
    pub pdf: Vec<u8>,
    pub filed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilingReceipt {
    pub id: i64,
    pub protocol_number: ProtocolNumber,
    pub sequence: i32,
    /// `dd/mm/yyyy`
    pub protocol_date: String,
    pub storage_url: String,
    pub stored_file_name: String,
    pub size_kb: i32,
    pub sha256: String,
    #[serde(rename = "pdf_base64", serialize_with = "as_base64")]
    pub pdf: Vec<u8>,
}

pub(crate) fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// Coordinates numbering, stamping, storage and persistence
#[derive(Clone)]
pub struct FilingService {
    pub(crate) pool: PgPool,
    pub(crate) allocator: SequenceAllocator,
    pub(crate) storage: Arc<dyn StorageBackend>,
    pub(crate) stamper: Arc<dyn Stamper>,
    pub(crate) file_tag: String,
    pub(crate) timeout: Duration,
}

/// How far a filing got, for rollback logging and orphan cleanup
#[derive(Debug)]
pub(crate) struct Progress {
    pub stage: FilingStage,
    pub number: Option<ProtocolNumber>,
    pub uploaded: Option<StoredObject>,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            stage: FilingStage::Start,
            number: None,
            uploaded: None,
        }
    }

    pub fn reach(&mut self, stage: FilingStage) {
        debug_assert_eq!(self.stage.next(), Some(stage), "filing stages out of order");
        self.stage = stage;
        debug!(stage = %stage, number = ?self.number.as_ref().map(ToString::to_string), "filing stage reached");
    }
}

impl FilingService {
    pub fn new(
        pool: PgPool,
        config: &RegistryConfig,
        storage: Arc<dyn StorageBackend>,
        stamper: Arc<dyn Stamper>,
    ) -> Self {
        Self {
            pool,
            allocator: SequenceAllocator::new(config),
            storage,
            stamper,
            file_tag: config.file_tag.clone(),
            timeout: config.filing_timeout(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn allocator(&self) -> &SequenceAllocator {
        &self.allocator
    }

    pub fn storage_name(&self) -> &'static str {
        self.storage.name()
    }

    /// File a document dated now
    pub async fn file(&self, request: FilingRequest) -> Result<FilingReceipt, FilingError> {
        self.file_at(request, Local::now()).await
    }

    /// File a document as of `now`; the year of `now` selects the counter
    pub async fn file_at(
        &self,
        request: FilingRequest,
        now: DateTime<Local>,
    ) -> Result<FilingReceipt, FilingError> {
        let filing = self.validate(request).await?;
        info!(protocol_type = %filing.protocol_type, bytes = filing.pdf.len(), "Starting filing");
        self.run(filing, now).await
    }

    async fn validate(&self, request: FilingRequest) -> Result<ValidatedFiling, FilingError> {
        let protocol_type = request
            .protocol_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FilingError::validation("protocol type is required"))?
            .parse::<ProtocolType>()
            .map_err(|e| FilingError::validation(e.to_string()))?;

        let pdf = self.decode_pdf(request.pdf_base64.as_deref()).await?;

        let subject = non_empty(request.subject.as_deref());
        let file_name_subject = subject.unwrap_or(FILE_NAME_SUBJECT_FALLBACK).to_string();

        Ok(ValidatedFiling {
            protocol_type,
            subject: subject.unwrap_or(DEFAULT_SUBJECT).to_string(),
            counterparty: non_empty(request.counterparty.as_deref())
                .unwrap_or(DEFAULT_COUNTERPARTY)
                .to_string(),
            original_file_name: non_empty(request.file_name.as_deref())
                .unwrap_or(DEFAULT_ORIGINAL_FILE_NAME)
                .to_string(),
            file_name_subject,
            pdf,
            filed_by: request.filed_by,
        })
    }

    /// Decode and sanity-check an uploaded PDF
    pub(crate) async fn decode_pdf(&self, encoded: Option<&str>) -> Result<Vec<u8>, FilingError> {
        let encoded = non_empty(encoded).ok_or_else(|| FilingError::validation("pdf is required"))?;
        // Browsers send data URLs
        let encoded = match encoded.split_once("base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => encoded,
        };

        let pdf = STANDARD
            .decode(encoded.trim())
            .map_err(|e| FilingError::validation(format!("pdf is not valid base64: {}", e)))?;

        let stamper = Arc::clone(&self.stamper);
        let (pages, pdf) = tokio::task::spawn_blocking(move || (stamper.page_count(&pdf), pdf))
            .await
            .map_err(|e| FilingError::Stamp(StampError::Render(format!("pdf inspection task failed: {}", e))))?;

        match pages {
            Ok(0) => Err(FilingError::validation("pdf has no pages")),
            Ok(_) => Ok(pdf),
            Err(e) => Err(FilingError::validation(format!("not a readable pdf: {}", e))),
        }
    }

    /// Stamp on the blocking pool; lopdf parses and rewrites the whole file
    pub(crate) async fn stamp_pdf(
        &self,
        pdf: &[u8],
        number: &ProtocolNumber,
        date: NaiveDate,
    ) -> Result<Vec<u8>, FilingError> {
        let stamper = Arc::clone(&self.stamper);
        let pdf = pdf.to_vec();
        let number = number.clone();
        let stamped = tokio::task::spawn_blocking(move || stamper.stamp(&pdf, &number, date))
            .await
            .map_err(|e| FilingError::Stamp(StampError::Render(format!("stamping task failed: {}", e))))??;
        Ok(stamped)
    }

    /// Run `step` under the filing deadline. Commit is never covered by it.
    pub(crate) async fn within_deadline<T>(
        &self,
        step: impl std::future::Future<Output = Result<T, FilingError>>,
    ) -> Result<T, FilingError> {
        match tokio::time::timeout(self.timeout, step).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Operation exceeded {:?}; rolling back", self.timeout);
                Err(FilingError::Timeout(self.timeout))
            }
        }
    }

    async fn run(&self, filing: ValidatedFiling, now: DateTime<Local>) -> Result<FilingReceipt, FilingError> {
        let mut progress = Progress::new();
        let mut tx = self.pool.begin().await.map_err(FilingError::Persistence)?;

        let result = self
            .within_deadline(self.execute(&mut tx, &filing, now, &mut progress))
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
            id = receipt.id,
            url = %receipt.storage_url,
            "Protocol filed"
        );
        Ok(receipt)
    }

    async fn execute(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        filing: &ValidatedFiling,
        now: DateTime<Local>,
        progress: &mut Progress,
    ) -> Result<FilingReceipt, FilingError> {
        let year = now.year();
        let number = self.allocator.allocate(tx, year, filing.protocol_type).await?;
        progress.number = Some(number.clone());
        progress.reach(FilingStage::NumberAllocated);

        let stamped = self.stamp_pdf(&filing.pdf, &number, now.date_naive()).await?;
        progress.reach(FilingStage::Stamped);

        let target = UploadTarget {
            year,
            protocol_type: filing.protocol_type,
            file_name: stored_file_name(&number, &self.file_tag, &filing.file_name_subject),
            mime_type: PDF_MIME.to_string(),
        };
        let stored = self
            .storage
            .upload(&target, &stamped)
            .await
            .map_err(FilingError::Upload)?;
        progress.uploaded = Some(stored.clone());
        progress.reach(FilingStage::Uploaded);

        let protocol_date = now.with_timezone(&Utc);
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO protocol_records
                (protocol_number, year, sequence, protocol_type, subject, counterparty, category, protocol_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(number.to_string())
        .bind(year)
        .bind(number.sequence)
        .bind(filing.protocol_type.code())
        .bind(&filing.subject)
        .bind(&filing.counterparty)
        .bind(self.allocator.org_code())
        .bind(protocol_date)
        .fetch_one(&mut **tx)
        .await
        .map_err(FilingError::Persistence)?;

        let size_kb = size_kb(stamped.len());
        let sha256 = sha256_hex(&stamped);
        sqlx::query(
            "INSERT INTO documents
                (protocol_id, original_file_name, stored_file_name, storage_url, size_kb, mime_type, sha256)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(&filing.original_file_name)
        .bind(&target.file_name)
        .bind(&stored.url)
        .bind(size_kb)
        .bind(PDF_MIME)
        .bind(&sha256)
        .execute(&mut **tx)
        .await
        .map_err(FilingError::Persistence)?;

        ActivityEntry::append(
            &mut **tx,
            EventType::ProtocolFiled,
            &format!("Protocol {} filed", number),
            Some(id),
            json!({
                "type": filing.protocol_type,
                "subject": filing.subject,
                "counterparty": filing.counterparty,
                "storage_url": stored.url,
                "user": filing.filed_by,
            }),
        )
        .await
        .map_err(FilingError::Persistence)?;
        progress.reach(FilingStage::Persisted);

        Ok(FilingReceipt {
            id,
            sequence: number.sequence,
            protocol_number: number,
            protocol_date: now.format("%d/%m/%Y").to_string(),
            storage_url: stored.url,
            stored_file_name: target.file_name,
            size_kb,
            sha256,
            pdf: stamped,
        })
    }

    /// Roll back and clean up after a failed step
    pub(crate) async fn abort(&self, tx: Transaction<'_, Postgres>, progress: &Progress, error: &FilingError) {
        if let Err(e) = tx.rollback().await {
            // The connection is discarded; the server rolls back on its own
            warn!(error = %e, "Explicit rollback failed");
        }
        warn!(
            stage = %progress.stage,
            number = ?progress.number.as_ref().map(ToString::to_string),
            error = %error,
            "Rolled back; protocol number not consumed"
        );
        self.discard_orphan(progress, error).await;
    }

    /// Best-effort removal of an upload whose transaction did not commit
    pub(crate) async fn discard_orphan(&self, progress: &Progress, error: &FilingError) {
        let Some(stored) = progress.uploaded.as_ref() else {
            return;
        };

        warn!(
            url = %stored.url,
            backend = self.storage.name(),
            error = %error,
            "Uploaded object orphaned by failed transaction; removing"
        );
        if let Err(e) = self.storage.delete(&stored.url).await {
            warn!(url = %stored.url, error = %e, "Could not remove orphaned upload");
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Make a subject safe for use in a file name
pub fn sanitize_subject(subject: &str) -> String {
    let replaced: String = subject
        .chars()
        .map(|c| if "/\\:*?\"<>|".contains(c) { '_' } else { c })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    let mut in_whitespace = false;
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }

    out.chars().take(MAX_SUBJECT_IN_FILE_NAME).collect()
}

/// `{seq:04}{T}_{FILE_TAG}_{subject}.pdf`
pub fn stored_file_name(number: &ProtocolNumber, file_tag: &str, subject: &str) -> String {
    format!(
        "{}{}_{}_{}.pdf",
        number.padded_sequence(),
        number.protocol_type,
        file_tag,
        sanitize_subject(subject)
    )
}

/// Size in KiB, rounded to nearest
pub fn size_kb(len: usize) -> i32 {
    i32::try_from((len + 512) / 1024).unwrap_or(i32::MAX)
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegistryConfig, StampConfig};
    use crate::database::DatabaseManager;
    use crate::stamp::tests::sample_pdf;
    use crate::stamp::PdfStamper;
    use crate::storage::LocalStorage;

    fn service() -> FilingService {
        let pool = DatabaseManager::connect_lazy(&crate::config::DatabaseConfig {
            url: Some("postgres://localhost/unused".into()),
            max_connections: 1,
            connection_timeout: 1,
            apply_schema_on_start: false,
        })
        .unwrap();
        FilingService::new(
            pool,
            &RegistryConfig::default(),
            Arc::new(LocalStorage::new(std::env::temp_dir())),
            Arc::new(PdfStamper::new(StampConfig::default())),
        )
    }

    fn request(pdf: &[u8]) -> FilingRequest {
        FilingRequest {
            protocol_type: Some("E".into()),
            pdf_base64: Some(STANDARD.encode(pdf)),
            ..Default::default()
        }
    }

    #[test]
    fn stages_advance_in_order() {
        let mut stage = FilingStage::Start;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(
            seen,
            vec![
                FilingStage::Start,
                FilingStage::NumberAllocated,
                FilingStage::Stamped,
                FilingStage::Uploaded,
                FilingStage::Persisted,
                FilingStage::Committed,
            ]
        );
    }

    #[test]
    fn sanitizes_subjects() {
        assert_eq!(sanitize_subject("Richiesta: fondi 2025/26"), "Richiesta__fondi_2025_26");
        assert_eq!(sanitize_subject("a  \t b"), "a_b");
        assert_eq!(sanitize_subject("<x>|\"y\"?*"), "_x___y___");
        assert_eq!(sanitize_subject(&"é".repeat(200)).chars().count(), 150);
    }

    #[test]
    fn builds_stored_file_names() {
        let n = ProtocolNumber::new(2025, 7, "SOR", ProtocolType::Outgoing);
        assert_eq!(
            stored_file_name(&n, "SOR_CAMPANIA", "Convocazione riunione"),
            "0007U_SOR_CAMPANIA_Convocazione_riunione.pdf"
        );
    }

    #[test]
    fn rounds_sizes_to_nearest_kib() {
        assert_eq!(size_kb(0), 0);
        assert_eq!(size_kb(511), 0);
        assert_eq!(size_kb(512), 1);
        assert_eq!(size_kb(2048), 2);
        assert_eq!(size_kb(2600), 3);
    }

    #[test]
    fn hashes_artifacts() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn validation_applies_defaults() {
        let filing = service().validate(request(&sample_pdf(1))).await.unwrap();
        assert_eq!(filing.protocol_type, ProtocolType::Incoming);
        assert_eq!(filing.subject, DEFAULT_SUBJECT);
        assert_eq!(filing.counterparty, DEFAULT_COUNTERPARTY);
        assert_eq!(filing.original_file_name, DEFAULT_ORIGINAL_FILE_NAME);
        assert_eq!(filing.file_name_subject, "documento");
    }

    #[tokio::test]
    async fn validation_rejects_bad_input() {
        let svc = service();
        let pdf = sample_pdf(1);

        let mut missing_type = request(&pdf);
        missing_type.protocol_type = None;
        assert!(matches!(svc.validate(missing_type).await, Err(FilingError::Validation(_))));

        let mut unknown_type = request(&pdf);
        unknown_type.protocol_type = Some("X".into());
        assert!(matches!(svc.validate(unknown_type).await, Err(FilingError::Validation(_))));

        let mut missing_pdf = request(&pdf);
        missing_pdf.pdf_base64 = Some("   ".into());
        assert!(matches!(svc.validate(missing_pdf).await, Err(FilingError::Validation(_))));

        let mut bad_base64 = request(&pdf);
        bad_base64.pdf_base64 = Some("%%%".into());
        assert!(matches!(svc.validate(bad_base64).await, Err(FilingError::Validation(_))));

        assert!(matches!(svc.validate(request(b"plain text")).await, Err(FilingError::Validation(_))));
    }

    #[tokio::test]
    async fn accepts_data_urls() {
        let mut req = request(&[]);
        req.pdf_base64 = Some(format!("data:application/pdf;base64,{}", STANDARD.encode(sample_pdf(1))));
        assert!(service().validate(req).await.is_ok());
    }
}
