#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use protocol_registry::config::{RegistryConfig, StampConfig};
use protocol_registry::database::DatabaseManager;
use protocol_registry::registry::FilingService;
use protocol_registry::stamp::PdfStamper;
use protocol_registry::storage::{StorageBackend, StorageError, StoredObject, UploadTarget};

static SCHEMA_READY: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();
static NEXT_YEAR: OnceLock<AtomicI32> = OnceLock::new();

/// Pool against `DATABASE_URL` with the schema applied, or `None` to skip
pub async fn test_pool() -> Result<Option<PgPool>> {
    let _ = dotenvy::dotenv();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return Ok(None);
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
    SCHEMA_READY
        .get_or_try_init(|| async { DatabaseManager::apply_schema(&pool).await })
        .await?;
    Ok(Some(pool))
}

/// A far-future year no other test in this run uses, wiped of leftovers
pub async fn fresh_year(pool: &PgPool) -> Result<i32> {
    let next = NEXT_YEAR.get_or_init(|| AtomicI32::new(3000 + (Uuid::new_v4().as_u128() % 5000) as i32));
    let year = next.fetch_add(1, Ordering::SeqCst);

    let by_year = "(SELECT id FROM protocol_records WHERE year = $1)";
    sqlx::query(&format!("DELETE FROM activity_log WHERE protocol_id IN {}", by_year))
        .bind(year)
        .execute(pool)
        .await?;
    sqlx::query(&format!("DELETE FROM documents WHERE protocol_id IN {}", by_year))
        .bind(year)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM protocol_records WHERE year = $1")
        .bind(year)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM counters WHERE year = $1")
        .bind(year)
        .execute(pool)
        .await?;
    Ok(year)
}

/// Midday of 15 June in `year`, local time
pub fn day_in(year: i32) -> DateTime<Local> {
    Local.with_ymd_and_hms(year, 6, 15, 12, 0, 0).unwrap()
}

pub fn service(pool: PgPool, storage: Arc<dyn StorageBackend>) -> FilingService {
    service_with(pool, storage, &RegistryConfig::default())
}

pub fn service_with(pool: PgPool, storage: Arc<dyn StorageBackend>, config: &RegistryConfig) -> FilingService {
    FilingService::new(
        pool,
        config,
        storage,
        Arc::new(PdfStamper::new(StampConfig::default())),
    )
}

/// Counter value for (year, type), if the row exists
pub async fn counter_value(pool: &PgPool, year: i32, protocol_type: &str) -> Result<Option<i32>> {
    Ok(
        sqlx::query_scalar("SELECT last_seq FROM counters WHERE year = $1 AND protocol_type = $2")
            .bind(year)
            .bind(protocol_type)
            .fetch_optional(pool)
            .await?,
    )
}

/// Minimal PDF with `pages` A4 pages
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for i in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// In-memory storage that records uploads and deletions
#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, target: &UploadTarget, data: &[u8]) -> Result<StoredObject, StorageError> {
        let id = Uuid::new_v4().simple().to_string();
        let url = format!(
            "memory://{}/{}/{}/{}",
            target.year,
            target.protocol_type.folder_name(),
            id,
            target.file_name
        );
        self.objects.lock().unwrap().insert(url.clone(), data.to_vec());
        Ok(StoredObject { id, url })
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(url);
        self.deleted.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Rejects every upload
pub struct FailingStorage;

#[async_trait]
impl StorageBackend for FailingStorage {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn upload(&self, _target: &UploadTarget, _data: &[u8]) -> Result<StoredObject, StorageError> {
        Err(StorageError::Rejected("503 backend unavailable".to_string()))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        Err(StorageError::UnknownUrl(url.to_string()))
    }
}

/// Accepts uploads but hands back an empty url, which the documents table refuses
#[derive(Default)]
pub struct EmptyUrlStorage {
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl StorageBackend for EmptyUrlStorage {
    fn name(&self) -> &'static str {
        "empty-url"
    }

    async fn upload(&self, _target: &UploadTarget, _data: &[u8]) -> Result<StoredObject, StorageError> {
        Ok(StoredObject {
            id: "orphan".to_string(),
            url: String::new(),
        })
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        self.deleted.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
