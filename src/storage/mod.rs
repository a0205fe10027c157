//! Remote storage for stamped protocol artifacts.
//!
//! Uploads are not transactional with the database. The filing workflow uploads
//! before committing and treats an upload failure as a reason to roll back, so
//! backends only need to provide a plain write and a best-effort delete.

pub mod drive;
pub mod local;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageConfig, StorageKind};
use crate::types::ProtocolType;

pub use drive::DriveStorage;
pub use local::LocalStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage not configured: {0}")]
    NotConfigured(&'static str),

    #[error("storage rejected the request: {0}")]
    Rejected(String),

    #[error("unrecognized storage url: {0}")]
    UnknownUrl(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where and what to upload
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub year: i32,
    pub protocol_type: ProtocolType,
    pub file_name: String,
    pub mime_type: String,
}

/// A stored artifact. `url` is what the documents table keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Store `data` under `{year}/{type folder}/{file_name}`
    async fn upload(&self, target: &UploadTarget, data: &[u8]) -> Result<StoredObject, StorageError>;

    /// Remove a previously stored object by the url returned from `upload`
    async fn delete(&self, url: &str) -> Result<(), StorageError>;
}

/// Build the backend selected in configuration
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match config.backend {
        StorageKind::Drive => Ok(Arc::new(DriveStorage::from_config(config)?)),
        StorageKind::Local => Ok(Arc::new(LocalStorage::new(&config.local_root))),
    }
}
