use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::{StorageBackend, StorageError, StoredObject, UploadTarget};

/// Filesystem storage backend.
///
/// Layout: `{root}/{year}/{Entrata|Uscita|Interno}/{object-id}/{file_name}`.
/// Each upload gets its own object directory so re-uploading the same file
/// name (document replacement) keeps the previous artifact.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn canonical_root(&self) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.root).await?;
        Ok(fs::canonicalize(&self.root).await?)
    }
}

fn validate_file_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(StorageError::Rejected(format!("invalid file name '{}'", name)));
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, target: &UploadTarget, data: &[u8]) -> Result<StoredObject, StorageError> {
        validate_file_name(&target.file_name)?;

        let root = self.canonical_root().await?;
        let id = Uuid::new_v4().simple().to_string();
        let dir = root
            .join(target.year.to_string())
            .join(target.protocol_type.folder_name())
            .join(&id);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(&target.file_name);
        fs::write(&path, data).await?;
        debug!(path = %path.display(), size = data.len(), "local storage: write");

        let url = Url::from_file_path(&path)
            .map_err(|_| StorageError::Rejected(format!("cannot build url for {}", path.display())))?;

        Ok(StoredObject { id, url: url.to_string() })
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let path = Url::parse(url)
            .ok()
            .filter(|u| u.scheme() == "file")
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| StorageError::UnknownUrl(url.to_string()))?;

        let root = self.canonical_root().await?;
        if !path.starts_with(&root) {
            return Err(StorageError::UnknownUrl(url.to_string()));
        }

        fs::remove_file(&path).await?;
        if let Some(object_dir) = path.parent().filter(|p| *p != root.as_path()) {
            // Best-effort: only succeeds when empty
            let _ = fs::remove_dir(object_dir).await;
        }
        debug!(path = %path.display(), "local storage: delete");
        Ok(())
    }
}
