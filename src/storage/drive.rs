// Google Drive v3 storage backend
//
// Files are organized as `{root folder}/{year}/{Entrata|Uscita|Interno}/`,
// folders are looked up by name and created on first use. The bearer token is
// supplied from configuration; refreshing it is left to the deployment.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::{StorageBackend, StorageError, StoredObject, UploadTarget};
use crate::config::StorageConfig;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

pub struct DriveStorage {
    client: reqwest::Client,
    api_base: String,
    upload_base: String,
    root_folder_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

impl DriveStorage {
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let root_folder_id = config
            .drive_root_folder_id
            .clone()
            .ok_or(StorageError::NotConfigured("DRIVE_FOLDER_ID"))?;
        let access_token = config
            .drive_access_token
            .clone()
            .ok_or(StorageError::NotConfigured("DRIVE_ACCESS_TOKEN"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.drive_api_base.trim_end_matches('/').to_string(),
            upload_base: config.drive_upload_base.trim_end_matches('/').to_string(),
            root_folder_id,
            access_token,
        })
    }

    /// Resolve `{root}/{year}/{type folder}`, creating missing levels
    async fn folder_for(&self, target: &UploadTarget) -> Result<String, StorageError> {
        let year_folder = self
            .find_or_create_folder(&self.root_folder_id, &target.year.to_string())
            .await?;
        self.find_or_create_folder(&year_folder, target.protocol_type.folder_name())
            .await
    }

    async fn find_or_create_folder(&self, parent_id: &str, name: &str) -> Result<String, StorageError> {
        let q = format!(
            "name='{}' and '{}' in parents and mimeType='{}' and trashed=false",
            escape_query_value(name),
            escape_query_value(parent_id),
            FOLDER_MIME
        );

        let response = self
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&self.access_token)
            .query(&[("q", q.as_str()), ("fields", "files(id, name)"), ("spaces", "drive")])
            .send()
            .await?;
        let list: FileList = check(response).await?.json().await?;

        if let Some(existing) = list.files.into_iter().next() {
            return Ok(existing.id);
        }

        let response = self
            .client
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "id")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME,
                "parents": [parent_id],
            }))
            .send()
            .await?;
        let folder: DriveFile = check(response).await?.json().await?;

        info!("Created Drive folder {} ({})", name, folder.id);
        Ok(folder.id)
    }
}

#[async_trait]
impl StorageBackend for DriveStorage {
    fn name(&self) -> &'static str {
        "drive"
    }

    async fn upload(&self, target: &UploadTarget, data: &[u8]) -> Result<StoredObject, StorageError> {
        let folder_id = self.folder_for(target).await?;

        let boundary = format!("registry-{}", Uuid::new_v4().simple());
        let metadata = json!({
            "name": target.file_name,
            "parents": [folder_id],
        });
        let body = multipart_related_body(&boundary, &metadata, &target.mime_type, data);

        let response = self
            .client
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "multipart"), ("fields", "id, name, webViewLink")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;
        let file: DriveFile = check(response).await?.json().await?;

        let url = file
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id));
        debug!(file_id = %file.id, %url, "drive: uploaded {}", target.file_name);

        Ok(StoredObject { id: file.id, url })
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let file_id = file_id_from_url(url).ok_or_else(|| StorageError::UnknownUrl(url.to_string()))?;

        let response = self
            .client
            .delete(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        check(response).await?;

        debug!(%file_id, "drive: deleted");
        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Rejected(format!("{}: {}", status, body.trim())))
}

/// Drive query strings quote values with single quotes
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Extract the file id from a Drive link.
/// Handles `/file/d/{id}/view` style links and `?id={id}` links.
pub(crate) fn file_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let valid = |id: &str| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if let Some(mut segments) = parsed.path_segments() {
        while let Some(segment) = segments.next() {
            if segment == "d" {
                return segments.next().filter(|id| valid(*id)).map(str::to_string);
            }
        }
    }

    parsed
        .query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
        .filter(|id| valid(id.as_str()))
}

fn multipart_related_body(
    boundary: &str,
    metadata: &serde_json::Value,
    mime_type: &str,
    data: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, StorageKind};

    #[test]
    fn extracts_file_ids() {
        assert_eq!(
            file_id_from_url("https://drive.google.com/file/d/1AbC-d_9/view?usp=drivesdk"),
            Some("1AbC-d_9".to_string())
        );
        assert_eq!(
            file_id_from_url("https://drive.google.com/open?id=XyZ123"),
            Some("XyZ123".to_string())
        );
        assert_eq!(file_id_from_url("https://drive.google.com/drive/folders"), None);
        assert_eq!(file_id_from_url("not a url"), None);
    }

    #[test]
    fn escapes_query_quotes() {
        assert_eq!(escape_query_value("Dell'Anno"), "Dell\\'Anno");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
    }

    #[test]
    fn builds_multipart_related_body() {
        let body = multipart_related_body("XYZ", &json!({"name": "a.pdf"}), "application/pdf", b"%PDF");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--XYZ\r\nContent-Type: application/json"));
        assert!(text.contains("{\"name\":\"a.pdf\"}"));
        assert!(text.contains("Content-Type: application/pdf\r\n\r\n%PDF\r\n--XYZ--\r\n"));
    }

    #[test]
    fn requires_folder_and_token() {
        let mut config = AppConfig::from_env().storage;
        config.backend = StorageKind::Drive;
        config.drive_root_folder_id = None;
        config.drive_access_token = Some("token".into());
        assert!(matches!(
            DriveStorage::from_config(&config),
            Err(StorageError::NotConfigured("DRIVE_FOLDER_ID"))
        ));

        config.drive_root_folder_id = Some("root".into());
        config.drive_access_token = None;
        assert!(matches!(
            DriveStorage::from_config(&config),
            Err(StorageError::NotConfigured("DRIVE_ACCESS_TOKEN"))
        ));
    }
}
