//! Storage for customer image uploads
//!
//! Files live under a base directory and are served read-only at
//! `{public_base_url}/media/{key}`. Keys are generated here, never taken
//! from the client.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tagpage_common::{Error, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// MIME types accepted for customer images, with the extension they are stored under
pub const ALLOWED_IMAGE_TYPES: [(&str, &str); 3] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
];

/// An image file received with a registration
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Check an upload's MIME type against the allow-list, returning its file extension
pub fn validate_image_type(content_type: &str) -> Result<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    ALLOWED_IMAGE_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| Error::UnsupportedImageType(content_type.to_string()))
}

/// Check an upload before anything is stored: allowed type and non-empty content
pub fn validate_image(image: &UploadedImage) -> Result<&'static str> {
    let ext = validate_image_type(&image.content_type)?;
    if image.bytes.is_empty() {
        return Err(Error::UploadFailed(format!("{} is empty", image.file_name)));
    }
    Ok(ext)
}

/// Durable storage for uploaded images
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store an image and return its media key
    async fn store(&self, image: &UploadedImage) -> Result<String>;

    /// Public URL of a stored image, if it exists
    fn url(&self, key: &str) -> Option<String>;
}

/// Media storage on the local filesystem
pub struct FileMediaStore {
    base_dir: PathBuf,
    base_url: String,
}

impl FileMediaStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed
    pub fn open(base_dir: &Path, public_base_url: &str) -> Result<Self> {
        std::fs::create_dir_all(base_dir)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            base_url: format!("{}/media", public_base_url.trim_end_matches('/')),
        })
    }

    fn is_valid_key(key: &str) -> bool {
        !key.is_empty()
            && !key.starts_with('/')
            && key
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != "..")
    }
}

#[async_trait]
impl MediaStore for FileMediaStore {
    async fn store(&self, image: &UploadedImage) -> Result<String> {
        let ext = validate_image(image)?;

        let key = format!(
            "uploads/{}/{}.{}",
            Utc::now().format("%Y/%m"),
            Uuid::new_v4(),
            ext
        );
        let path = self.base_dir.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::UploadFailed(e.to_string()))?;
        }
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))?;

        info!(
            "Stored upload {} ({} bytes) as {}",
            image.file_name,
            image.bytes.len(),
            key
        );
        Ok(key)
    }

    fn url(&self, key: &str) -> Option<String> {
        if !Self::is_valid_key(key) || !self.base_dir.join(key).is_file() {
            debug!("No stored media for key {:?}", key);
            return None;
        }
        Some(format!("{}/{}", self.base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(content_type: &str, bytes: &[u8]) -> UploadedImage {
        UploadedImage {
            file_name: "rex.png".to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_validate_image_type() {
        assert_eq!(validate_image_type("image/jpeg").unwrap(), "jpg");
        assert_eq!(validate_image_type("image/PNG").unwrap(), "png");
        assert_eq!(validate_image_type("image/gif; name=a.gif").unwrap(), "gif");
        assert!(matches!(
            validate_image_type("text/html"),
            Err(Error::UnsupportedImageType(_))
        ));
        assert!(validate_image_type("image/svg+xml").is_err());
    }

    #[tokio::test]
    async fn test_store_png_and_resolve_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMediaStore::open(dir.path(), "http://localhost:8080/").unwrap();

        let key = store.store(&image("image/png", b"\x89PNG")).await.unwrap();
        assert!(key.starts_with("uploads/"));
        assert!(key.ends_with(".png"));

        let url = store.url(&key).unwrap();
        assert_eq!(url, format!("http://localhost:8080/media/{}", key));
        assert_eq!(std::fs::read(dir.path().join(&key)).unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_store_rejects_html() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMediaStore::open(dir.path(), "http://localhost:8080").unwrap();

        let result = store.store(&image("text/html", b"<html>")).await;
        assert!(matches!(result, Err(Error::UnsupportedImageType(_))));
    }

    #[tokio::test]
    async fn test_store_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMediaStore::open(dir.path(), "http://localhost:8080").unwrap();

        let result = store.store(&image("image/png", b"")).await;
        assert!(matches!(result, Err(Error::UploadFailed(_))));
    }

    #[test]
    fn test_url_of_unknown_or_hostile_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMediaStore::open(dir.path(), "http://localhost:8080").unwrap();

        assert!(store.url("uploads/missing.png").is_none());
        assert!(store.url("../etc/passwd").is_none());
        assert!(store.url("").is_none());
    }
}
