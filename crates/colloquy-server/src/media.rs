//! Image attachment storage.
//!
//! Messages only persist a reference string (`/media/<uuid>.<ext>`); the
//! bytes live on disk under the configured media directory.  File names
//! are store-assigned UUIDs plus an allowlisted extension, so no client
//! input ever reaches the filesystem path.

use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// URL prefix under which stored images are served.
pub const MEDIA_URL_PREFIX: &str = "/media/";

const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

#[derive(Debug, Clone)]
pub struct MediaStore {
    base_path: PathBuf,
    max_size: usize,
}

impl MediaStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ApiError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ApiError::Upstream(format!(
                "Failed to create media directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Media store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Persist an uploaded image and return its reference URL.
    pub async fn store_image(&self, data: &[u8], content_type: &str) -> Result<String, ApiError> {
        let ext = extension_for(content_type).ok_or_else(|| {
            ApiError::BadRequest(
                "Only image files are allowed (JPEG, PNG, GIF, WEBP)".to_string(),
            )
        })?;

        if data.is_empty() {
            return Err(ApiError::BadRequest("Empty image upload".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ApiError::BadRequest(format!(
                "Image too large: {} bytes (max {})",
                data.len(),
                self.max_size
            )));
        }

        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        let path = self.base_path.join(&file_name);

        fs::write(&path, data).await.map_err(|e| {
            ApiError::Upstream(format!("Failed to write image {}: {}", file_name, e))
        })?;

        debug!(file = %file_name, size = data.len(), "Stored image");
        Ok(format!("{MEDIA_URL_PREFIX}{file_name}"))
    }

    /// Read a stored image back for serving.  Returns the bytes and the
    /// content type.
    pub async fn load(&self, file_name: &str) -> Result<(Vec<u8>, &'static str), ApiError> {
        let (uuid_part, ext) = parse_file_name(file_name)
            .ok_or_else(|| ApiError::BadRequest("Invalid media file name".to_string()))?;

        let content_type = ALLOWED_TYPES
            .iter()
            .find(|(_, e)| *e == ext)
            .map(|(ct, _)| *ct)
            .ok_or_else(|| ApiError::BadRequest("Invalid media file name".to_string()))?;

        let path = self.base_path.join(format!("{uuid_part}.{ext}"));
        if !path.exists() {
            return Err(ApiError::NotFound("Media file"));
        }

        let data = fs::read(&path)
            .await
            .map_err(|e| ApiError::Upstream(format!("Failed to read image: {e}")))?;
        Ok((data, content_type))
    }

    /// Best-effort removal of the file behind a reference URL.  Failure
    /// is logged, never surfaced: the caller's delete must not fail on
    /// attachment cleanup.
    pub async fn delete_by_url(&self, url: &str) {
        let Some(file_name) = url.strip_prefix(MEDIA_URL_PREFIX) else {
            warn!(url, "Unrecognized media reference, skipping cleanup");
            return;
        };
        let Some((uuid_part, ext)) = parse_file_name(file_name) else {
            warn!(url, "Malformed media reference, skipping cleanup");
            return;
        };

        let path = self.base_path.join(format!("{uuid_part}.{ext}"));
        match fs::remove_file(&path).await {
            Ok(()) => debug!(file = %file_name, "Deleted image"),
            Err(e) => warn!(file = %file_name, error = %e, "Image cleanup failed"),
        }
    }

}

fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
}

/// Split `<uuid>.<ext>` and validate the uuid half.  Rejects anything
/// that is not exactly a stored file name, which also rules out path
/// traversal.
fn parse_file_name(file_name: &str) -> Option<(Uuid, &str)> {
    let (stem, ext) = file_name.split_once('.')?;
    let uuid = Uuid::parse_str(stem).ok()?;
    if ext.contains(['/', '\\', '.']) {
        return None;
    }
    Some((uuid, ext))
}
