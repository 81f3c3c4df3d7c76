//! Media pipeline: validation, key construction, upload, batch upload with per-item failure
//! isolation, best-effort deletion and the temp-then-attach flow.
//!
//! An upload attempt moves through `Received -> Validated -> Stored -> Recorded`, or ends in
//! `Rejected` (local validation) or `StoreFailed` (object store). `Recorded` is reached by the
//! caller once the place image row is written; everything before it happens here.

use std::{ffi::OsStr, path::Path};

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    storage::{StorageState, sanitize_key},
};

/// MediaLimits
///
/// Upload ceilings and accepted types. Loaded once from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaLimits {
    pub max_file_bytes: usize,
    /// Lower-cased MIME types, compared without parameters.
    pub allowed_content_types: Vec<String>,
    /// Lower-cased filename extensions accepted when a filename carries one.
    pub allowed_extensions: Vec<String>,
    /// Extension used in the storage key when the filename has none.
    pub fallback_extension: String,
    /// Files per upload request.
    pub max_batch_size: usize,
    /// Images per place.
    pub max_per_resource: usize,
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
            ],
            allowed_extensions: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
            ],
            fallback_extension: "jpg".to_string(),
            max_batch_size: 10,
            max_per_resource: 10,
        }
    }
}

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Blob {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Blob {
    pub fn new(filename: &str, content_type: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: Some(filename.to_string()),
            content_type: Some(content_type.to_string()),
            bytes: bytes.into(),
        }
    }
}

/// Top-level key prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// `places/<place_id>/…`
    Places,
    /// `temp/<uploader_id>/…`, for images uploaded before their place exists.
    Temp,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Places => "places",
            Namespace::Temp => "temp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Received,
    Validated,
    Stored,
    Recorded,
    Rejected,
    StoreFailed,
}

/// MediaObject
///
/// A blob that made it into the store. `resource_id` is absent for temp uploads.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaObject {
    pub key: String,
    pub url: String,
    pub resource_id: Option<Uuid>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MediaError {
    #[error("file is empty")]
    EmptyFile,
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("file is too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("upload failed: {0}")]
    StoreFailed(String),
    #[error("not a temporary upload of the caller: {0}")]
    ForeignTemp(String),
}

impl MediaError {
    pub fn reason(&self) -> FailureReason {
        match self {
            MediaError::EmptyFile => FailureReason::EmptyFile,
            MediaError::UnsupportedType(_) => FailureReason::UnsupportedType,
            MediaError::ForeignTemp(_) => FailureReason::ForeignTemp,
            MediaError::TooLarge { .. } => FailureReason::TooLarge,
            MediaError::StoreFailed(_) => FailureReason::StoreFailed,
        }
    }

    pub fn stage(&self) -> UploadStage {
        match self {
            MediaError::StoreFailed(_) => UploadStage::StoreFailed,
            _ => UploadStage::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum FailureReason {
    EmptyFile,
    UnsupportedType,
    TooLarge,
    StoreFailed,
    RecordFailed,
    ForeignTemp,
}

/// One rejected file of a batch, by its zero-based position in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ItemFailure {
    pub index: usize,
    pub filename: Option<String>,
    pub reason: FailureReason,
    pub message: String,
}

impl ItemFailure {
    pub fn new(index: usize, filename: Option<String>, error: &MediaError) -> Self {
        Self {
            index,
            filename,
            reason: error.reason(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedItem {
    pub index: usize,
    pub filename: Option<String>,
    pub object: MediaObject,
}

/// BatchOutcome
///
/// Both lists are in request order. `total` is the number of files submitted.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub succeeded: Vec<UploadedItem>,
    pub failed: Vec<ItemFailure>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The URL is not one of ours; nothing was sent to the store.
    Skipped,
    /// The store refused; logged and swallowed.
    Failed,
}

/// MediaPipeline
///
/// Stateless apart from its configuration, so one instance serves all requests.
#[derive(Clone)]
pub struct MediaPipeline {
    store: StorageState,
    limits: MediaLimits,
    public_base: String,
}

impl MediaPipeline {
    pub fn new(store: StorageState, limits: MediaLimits, public_base: impl Into<String>) -> Self {
        let public_base: String = public_base.into();
        Self {
            store,
            limits,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(store: StorageState, config: &AppConfig) -> Self {
        Self::new(store, config.media.clone(), config.storage_public_url.clone())
    }

    pub fn limits(&self) -> &MediaLimits {
        &self.limits
    }

    /// validate
    ///
    /// Purely local checks, in order: empty, declared type (and extension), size.
    pub fn validate(&self, blob: &Blob) -> Result<(), MediaError> {
        if blob.bytes.is_empty() {
            return Err(MediaError::EmptyFile);
        }

        let content_type = normalized_content_type(blob.content_type.as_deref());
        if !self.limits.allowed_content_types.contains(&content_type) {
            let shown = if content_type.is_empty() { "none".to_string() } else { content_type };
            return Err(MediaError::UnsupportedType(shown));
        }

        if let Some(ext) = raw_extension(blob.filename.as_deref()) {
            if !self.limits.allowed_extensions.contains(&ext) {
                return Err(MediaError::UnsupportedType(format!(".{}", ext)));
            }
        }

        if blob.bytes.len() > self.limits.max_file_bytes {
            return Err(MediaError::TooLarge {
                size: blob.bytes.len(),
                limit: self.limits.max_file_bytes,
            });
        }

        Ok(())
    }

    /// build_key
    ///
    /// `<namespace>/<owner_id>/<random>.<ext>`. The random part is a fresh v4 UUID, so keys
    /// for the same owner never collide, whatever the concurrency.
    pub fn build_key(&self, namespace: Namespace, owner_id: Uuid, filename: Option<&str>) -> String {
        let extension = raw_extension(filename)
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| self.limits.fallback_extension.clone());

        format!(
            "{}/{}/{}.{}",
            namespace.as_str(),
            owner_id,
            Uuid::new_v4().simple(),
            extension
        )
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Recovers the storage key from a public URL, or `None` when the URL was not produced
    /// by `public_url` for this store.
    pub fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let key = url.strip_prefix(self.public_base.as_str())?.strip_prefix('/')?;
        if key.is_empty() || sanitize_key(key) != key {
            return None;
        }
        Some(key)
    }

    /// upload
    ///
    /// A single store call. Any failure becomes `StoreFailed` carrying the store's message.
    pub async fn upload(&self, blob: &Blob, key: &str) -> Result<String, MediaError> {
        let content_type = normalized_content_type(blob.content_type.as_deref());
        self.store
            .put_object(key, blob.bytes.clone(), &content_type)
            .await
            .map_err(|e| {
                tracing::error!("Upload FAILED for {}: {}", key, e);
                MediaError::StoreFailed(e.to_string())
            })?;
        Ok(self.public_url(key))
    }

    /// delete
    ///
    /// Best-effort and idempotent. Never returns an error: a foreign URL is skipped and a
    /// store failure is logged, so callers can always go on to delete their own records.
    pub async fn delete(&self, url: &str) -> DeleteOutcome {
        let Some(key) = self.key_from_url(url) else {
            tracing::warn!("Could not extract key from URL: {}", url);
            return DeleteOutcome::Skipped;
        };

        match self.store.delete_object(key).await {
            Ok(()) => {
                tracing::info!("Deleted image: {}", key);
                DeleteOutcome::Deleted
            }
            Err(e) => {
                tracing::warn!("Failed to delete image {}: {}", key, e);
                DeleteOutcome::Failed
            }
        }
    }

    /// Validate, key and store one blob.
    pub async fn upload_one(
        &self,
        blob: &Blob,
        namespace: Namespace,
        owner_id: Uuid,
    ) -> Result<MediaObject, MediaError> {
        tracing::debug!(stage = ?UploadStage::Received, filename = ?blob.filename, size = blob.bytes.len());

        if let Err(e) = self.validate(blob) {
            tracing::info!(stage = ?e.stage(), filename = ?blob.filename, "upload rejected: {}", e);
            return Err(e);
        }
        tracing::debug!(stage = ?UploadStage::Validated, filename = ?blob.filename);

        let key = self.build_key(namespace, owner_id, blob.filename.as_deref());
        let url = self.upload(blob, &key).await?;
        tracing::info!(stage = ?UploadStage::Stored, key = %key, "Upload SUCCESS");

        Ok(MediaObject {
            key,
            url,
            resource_id: match namespace {
                Namespace::Places => Some(owner_id),
                Namespace::Temp => None,
            },
            uploaded_at: Utc::now(),
        })
    }

    /// check_quota
    ///
    /// The pre-flight checks shared by single and batch uploads. Reads `existing` without
    /// any lock: two concurrent requests can both pass and jointly overshoot the ceiling.
    pub fn check_quota(&self, incoming: usize, existing: usize) -> Result<(), AppError> {
        if incoming == 0 {
            return Err(AppError::Validation("no files provided".into()));
        }
        if incoming > self.limits.max_batch_size {
            return Err(AppError::Validation(format!(
                "too many files in one request: {} (max {})",
                incoming, self.limits.max_batch_size
            )));
        }
        if existing + incoming > self.limits.max_per_resource {
            return Err(AppError::Validation(format!(
                "image limit reached: {} existing + {} new exceeds {}",
                existing, incoming, self.limits.max_per_resource
            )));
        }
        Ok(())
    }

    /// upload_batch
    ///
    /// Pre-flight checks run once, before any store call. Items are then processed one by
    /// one; a failing item is recorded in `failed` and the rest carry on. The call only
    /// fails as a whole when nothing succeeded.
    pub async fn upload_batch(
        &self,
        blobs: Vec<Blob>,
        owner_id: Uuid,
        existing_count: usize,
    ) -> Result<BatchOutcome, AppError> {
        self.check_quota(blobs.len(), existing_count)?;

        let total = blobs.len();
        let mut succeeded = Vec::with_capacity(total);
        let mut failed = Vec::new();

        for (index, blob) in blobs.into_iter().enumerate() {
            match self.upload_one(&blob, Namespace::Places, owner_id).await {
                Ok(object) => succeeded.push(UploadedItem {
                    index,
                    filename: blob.filename,
                    object,
                }),
                Err(e) => failed.push(ItemFailure::new(index, blob.filename, &e)),
            }
        }

        tracing::info!(
            "Batch upload for {}: {} of {} stored",
            owner_id,
            succeeded.len(),
            total
        );

        if succeeded.is_empty() {
            return Err(AppError::UploadFailed { failed });
        }
        Ok(BatchOutcome {
            succeeded,
            failed,
            total,
        })
    }

    pub async fn upload_temp_image(
        &self,
        blob: &Blob,
        uploader_id: Uuid,
    ) -> Result<MediaObject, MediaError> {
        self.upload_one(blob, Namespace::Temp, uploader_id).await
    }

    /// move_temp_to_place
    ///
    /// Download, re-upload under the place, then delete the temp original. There is no
    /// atomicity: when the final delete fails the temp object is left behind and the new
    /// object is kept.
    pub async fn move_temp_to_place(
        &self,
        temp_url: &str,
        uploader_id: Uuid,
        place_id: Uuid,
    ) -> Result<MediaObject, MediaError> {
        let own_prefix = format!("{}/{}/", Namespace::Temp.as_str(), uploader_id);
        let temp_key = self
            .key_from_url(temp_url)
            .filter(|key| key.starts_with(&own_prefix))
            .ok_or_else(|| MediaError::ForeignTemp(temp_url.to_string()))?;

        let original = self
            .store
            .get_object(temp_key)
            .await
            .map_err(|e| MediaError::StoreFailed(e.to_string()))?;

        let filename = temp_key.rsplit('/').next();
        let blob = Blob {
            filename: filename.map(str::to_owned),
            content_type: original
                .content_type
                .or_else(|| Some("image/jpeg".to_string())),
            bytes: original.bytes,
        };

        let key = self.build_key(Namespace::Places, place_id, filename);
        let url = self.upload(&blob, &key).await?;

        if let Err(e) = self.store.delete_object(temp_key).await {
            tracing::warn!("Temp object {} left orphaned after move: {}", temp_key, e);
        }

        tracing::info!("Moved {} to {}", temp_key, key);
        Ok(MediaObject {
            key,
            url,
            resource_id: Some(place_id),
            uploaded_at: Utc::now(),
        })
    }
}

/// `image/PNG; charset=binary` -> `image/png`
fn normalized_content_type(declared: Option<&str>) -> String {
    declared
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn raw_extension(filename: Option<&str>) -> Option<String> {
    filename
        .map(Path::new)
        .and_then(Path::extension)
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .filter(|ext| !ext.is_empty())
}
