use async_trait::async_trait;
use aws_sdk_s3 as s3;
use axum::body::Bytes;
use s3::config::{retry::RetryConfig, timeout::TimeoutConfig};
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::config::AppConfig;

/// A blob as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// StoreError
///
/// Any non-success answer or transport failure from the object store. `message` keeps the
/// store's own diagnostic for the logs.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{operation} `{key}` failed: {message}")]
pub struct StoreError {
    pub operation: &'static str,
    pub key: String,
    pub message: String,
}

impl StoreError {
    fn new(operation: &'static str, key: &str, message: impl Into<String>) -> Self {
        Self {
            operation,
            key: key.to_string(),
            message: message.into(),
        }
    }
}

// 1. StorageService Contract
/// StorageService
///
/// The only surface of the object store this application relies on. Every call is a single
/// attempt: uploads are not idempotent enough to retry blindly, and deletes are already
/// tolerated as best-effort by the callers.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket when it is missing. Local MinIO only.
    async fn ensure_bucket_exists(&self);

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StoreError>;

    async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError>;

    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// Backed by the AWS SDK. Path-style addressing is forced so the same client talks to MinIO
/// locally and to a hosted S3-compatible gateway in production.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub fn from_config(config: &AppConfig) -> Self {
        let credentials =
            s3::config::Credentials::new(&config.s3_key, &config.s3_secret, None, None, "static");

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(config.storage_connect_timeout)
            .read_timeout(config.storage_read_timeout)
            .build();

        let sdk_config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(&config.s3_endpoint)
            .region(s3::config::Region::new(config.s3_region.clone()))
            .behavior_version_latest()
            .force_path_style(true)
            .timeout_config(timeouts)
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            client: s3::Client::from_conf(sdk_config),
            bucket_name: config.s3_bucket.clone(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            // Already-exists answers land here too.
            tracing::debug!("create_bucket {}: {}", self.bucket_name, DisplayErrorContext(&e));
        }
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StoreError::new("put", key, DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::new("get", key, DisplayErrorContext(&e).to_string()))?;

        let content_type = output.content_type().map(str::to_owned);
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::new("get", key, e.to_string()))?
            .into_bytes();

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::new("delete", key, DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

/// sanitize_key
///
/// Removes empty, `.` and `..` segments from a key. A key that comes back changed was not a
/// plain relative path.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory object store. Counts every call so tests can assert that pre-flight rejections
/// never reach the network, and can be told to fail all calls, every delete, or one
/// specific upload.
#[derive(Clone, Default)]
pub struct MockStorageService {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    objects: Mutex<HashMap<String, StoredObject>>,
    calls: AtomicUsize,
    puts: AtomicUsize,
    should_fail: bool,
    fail_deletes: bool,
    fail_put_at: Option<usize>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails.
    pub fn new_failing() -> Self {
        Self::with_state(MockState {
            should_fail: true,
            ..MockState::default()
        })
    }

    /// Uploads and downloads work, deletes fail.
    pub fn with_failing_deletes() -> Self {
        Self::with_state(MockState {
            fail_deletes: true,
            ..MockState::default()
        })
    }

    /// The `n`th upload (zero-based, counted across the mock's lifetime) fails.
    pub fn failing_put_at(n: usize) -> Self {
        Self::with_state(MockState {
            fail_put_at: Some(n),
            ..MockState::default()
        })
    }

    fn with_state(state: MockState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Total number of store operations attempted.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn object_count(&self) -> usize {
        self.objects().len()
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredObject>> {
        self.state
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self) {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StoreError> {
        self.record_call();
        let n = self.state.puts.fetch_add(1, Ordering::SeqCst);
        if self.state.should_fail || self.state.fail_put_at == Some(n) {
            return Err(StoreError::new("put", key, "Mock Storage Error: Simulation requested"));
        }
        self.objects().insert(
            key.to_string(),
            StoredObject {
                bytes: body,
                content_type: Some(content_type.to_string()),
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError> {
        self.record_call();
        if self.state.should_fail {
            return Err(StoreError::new("get", key, "Mock Storage Error: Simulation requested"));
        }
        self.objects()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::new("get", key, "404 Not Found"))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.record_call();
        if self.state.should_fail || self.state.fail_deletes {
            return Err(StoreError::new("delete", key, "Mock Storage Error: Simulation requested"));
        }
        self.objects().remove(key);
        Ok(())
    }
}

/// StorageState
///
/// The shared handle to the object store held in the application state.
pub type StorageState = Arc<dyn StorageService>;
