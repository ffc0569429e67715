//! Blob storage.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;

/// Listing entry for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub path: String,
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    pub updated_at: SystemTime,
}

/// A time-limited download URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: SystemTime,
}

/// Blob store (`"storage"`).
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> ServiceResult<StoredObject>;

    async fn download(&self, path: &str) -> ServiceResult<Vec<u8>>;

    async fn delete(&self, path: &str) -> ServiceResult<()>;

    async fn list(&self, prefix: &str) -> ServiceResult<Vec<StoredObject>>;

    async fn signed_url(&self, path: &str, expires_in: Duration) -> ServiceResult<SignedUrl>;
}
