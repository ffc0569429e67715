//! Keyed cache.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ServiceResult;

/// Key-value cache with optional expiry (`"cache"`).
///
/// Values are JSON so any serialisable type can be cached without the trait
/// being generic.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> ServiceResult<Option<Value>>;

    /// Stores `value`; `ttl = None` never expires.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> ServiceResult<()>;

    async fn delete(&self, key: &str) -> ServiceResult<()>;

    async fn exists(&self, key: &str) -> ServiceResult<bool>;

    /// Remaining lifetime of `key`; `None` for missing or persistent keys.
    async fn ttl(&self, key: &str) -> ServiceResult<Option<Duration>>;

    /// Keys matching a glob pattern (`*`, `?`, `[...]` classes).
    async fn keys(&self, pattern: &str) -> ServiceResult<Vec<String>>;

    /// Adds `amount` to an integer value (missing keys start at 0) and
    /// returns the new value.
    async fn increment(&self, key: &str, amount: i64) -> ServiceResult<i64>;
}
