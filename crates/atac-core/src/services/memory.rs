//! In-process backends for `"cache"` and `"data"`.
//!
//! Used by tests, demos and single-node deployments that have no external
//! cache or document store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use globset::Glob;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::time::Instant;

use crate::error::{ServiceError, ServiceResult};
use crate::event::Payload;

use super::cache::CacheService;
use super::data::{DataService, Document, QueryFilter};

// ─── MemoryCache ────────────────────────────────────────────────────────────

struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// [`CacheService`] backed by a `HashMap`. Expired entries are dropped lazily
/// on access.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    fn live_value(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get(&self, key: &str) -> ServiceResult<Option<Value>> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> ServiceResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> ServiceResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> ServiceResult<bool> {
        Ok(self.live_value(key).is_some())
    }

    async fn ttl(&self, key: &str) -> ServiceResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn keys(&self, pattern: &str) -> ServiceResult<Vec<String>> {
        let matcher = Glob::new(pattern)
            .map_err(|e| {
                ServiceError::InvalidInput(format!("invalid key pattern '{pattern}': {e}"))
            })?
            .compile_matcher();
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && matcher.is_match(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn increment(&self, key: &str, amount: i64) -> ServiceResult<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if !entry.is_live(now) {
                    *entry = CacheEntry {
                        value: Value::from(0),
                        expires_at: None,
                    };
                }
            })
            .or_insert_with(|| CacheEntry {
                value: Value::from(0),
                expires_at: None,
            });

        let current = entry.value.as_i64().ok_or_else(|| {
            ServiceError::InvalidInput(format!("value at '{key}' is not an integer"))
        })?;
        let next = current
            .checked_add(amount)
            .ok_or_else(|| ServiceError::InvalidInput(format!("increment overflows '{key}'")))?;
        entry.value = Value::from(next);
        Ok(next)
    }
}

// ─── MemoryDataStore ────────────────────────────────────────────────────────

/// [`DataService`] backed by ordered in-memory collections.
///
/// Query results come back in id order.
#[derive(Default)]
pub struct MemoryDataStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    next_id: AtomicU64,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DataService for MemoryDataStore {
    async fn get(&self, collection: &str, id: &str) -> ServiceResult<Option<Value>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> ServiceResult<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Payload) -> ServiceResult<()> {
        let mut collections = self.collections.write();
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| ServiceError::NotFound(format!("{collection}/{id}")))?;

        let Value::Object(fields) = document else {
            return Err(ServiceError::InvalidInput(format!(
                "{collection}/{id} is not an object"
            )));
        };
        fields.extend(patch);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> ServiceResult<()> {
        if let Some(docs) = self.collections.write().get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[QueryFilter],
    ) -> ServiceResult<Vec<Document>> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, data)| filters.iter().all(|filter| filter.matches(data)))
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect())
    }

    async fn add(&self, collection: &str, data: Value) -> ServiceResult<String> {
        let id = format!("{:016x}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.set(collection, &id, data).await?;
        Ok(id)
    }
}
