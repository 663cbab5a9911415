//! Keyed record persistence.
//!
//! Backends speak JSON strings through [`StoreBackend`]; services use the
//! typed [`RecordStore`] wrapper, which owns key prefixing, (de)serialization
//! and the per-call timeout. Exactly one backend is selected at startup.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod file;
pub mod locks;
pub mod memory;
pub mod redis_store;

pub use file::FileBackend;
pub use locks::{KeyLockGuard, KeyedLocks};
pub use memory::MemoryBackend;
pub use redis_store::RedisBackend;

/// Key prefixes for each record family.
pub const ORDER_PREFIX: &str = "order-";
pub const REVIEW_PREFIX: &str = "review-";
pub const PAYMENT_PREFIX: &str = "payment-";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("operation timed out")]
    Timeout,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    /// Returns `Ok(None)` only when the key is absent; I/O failures are errors.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Upsert, last writer wins.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Writes only when the key does not exist yet. Returns whether it wrote.
    async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError>;
    /// Keys starting with `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
    fn name(&self) -> &'static str;
}

/// Keys are built from generated identifiers, but lookups also carry
/// caller-supplied ids, so every backend checks them before touching storage.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Typed view over a backend for one record family.
pub struct RecordStore<T> {
    backend: Arc<dyn StoreBackend>,
    prefix: &'static str,
    timeout: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RecordStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            prefix: self.prefix,
            timeout: self.timeout,
            _marker: PhantomData,
        }
    }
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(backend: Arc<dyn StoreBackend>, prefix: &'static str, timeout: Duration) -> Self {
        Self {
            backend,
            prefix,
            timeout,
            _marker: PhantomData,
        }
    }

    pub fn key_for(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    async fn bounded<F, R>(&self, fut: F) -> Result<R, StoreError>
    where
        F: std::future::Future<Output = Result<R, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(backend = self.backend.name(), "store call timed out");
                Err(StoreError::Timeout)
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let key = self.key_for(id);
        match self.bounded(self.backend.get(&key)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, id: &str, value: &T) -> Result<(), StoreError> {
        let key = self.key_for(id);
        let raw = serde_json::to_string(value)?;
        self.bounded(self.backend.set(&key, &raw)).await
    }

    pub async fn insert_if_absent(&self, id: &str, value: &T) -> Result<bool, StoreError> {
        let key = self.key_for(id);
        let raw = serde_json::to_string(value)?;
        self.bounded(self.backend.insert_if_absent(&key, &raw)).await
    }

    /// Record ids (prefix stripped) in this family.
    pub async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.bounded(self.backend.list(self.prefix)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(self.prefix).map(str::to_string))
            .collect())
    }

    /// Loads every record in the family. A record that vanished between
    /// listing and reading is skipped; any failure aborts the whole read.
    pub async fn load_all(&self) -> Result<Vec<T>, StoreError> {
        let ids = self.list_ids().await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
