//! Secret key/value storage with a per-entry size ceiling.
//!
//! Backends never truncate: a value longer than [`KeyStore::max_value_len`]
//! is refused with [`StorageError::ValueTooLarge`]. Callers that need to
//! persist larger values split them first (see `keys::KeyManager`).
//!
//! This layer does no locking; sequencing is the caller's job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keyring::Entry;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::KeyStoreConfig;
use crate::error::StorageError;

#[async_trait]
pub trait KeyStore: Send + Sync {
    fn max_value_len(&self) -> usize;

    /// Persist `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Succeeds whether or not `key` exists.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

fn check_len(key: &str, value: &str, max: usize) -> Result<(), StorageError> {
    if value.len() > max {
        return Err(StorageError::ValueTooLarge {
            key: key.to_string(),
            len: value.len(),
            max,
        });
    }
    Ok(())
}

// ── In-memory ───────────────────────────────────────────────────────────────

/// Process-local store. Contents vanish with the process.
#[derive(Debug)]
pub struct MemoryKeyStore {
    max_value_len: usize,
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyStore {
    pub fn new(max_value_len: usize) -> Self {
        Self {
            max_value_len,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new(KeyStoreConfig::default().max_value_len)
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    fn max_value_len(&self) -> usize {
        self.max_value_len
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_len(key, value, self.max_value_len)?;
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

// ── OS keyring ──────────────────────────────────────────────────────────────

/// Platform credential store (Keychain, Credential Manager, Secret Service).
///
/// Every key becomes one credential entry under the configured service name.
/// Keyring calls block, so they run on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringKeyStore {
    service: String,
    max_value_len: usize,
}

impl KeyringKeyStore {
    pub fn new(service: impl Into<String>, max_value_len: usize) -> Self {
        Self {
            service: service.into(),
            max_value_len,
        }
    }

    pub fn from_config(config: &KeyStoreConfig) -> Self {
        Self::new(config.service_name.clone(), config.max_value_len)
    }

    async fn with_entry<T, F>(&self, key: &str, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service.clone();
        let user = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &user)
                .map_err(|e| StorageError::Backend(format!("keyring init: {e}")))?;
            f(entry).map_err(|e| StorageError::Backend(format!("keyring {user}: {e}")))
        })
        .await
        .map_err(|e| StorageError::Backend(format!("keyring task: {e}")))?
    }
}

#[async_trait]
impl KeyStore for KeyringKeyStore {
    fn max_value_len(&self) -> usize {
        self.max_value_len
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_len(key, value, self.max_value_len)?;
        let value = value.to_string();
        self.with_entry(key, move |entry| entry.set_password(&value))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_entry(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.with_entry(key, |entry| match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}

// ── Timeout wrapper ─────────────────────────────────────────────────────────

/// Bounds every call on the inner store. An expired call yields
/// [`StorageError::TimedOut`], which surfaces as `WhisprError::Timeout`.
pub struct TimedKeyStore {
    inner: Arc<dyn KeyStore>,
    timeout: Duration,
}

impl TimedKeyStore {
    pub fn new(inner: Arc<dyn KeyStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        key: &str,
        fut: impl std::future::Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!(operation, key, "key store call timed out");
                Err(StorageError::TimedOut {
                    operation,
                    key: key.to_string(),
                    after: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl KeyStore for TimedKeyStore {
    fn max_value_len(&self) -> usize {
        self.inner.max_value_len()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.bounded("set", key, self.inner.set(key, value)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.bounded("get", key, self.inner.get(key)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.bounded("delete", key, self.inner.delete(key)).await
    }
}
