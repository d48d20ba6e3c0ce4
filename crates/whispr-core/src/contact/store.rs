//! Local contact registry.
//!
//! The whole collection is one serialized document under one registry key.
//! Every mutation is a read-modify-write of that document, so mutations are
//! funnelled through a single writer lock: each one observes the effect of
//! every mutation that acquired the lock before it. Readers skip the lock and
//! see the last completed write.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::model::{
    ContactExport, ContactRecord, LastMessage, RegistryDocument, StoredRegistry, REGISTRY_VERSION,
};
use crate::error::{Result, StorageError};

// ── Backends ────────────────────────────────────────────────────────────────

#[async_trait]
pub trait RegistryBackend: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the document under `key` in one step.
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One JSON file per registry key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    dir: PathBuf,
}

impl FileRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::Backend(format!("invalid registry key {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl RegistryBackend for FileRegistry {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let dir = self.dir.clone();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            std::fs::create_dir_all(&dir)?;
            // write beside the target, then rename over it
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(value.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(format!("registry write task: {e}")))?
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    docs: RwLock<HashMap<String, String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryBackend for MemoryRegistry {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.docs.read().get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.docs.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.docs.write().remove(key);
        Ok(())
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

pub struct ContactStore {
    backend: Arc<dyn RegistryBackend>,
    key: String,
    writer: Mutex<()>,
}

impl ContactStore {
    pub fn new(backend: Arc<dyn RegistryBackend>, registry_key: impl Into<String>) -> Self {
        Self {
            backend,
            key: registry_key.into(),
            writer: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<ContactRecord>> {
        let Some(text) = self.backend.load(&self.key).await? else {
            return Ok(Vec::new());
        };
        let stored: StoredRegistry = serde_json::from_str(&text).map_err(|e| {
            StorageError::Corrupt(format!("registry {}: {e}", self.key))
        })?;
        let contacts = match stored {
            StoredRegistry::Versioned(doc) if doc.version > REGISTRY_VERSION => {
                return Err(StorageError::Corrupt(format!(
                    "registry version {} is newer than supported {REGISTRY_VERSION}",
                    doc.version
                ))
                .into());
            }
            StoredRegistry::Versioned(doc) => doc.contacts,
            StoredRegistry::Legacy(contacts) => {
                debug!("registry in unversioned layout");
                contacts
            }
        };
        Ok(contacts)
    }

    async fn save(&self, contacts: Vec<ContactRecord>) -> Result<()> {
        let doc = RegistryDocument {
            version: REGISTRY_VERSION,
            contacts,
        };
        let text = serde_json::to_string(&doc).map_err(StorageError::from)?;
        self.backend.save(&self.key, &text).await?;
        debug!(count = doc.contacts.len(), "registry saved");
        Ok(())
    }

    /// Serialized read-modify-write. `f` reports whether it changed anything;
    /// unchanged collections are not written back.
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut Vec<ContactRecord>) -> (T, bool) + Send,
    {
        let _writer = self.writer.lock().await;
        let mut contacts = self.load().await?;
        let (value, changed) = f(&mut contacts);
        if changed {
            self.save(contacts).await?;
        }
        Ok(value)
    }

    pub async fn list(&self) -> Result<Vec<ContactRecord>> {
        self.load().await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<ContactRecord>> {
        Ok(self.load().await?.into_iter().find(|c| c.email == email))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<ContactRecord>> {
        let needle = query.to_lowercase();
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|c| {
                c.display_name.to_lowercase().contains(&needle)
                    || c.email.to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub async fn online_count(&self) -> Result<usize> {
        Ok(self.load().await?.iter().filter(|c| c.is_online).count())
    }

    /// Insert, or merge into the record with the same email. Returns the
    /// stored result.
    pub async fn upsert(&self, record: ContactRecord) -> Result<ContactRecord> {
        self.mutate(move |contacts| {
            if let Some(existing) = contacts.iter_mut().find(|c| c.email == record.email) {
                let outcome = existing.merge_from(record);
                if outcome.key_changed {
                    warn!(email = %existing.email, "contact public key changed");
                }
                debug!(email = %existing.email, "contact updated");
                (existing.clone(), true)
            } else {
                info!(email = %record.email, "contact added");
                contacts.push(record.clone());
                (record, true)
            }
        })
        .await
    }

    /// Returns false when no record has `id`.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        self.mutate(|contacts| {
            let before = contacts.len();
            contacts.retain(|c| c.id != id);
            let removed = contacts.len() != before;
            if removed {
                info!(id, "contact removed");
            }
            (removed, removed)
        })
        .await
    }

    /// Returns false for an unknown email. A `last_seen` older than the stored
    /// one is ignored.
    pub async fn update_status(
        &self,
        email: &str,
        is_online: bool,
        last_seen: Option<i64>,
    ) -> Result<bool> {
        self.mutate(|contacts| {
            let Some(contact) = contacts.iter_mut().find(|c| c.email == email) else {
                return (false, false);
            };
            contact.is_online = is_online;
            if let Some(seen) = last_seen {
                match contact.last_seen {
                    Some(current) if current > seen => {
                        debug!(email, "ignoring stale last_seen");
                    }
                    _ => contact.last_seen = Some(seen),
                }
            }
            (true, true)
        })
        .await
    }

    /// Returns false for an unknown email. An older message than the stored
    /// one is ignored.
    pub async fn update_last_message(
        &self,
        email: &str,
        content: &str,
        timestamp: i64,
        is_read: bool,
    ) -> Result<bool> {
        let message = LastMessage {
            content: content.to_string(),
            timestamp,
            is_read,
        };
        self.mutate(move |contacts| {
            let Some(contact) = contacts.iter_mut().find(|c| c.email == email) else {
                return (false, false);
            };
            let replaced = contact.set_last_message(message);
            if !replaced {
                debug!(email, "ignoring stale last message");
            }
            (true, replaced)
        })
        .await
    }

    /// Acknowledge a changed public key.
    pub async fn confirm_key(&self, email: &str) -> Result<bool> {
        self.mutate(|contacts| match contacts.iter_mut().find(|c| c.email == email) {
            Some(contact) if contact.key_change_pending => {
                contact.key_change_pending = false;
                (true, true)
            }
            Some(_) => (true, false),
            None => (false, false),
        })
        .await
    }

    /// Pretty JSON snapshot with every public key redacted.
    pub async fn export(&self) -> Result<String> {
        let export = ContactExport::redacted(&self.load().await?);
        Ok(serde_json::to_string_pretty(&export).map_err(StorageError::from)?)
    }

    pub async fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.backend.remove(&self.key).await?;
        info!("contact registry cleared");
        Ok(())
    }
}
