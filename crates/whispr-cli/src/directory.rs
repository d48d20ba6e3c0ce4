//! Local stand-in for the identity provider's account metadata: one JSON
//! object mapping account id to published public key.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use whispr_core::error::{Result, StorageError};
use whispr_core::identity::IdentityDirectory;

pub const IDENTITY_FILE_NAME: &str = "identity.json";

pub struct FileDirectory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::Corrupt(format!("{}: {e}", self.path.display())).into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StorageError::Io(e).into()),
        }
    }
}

#[async_trait]
impl IdentityDirectory for FileDirectory {
    async fn get_public_key(&self, account_id: &str) -> Result<Option<String>> {
        Ok(self.read_all().await?.remove(account_id))
    }

    async fn set_public_key(&self, account_id: &str, public_pem: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.read_all().await?;
        accounts.insert(account_id.to_string(), public_pem.to_string());
        let data = serde_json::to_vec_pretty(&accounts).map_err(StorageError::from)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::from)?;
        }
        tokio::fs::write(&self.path, data)
            .await
            .map_err(StorageError::from)?;
        debug!(account_id, "identity file updated");
        Ok(())
    }
}
