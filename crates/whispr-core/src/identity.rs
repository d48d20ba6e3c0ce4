//! Account metadata seam.
//!
//! The identity provider owns the "public key" metadata field of each
//! account. The core only reads and writes that field through this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn get_public_key(&self, account_id: &str) -> Result<Option<String>>;

    async fn set_public_key(&self, account_id: &str, public_pem: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    keys: RwLock<HashMap<String, String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn get_public_key(&self, account_id: &str) -> Result<Option<String>> {
        Ok(self.keys.read().get(account_id).cloned())
    }

    async fn set_public_key(&self, account_id: &str, public_pem: &str) -> Result<()> {
        self.keys
            .write()
            .insert(account_id.to_string(), public_pem.to_string());
        Ok(())
    }
}
