#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use whispr_core::error::{CryptoError, StorageError};
use whispr_core::identity::{IdentityDirectory, MemoryDirectory};
use whispr_core::keys::{KeyManager, KeyOptions, KeyPair};
use whispr_core::keystore::{KeyStore, MemoryKeyStore};
use whispr_core::provider::{CryptoProvider, RsaOaepProvider};

/// RSA generation dominates test time, so every test shares these.
pub fn alice_keys() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| RsaOaepProvider::new(2048).unwrap().generate().unwrap())
}

pub fn bob_keys() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| RsaOaepProvider::new(2048).unwrap().generate().unwrap())
}

pub fn weak_public_key() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
        RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    })
}

/// Real RSA-OAEP, but `generate` hands out a precomputed pair.
pub struct FixedProvider {
    pair: KeyPair,
    inner: RsaOaepProvider,
}

impl FixedProvider {
    pub fn new(pair: &KeyPair) -> Self {
        Self {
            pair: pair.clone(),
            inner: RsaOaepProvider::new(2048).unwrap(),
        }
    }
}

impl CryptoProvider for FixedProvider {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn key_bits(&self) -> usize {
        2048
    }

    fn generate(&self) -> Result<KeyPair, CryptoError> {
        Ok(self.pair.clone())
    }

    fn encrypt(&self, public_pem: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner.encrypt(public_pem, plaintext)
    }

    fn decrypt(&self, private_pem: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner.decrypt(private_pem, ciphertext)
    }

    fn max_plaintext_len(&self, public_pem: &str) -> Result<usize, CryptoError> {
        self.inner.max_plaintext_len(public_pem)
    }
}

/// Memory store that can be told to fail `set` or `delete` for one key.
pub struct FailingStore {
    pub inner: Arc<MemoryKeyStore>,
    fail_set: Mutex<Option<String>>,
    fail_delete: Mutex<Option<String>>,
}

impl FailingStore {
    pub fn new(max_value_len: usize) -> Self {
        Self {
            inner: Arc::new(MemoryKeyStore::new(max_value_len)),
            fail_set: Mutex::new(None),
            fail_delete: Mutex::new(None),
        }
    }

    pub fn fail_set_on(&self, key: &str) {
        *self.fail_set.lock() = Some(key.to_string());
    }

    pub fn fail_delete_on(&self, key: &str) {
        *self.fail_delete.lock() = Some(key.to_string());
    }
}

#[async_trait]
impl KeyStore for FailingStore {
    fn max_value_len(&self) -> usize {
        self.inner.max_value_len()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let refuse = self.fail_set.lock().as_deref() == Some(key);
        if refuse {
            return Err(StorageError::Backend(format!("refusing to write {key}")));
        }
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let refuse = self.fail_delete.lock().as_deref() == Some(key);
        if refuse {
            return Err(StorageError::Backend(format!("refusing to delete {key}")));
        }
        self.inner.delete(key).await
    }
}

pub fn manager_with(
    store: Arc<dyn KeyStore>,
    pair: &KeyPair,
    chunk_threshold: usize,
) -> KeyManager {
    KeyManager::new(
        store,
        Arc::new(FixedProvider::new(pair)),
        Arc::new(MemoryDirectory::new()),
        KeyOptions { chunk_threshold },
    )
    .unwrap()
}

pub fn directory() -> Arc<dyn IdentityDirectory> {
    Arc::new(MemoryDirectory::new())
}
