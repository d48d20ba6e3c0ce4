//! Identity key lifecycle.
//!
//! The private key lives in a [`KeyStore`] whose entries are size-limited.
//! Keys longer than the chunk threshold are split across several slots:
//!
//! ```text
//! privateKey            whole PEM (short keys)
//! privateKey_0 .. _n-1  contiguous slices of the PEM (long keys)
//! privateKey_chunks     {"version":1,"chunks":n}
//! ```
//!
//! The count record acts as the commit marker. It is written after every
//! chunk and removed after every chunk, so a reader either sees a complete
//! key, a stale complete key, nothing, or a [`WhisprError::MissingChunk`].
//! It never sees a silently truncated key.
//!
//! The public half is distributed through the [`IdentityDirectory`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::CoreConfig;
use crate::error::{CryptoError, Result, StorageError, WhisprError};
use crate::identity::IdentityDirectory;
use crate::keystore::KeyStore;
use crate::provider::{self, CryptoProvider, MIN_RSA_BITS};

pub const PRIVATE_KEY_SLOT: &str = "privateKey";
pub const CHUNK_COUNT_SLOT: &str = "privateKey_chunks";
pub const CHUNK_LAYOUT_VERSION: u32 = 1;

pub fn chunk_slot(index: usize) -> String {
    format!("{PRIVATE_KEY_SLOT}_{index}")
}

// ── Types ───────────────────────────────────────────────────────────────────

/// PEM-encoded RSA key pair. The private half is wiped on drop.
#[derive(Clone)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: Zeroizing<String>,
}

impl KeyPair {
    pub fn new(public_key: String, private_key: Zeroizing<String>) -> Self {
        Self {
            public_key,
            private_key,
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub key_size_bits: usize,
    /// Hex, lowercase.
    pub modulus: String,
    /// Decimal.
    pub exponent: String,
    pub algorithm: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ChunkCount {
    version: u32,
    chunks: usize,
}

/// Parse the count record. Bare integers are the unversioned layout.
fn parse_chunk_count(raw: &str) -> std::result::Result<usize, StorageError> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<usize>() {
        return Ok(n);
    }
    let record: ChunkCount = serde_json::from_str(raw)
        .map_err(|e| StorageError::Corrupt(format!("chunk count record: {e}")))?;
    if record.version > CHUNK_LAYOUT_VERSION {
        return Err(StorageError::Corrupt(format!(
            "chunk layout version {} is newer than supported {CHUNK_LAYOUT_VERSION}",
            record.version
        )));
    }
    Ok(record.chunks)
}

fn encode_chunk_count(chunks: usize) -> std::result::Result<String, StorageError> {
    Ok(serde_json::to_string(&ChunkCount {
        version: CHUNK_LAYOUT_VERSION,
        chunks,
    })?)
}

/// Split into contiguous pieces of at most `size` bytes, on char boundaries.
pub fn split_chunks(value: &str, size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = value;
    while !rest.is_empty() {
        let mut end = size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // a single char wider than `size`; take it whole
            end = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

// ── Manager ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyOptions {
    pub chunk_threshold: usize,
}

impl KeyOptions {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            chunk_threshold: config.keystore.chunk_threshold,
        }
    }
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self::from_config(&CoreConfig::default())
    }
}

pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    provider: Arc<dyn CryptoProvider>,
    directory: Arc<dyn IdentityDirectory>,
    chunk_threshold: usize,
    write_lock: Mutex<()>,
}

impl KeyManager {
    pub fn new(
        store: Arc<dyn KeyStore>,
        provider: Arc<dyn CryptoProvider>,
        directory: Arc<dyn IdentityDirectory>,
        options: KeyOptions,
    ) -> Result<Self> {
        let max = store.max_value_len();
        if options.chunk_threshold == 0 || options.chunk_threshold >= max {
            return Err(WhisprError::Config(format!(
                "chunk threshold {} must be below the key store limit {max}",
                options.chunk_threshold
            )));
        }
        if provider.key_bits() < MIN_RSA_BITS {
            return Err(CryptoError::UnsupportedKeySize {
                bits: provider.key_bits(),
                minimum: MIN_RSA_BITS,
            }
            .into());
        }
        Ok(Self {
            store,
            provider,
            directory,
            chunk_threshold: options.chunk_threshold,
            write_lock: Mutex::new(()),
        })
    }

    /// Generate a fresh pair and persist the private half, replacing any
    /// previously stored key.
    pub async fn generate_key_pair(&self) -> Result<KeyPair> {
        let provider = self.provider.clone();
        info!(provider = provider.name(), bits = provider.key_bits(), "generating key pair");
        let pair = tokio::task::spawn_blocking(move || provider.generate())
            .await
            .map_err(|e| CryptoError::KeyGeneration(format!("key generation task: {e}")))??;
        debug!(
            private_len = pair.private_key.len(),
            public_len = pair.public_key.len(),
            "key pair generated"
        );

        let _guard = self.write_lock.lock().await;
        if let Err(source) = self.store_private_key(&pair.private_key).await {
            warn!(error = %source, "persisting private key failed");
            return Err(WhisprError::Unpersisted {
                key_pair: Box::new(pair),
                source,
            });
        }
        info!("key pair stored");
        Ok(pair)
    }

    async fn store_private_key(&self, pem: &str) -> std::result::Result<(), StorageError> {
        let previous = self.read_chunk_count_or_sweep().await?;
        if pem.len() > self.chunk_threshold {
            let chunks = split_chunks(pem, self.chunk_threshold);
            debug!(chunks = chunks.len(), "storing private key in chunks");
            // uncommit the old layout before its slots get overwritten
            if previous.is_some() {
                self.store.delete(CHUNK_COUNT_SLOT).await?;
            }
            let old = previous.unwrap_or(0);
            for (i, chunk) in chunks.iter().enumerate() {
                if let Err(e) = self.store.set(&chunk_slot(i), chunk).await {
                    self.rollback_chunks(i.max(old)).await;
                    return Err(e);
                }
            }
            if let Err(e) = self
                .store
                .set(CHUNK_COUNT_SLOT, &encode_chunk_count(chunks.len())?)
                .await
            {
                self.rollback_chunks(chunks.len().max(old)).await;
                return Err(e);
            }
            self.store.delete(PRIVATE_KEY_SLOT).await?;
            for i in chunks.len()..old {
                self.store.delete(&chunk_slot(i)).await?;
            }
        } else {
            debug!("storing private key in a single slot");
            self.store.set(PRIVATE_KEY_SLOT, pem).await?;
            self.delete_chunk_layout(previous.unwrap_or(0)).await?;
        }
        Ok(())
    }

    /// Best effort; the original error is what gets reported.
    async fn rollback_chunks(&self, upto: usize) {
        for i in 0..upto {
            if let Err(e) = self.store.delete(&chunk_slot(i)).await {
                warn!(index = i, error = %e, "could not roll back chunk");
            }
        }
    }

    async fn read_chunk_count(&self) -> std::result::Result<Option<usize>, StorageError> {
        match self.store.get(CHUNK_COUNT_SLOT).await? {
            Some(raw) => Ok(Some(parse_chunk_count(&raw)?)),
            None => Ok(None),
        }
    }

    /// A count record that cannot be parsed is treated as no layout at all,
    /// after every chunk slot it might have described is removed.
    async fn read_chunk_count_or_sweep(
        &self,
    ) -> std::result::Result<Option<usize>, StorageError> {
        match self.read_chunk_count().await {
            Err(StorageError::Corrupt(detail)) => {
                warn!(%detail, "unreadable chunk count, sweeping chunk slots");
                self.delete_chunk_layout(0).await?;
                Ok(None)
            }
            other => other,
        }
    }

    /// Data chunks first, count record last, then any orphans past the count.
    async fn delete_chunk_layout(&self, count: usize) -> std::result::Result<(), StorageError> {
        for i in 0..count {
            self.store.delete(&chunk_slot(i)).await?;
        }
        self.store.delete(CHUNK_COUNT_SLOT).await?;
        let mut i = count;
        while self.store.get(&chunk_slot(i)).await?.is_some() {
            debug!(index = i, "removing orphaned chunk");
            self.store.delete(&chunk_slot(i)).await?;
            i += 1;
        }
        Ok(())
    }

    pub async fn get_private_key(&self) -> Result<Option<Zeroizing<String>>> {
        if let Some(pem) = self.store.get(PRIVATE_KEY_SLOT).await? {
            debug!("private key read from single slot");
            return Ok(Some(Zeroizing::new(pem)));
        }
        let Some(count) = self.read_chunk_count().await? else {
            debug!("no private key stored");
            return Ok(None);
        };
        let mut pem = Zeroizing::new(String::new());
        for index in 0..count {
            match self.store.get(&chunk_slot(index)).await? {
                Some(chunk) => pem.push_str(&Zeroizing::new(chunk)),
                None => {
                    warn!(index, expected = count, "private key chunk missing");
                    return Err(WhisprError::MissingChunk {
                        index,
                        expected: count,
                    });
                }
            }
        }
        debug!(chunks = count, "private key reassembled");
        Ok(Some(pem))
    }

    pub async fn get_public_key(&self, account_id: &str) -> Result<Option<String>> {
        self.directory.get_public_key(account_id).await
    }

    /// Validate and publish the public half for `account_id`.
    pub async fn publish_public_key(&self, account_id: &str, public_pem: &str) -> Result<()> {
        let public = provider::parse_public_key(public_pem)?;
        let bits = provider::modulus_bits(&public);
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::UnsupportedKeySize {
                bits,
                minimum: MIN_RSA_BITS,
            }
            .into());
        }
        self.directory.set_public_key(account_id, public_pem).await?;
        info!(account_id, "public key published");
        Ok(())
    }

    pub async fn has_keys(&self) -> Result<bool> {
        Ok(self.get_private_key().await?.is_some())
    }

    pub async fn clear_keys(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(PRIVATE_KEY_SLOT).await?;
        let count = self.read_chunk_count_or_sweep().await?;
        self.delete_chunk_layout(count.unwrap_or(0)).await?;
        info!("encryption keys cleared");
        Ok(())
    }

    pub fn validate_key(&self, pem: &str, kind: KeyKind) -> bool {
        validate_key(pem, kind)
    }

    pub fn key_info(&self, private_pem: &str) -> Option<KeyInfo> {
        key_info(private_pem)
    }

    /// Human-readable backup of both keys. Not meant to be parsed back.
    pub async fn export_document(&self, account_id: &str, now: DateTime<Utc>) -> Result<String> {
        let private = self.get_private_key().await?;
        let public = self.get_public_key(account_id).await?;
        Ok(export_document(
            account_id,
            public.as_deref(),
            private.as_ref().map(|p| p.as_str()),
            now,
        ))
    }
}

pub fn validate_key(pem: &str, kind: KeyKind) -> bool {
    match kind {
        KeyKind::Public => provider::parse_public_key(pem).is_ok(),
        KeyKind::Private => provider::parse_private_key(pem).is_ok(),
    }
}

pub fn key_info(private_pem: &str) -> Option<KeyInfo> {
    use rsa::traits::PublicKeyParts;
    let private = provider::parse_private_key(private_pem).ok()?;
    Some(KeyInfo {
        key_size_bits: private.n().bits(),
        modulus: private.n().to_str_radix(16),
        exponent: private.e().to_string(),
        algorithm: "RSA".into(),
        format: "PEM ASN.1".into(),
    })
}

pub fn export_document(
    account_label: &str,
    public_pem: Option<&str>,
    private_pem: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let key_size = private_pem
        .and_then(key_info)
        .map(|info| format!("{} bits", info.key_size_bits))
        .unwrap_or_else(|| "unknown".into());
    let private_block = private_pem
        .map(|p| p.trim_end().to_string())
        .unwrap_or_else(|| "Not found - generate keys first".into());
    let public_block = public_pem
        .map(|p| p.trim_end().to_string())
        .unwrap_or_else(|| "Not found - publish the public key first".into());

    format!(
        "# Whispr - RSA Key Pair Export (PEM ASN.1 Format)\n\
         # Generated: {generated}\n\
         # Account: {account_label}\n\
         # Algorithm: RSA with OAEP (SHA-256) encryption padding\n\
         # Format: PEM (RFC 7468) with ASN.1 DER payload\n\
         \n\
         ## PRIVATE KEY (Keep this secret!)\n\
         # PKCS#8 PrivateKeyInfo\n\
         {private_block}\n\
         \n\
         ## PUBLIC KEY (Safe to share)\n\
         # X.509 SubjectPublicKeyInfo\n\
         {public_block}\n\
         \n\
         ## TECHNICAL DETAILS:\n\
         - Key Size: {key_size}\n\
         - Format: PEM (Privacy-Enhanced Mail)\n\
         - Encoding: ASN.1 DER\n\
         - Private Key Standard: PKCS#8\n\
         - Public Key Standard: X.509 SubjectPublicKeyInfo\n\
         - Padding Scheme: RSA-OAEP with SHA-256 (for encryption)\n\
         \n\
         ## IMPORTANT SECURITY NOTES:\n\
         - NEVER share your private key with anyone\n\
         - Store this file securely and delete it after inspection\n\
         - The private key decrypts every message sent to you\n\
         - The public key is what others use to encrypt messages to you\n\
         - If the private key is compromised, regenerate immediately\n\
         \n\
         ## Key Information:\n\
         - Private Key Length: {private_len} characters\n\
         - Public Key Length: {public_len} characters\n",
        generated = now.to_rfc3339(),
        private_len = private_pem.map(str::len).unwrap_or(0),
        public_len = public_pem.map(str::len).unwrap_or(0),
    )
}
