//! Application-facing entry point tying keys, cipher and contacts together.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cipher::MessageCipher;
use crate::config::CoreConfig;
use crate::contact::{ContactCodec, ContactRecord, ContactStore, RegistryBackend};
use crate::error::{Result, StorageError, WhisprError};
use crate::identity::IdentityDirectory;
use crate::keys::{KeyManager, KeyOptions};
use crate::keystore::{KeyStore, TimedKeyStore};
use crate::provider::{CryptoProvider, RsaOaepProvider};

/// What `sign_in` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignIn {
    /// A private key was stored and a public key was already published.
    ExistingKeys,
    /// A fresh pair was generated, stored and published.
    GeneratedKeys,
}

pub struct WhisprClient {
    keys: KeyManager,
    cipher: MessageCipher,
    contacts: ContactStore,
}

impl WhisprClient {
    pub fn new(keys: KeyManager, cipher: MessageCipher, contacts: ContactStore) -> Self {
        Self {
            keys,
            cipher,
            contacts,
        }
    }

    /// Wire the default RSA provider behind a timeout-bounded key store.
    pub fn from_config(
        config: &CoreConfig,
        store: Arc<dyn KeyStore>,
        directory: Arc<dyn IdentityDirectory>,
        registry: Arc<dyn RegistryBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let provider: Arc<dyn CryptoProvider> =
            Arc::new(RsaOaepProvider::new(config.keys.rsa_bits)?);
        let store: Arc<dyn KeyStore> =
            Arc::new(TimedKeyStore::new(store, config.keystore.io_timeout()));
        let keys = KeyManager::new(
            store,
            provider.clone(),
            directory,
            KeyOptions::from_config(config),
        )?;
        Ok(Self::new(
            keys,
            MessageCipher::new(provider),
            ContactStore::new(registry, config.contacts.registry_key.clone()),
        ))
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn contacts(&self) -> &ContactStore {
        &self.contacts
    }

    pub fn cipher(&self) -> &MessageCipher {
        &self.cipher
    }

    /// Make sure this device can decrypt and that peers can find our public
    /// key. Generates a new pair when either half is missing.
    pub async fn sign_in(&self, account_id: &str) -> Result<SignIn> {
        let has_private = match self.keys.has_keys().await {
            Ok(present) => present,
            Err(WhisprError::MissingChunk { index, expected }) => {
                warn!(index, expected, "stored private key is incomplete, replacing it");
                false
            }
            Err(WhisprError::Storage(StorageError::Corrupt(detail))) => {
                warn!(%detail, "stored private key is unreadable, replacing it");
                false
            }
            Err(e) => return Err(e),
        };
        let published = self.keys.get_public_key(account_id).await?.is_some();
        if has_private && published {
            info!(account_id, "existing encryption keys found");
            return Ok(SignIn::ExistingKeys);
        }

        info!(account_id, has_private, published, "bootstrapping encryption keys");
        let pair = self.keys.generate_key_pair().await?;
        self.keys
            .publish_public_key(account_id, &pair.public_key)
            .await?;
        Ok(SignIn::GeneratedKeys)
    }

    /// Removes the private key from this device. Contacts are kept.
    pub async fn sign_out(&self) -> Result<()> {
        self.keys.clear_keys().await
    }

    /// Contact payload for our own QR code.
    pub async fn share_contact(
        &self,
        account_id: &str,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<String> {
        let public = self
            .keys
            .get_public_key(account_id)
            .await?
            .ok_or_else(|| WhisprError::NoPublicKey(account_id.to_string()))?;
        let descriptor = ContactCodec::encode(email, &public, display_name);
        Ok(ContactCodec::to_payload(&descriptor)?)
    }

    /// Validate a scanned payload and add or refresh the contact.
    pub async fn accept_contact(&self, raw: &str) -> Result<ContactRecord> {
        let descriptor = ContactCodec::decode(raw)?;
        self.contacts
            .upsert(ContactRecord::from_descriptor(&descriptor))
            .await
    }

    /// Encrypt for a registered contact. Refused while the contact's key
    /// change is unconfirmed.
    pub async fn encrypt_for(&self, email: &str, plaintext: &str) -> Result<String> {
        let contact = self
            .contacts
            .find_by_email(email)
            .await?
            .ok_or_else(|| WhisprError::UnknownContact(email.to_string()))?;
        if contact.key_change_pending {
            return Err(WhisprError::KeyChangePending(contact.email));
        }
        self.cipher.encrypt(plaintext, &contact.public_key)
    }

    /// Decrypt a message addressed to this device.
    pub async fn decrypt(&self, ciphertext_b64: &str) -> Result<String> {
        let private = self
            .keys
            .get_private_key()
            .await?
            .ok_or(WhisprError::NoPrivateKey)?;
        self.cipher.decrypt(ciphertext_b64, &private)
    }
}
