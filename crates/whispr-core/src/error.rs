use std::time::Duration;

use thiserror::Error;

use crate::keys::KeyPair;

/// Why a contact descriptor (or a public key inside one) was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    /// Not parseable as a contact payload at all.
    Malformed(String),
    /// `app` field names some other application.
    AppMismatch(String),
    InvalidEmail(String),
    /// `publicKey` does not carry a `BEGIN PUBLIC KEY` marker.
    MissingPublicKeyMarker,
    InvalidPublicKey(String),
    KeyTooSmall { bits: usize },
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed payload: {detail}"),
            Self::AppMismatch(app) => write!(f, "payload belongs to app {app:?}"),
            Self::InvalidEmail(email) => write!(f, "invalid email address {email:?}"),
            Self::MissingPublicKeyMarker => write!(f, "public key PEM marker missing"),
            Self::InvalidPublicKey(detail) => write!(f, "public key unreadable: {detail}"),
            Self::KeyTooSmall { bits } => write!(f, "public key too small ({bits} bits)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation failed: {reason}")]
pub struct ValidationError {
    pub reason: ValidationReason,
}

impl From<ValidationReason> for ValidationError {
    fn from(reason: ValidationReason) -> Self {
        Self { reason }
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Unsupported key size: {bits} bits (minimum {minimum})")]
    UnsupportedKeySize { bits: usize, minimum: usize },

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    /// Deliberately carries no detail so padding failures cannot be told apart.
    #[error("Decryption failed")]
    Decrypt,

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Value for {key} is {len} bytes, backend limit is {max}")]
    ValueTooLarge { key: String, len: usize, max: usize },

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("{operation} on {key} did not complete within {after:?}")]
    TimedOut {
        operation: &'static str,
        key: String,
        after: Duration,
    },
}

/// Error surfaced at the boundary of the core.
#[derive(Debug, Error)]
pub enum WhisprError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Plaintext is {len} bytes, key can encrypt at most {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error(transparent)]
    Storage(StorageError),

    #[error("Private key chunk {index} of {expected} is missing")]
    MissingChunk { index: usize, expected: usize },

    #[error("{operation} on {key} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        key: String,
        after: Duration,
    },

    /// Keys were generated but could not be written; the pair is handed back.
    #[error("Generated key pair could not be persisted: {source}")]
    Unpersisted {
        key_pair: Box<KeyPair>,
        #[source]
        source: StorageError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No contact registered for {0}")]
    UnknownContact(String),

    #[error("No private key stored on this device")]
    NoPrivateKey,

    #[error("No public key published for {0}")]
    NoPublicKey(String),

    #[error("Public key of {0} changed; confirm it before messaging")]
    KeyChangePending(String),
}

impl From<StorageError> for WhisprError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TimedOut {
                operation,
                key,
                after,
            } => Self::Timeout {
                operation,
                key,
                after,
            },
            other => Self::Storage(other),
        }
    }
}

impl WhisprError {
    /// True for any failure that originated in a storage backend.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Timeout { .. } | Self::Unpersisted { .. }
        )
    }
}

pub type Result<T, E = WhisprError> = std::result::Result<T, E>;
