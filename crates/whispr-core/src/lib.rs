//! whispr_core: end-to-end key lifecycle and contact exchange for Whispr
//!
//! # Design principles
//! - No custom crypto; RSA-OAEP comes from the RustCrypto `rsa` crate.
//! - Private key text is zeroized on drop and never logged.
//! - Storage backends sit behind async traits so the OS keyring, files and
//!   in-memory maps are interchangeable.
//!
//! # Module layout
//! - `keystore`  size-limited secret store (memory, OS keyring, timeout wrapper)
//! - `provider`  RSA-OAEP(SHA-256) key generation, encryption, PEM parsing
//! - `keys`      key pair generation, chunked private key persistence, export
//! - `identity`  account directory holding the published public key
//! - `cipher`    base64 short-message encryption for a contact
//! - `contact`   QR descriptor codec, contact records, local registry
//! - `client`    sign-in bootstrap and the messaging entry points
//! - `config`    tunables loaded from `config.json`
//! - `paths`     platform data directory
//! - `error`     unified error types

pub mod cipher;
pub mod client;
pub mod config;
pub mod contact;
pub mod error;
pub mod identity;
pub mod keys;
pub mod keystore;
pub mod paths;
pub mod provider;

pub use client::{SignIn, WhisprClient};
pub use config::CoreConfig;
pub use error::{CryptoError, Result, StorageError, ValidationError, ValidationReason, WhisprError};
pub use keys::{KeyInfo, KeyKind, KeyManager, KeyPair};
