use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WhisprError};
use crate::provider::MIN_RSA_BITS;

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeyStoreConfig {
    /// Keyring service name entries are filed under.
    pub service_name: String,
    /// Largest value the backend accepts for one entry.
    pub max_value_len: usize,
    /// Private keys longer than this are split into chunks.
    pub chunk_threshold: usize,
    pub io_timeout_ms: u64,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            service_name: "Whispr".into(),
            max_value_len: 2048,
            chunk_threshold: 2000,
            io_timeout_ms: 5_000,
        }
    }
}

impl KeyStoreConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeyConfig {
    pub rsa_bits: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self { rsa_bits: 2048 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContactsConfig {
    pub registry_key: String,
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            registry_key: "whispr_friends".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoreConfig {
    pub keystore: KeyStoreConfig,
    pub keys: KeyConfig,
    pub contacts: ContactsConfig,
}

impl CoreConfig {
    pub fn validate(&self) -> Result<()> {
        let ks = &self.keystore;
        if ks.chunk_threshold == 0 || ks.chunk_threshold >= ks.max_value_len {
            return Err(WhisprError::Config(format!(
                "chunk_threshold ({}) must be between 1 and max_value_len ({}) exclusive",
                ks.chunk_threshold, ks.max_value_len
            )));
        }
        if ks.io_timeout_ms == 0 {
            return Err(WhisprError::Config("io_timeout_ms must be positive".into()));
        }
        if self.keys.rsa_bits < MIN_RSA_BITS {
            return Err(WhisprError::Config(format!(
                "rsa_bits ({}) below minimum {MIN_RSA_BITS}",
                self.keys.rsa_bits
            )));
        }
        if self.contacts.registry_key.trim().is_empty() {
            return Err(WhisprError::Config("registry_key is empty".into()));
        }
        Ok(())
    }
}

/// Read a config file, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<CoreConfig> {
    let config = match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| WhisprError::Config(format!("parse {}: {e}", path.display())))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CoreConfig::default(),
        Err(e) => {
            return Err(WhisprError::Config(format!(
                "read {}: {e}",
                path.display()
            )))
        }
    };
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &CoreConfig) -> Result<()> {
    config.validate()?;
    let data = serde_json::to_vec_pretty(config)
        .map_err(|e| WhisprError::Config(format!("serialise config: {e}")))?;
    std::fs::write(path, data)
        .map_err(|e| WhisprError::Config(format!("write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"keystore":{"io_timeout_ms":250}}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.keystore.io_timeout_ms, 250);
        assert_eq!(config.keystore.chunk_threshold, 2000);
        assert_eq!(config.keys.rsa_bits, 2048);
    }

    #[test]
    fn threshold_must_stay_below_backend_limit() {
        let mut config = CoreConfig::default();
        config.keystore.chunk_threshold = config.keystore.max_value_len;
        assert!(matches!(config.validate(), Err(WhisprError::Config(_))));
    }

    #[test]
    fn weak_key_size_rejected() {
        let mut config = CoreConfig::default();
        config.keys.rsa_bits = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = CoreConfig::default();
        config.contacts.registry_key = "friends_test".into();
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }
}
