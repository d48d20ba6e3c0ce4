use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec::ContactDescriptor;

pub const REGISTRY_VERSION: u32 = 1;
pub const EXPORT_VERSION: &str = "1.0";
pub const REDACTED_KEY: &str = "[ENCRYPTED_KEY]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub timestamp: i64,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub public_key: String,
    pub added_at: i64,
    pub last_seen: Option<i64>,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    /// Set when a known contact shows up with a different public key.
    #[serde(default)]
    pub key_change_pending: bool,
}

impl ContactRecord {
    pub fn new(email: &str, display_name: &str, public_key: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            public_key: public_key.to_string(),
            added_at: Utc::now().timestamp_millis(),
            last_seen: None,
            is_online: false,
            avatar: None,
            status: None,
            last_message: None,
            key_change_pending: false,
        }
    }

    /// A fresh record for a scanned descriptor. Without a usable display name
    /// the local part of the address is used.
    pub fn from_descriptor(descriptor: &ContactDescriptor) -> Self {
        let name = descriptor
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_display_name(&descriptor.email));
        Self::new(&descriptor.email, &name, &descriptor.public_key)
    }

    /// Fold `incoming` into `self`. The stored id and `added_at` survive.
    pub(crate) fn merge_from(&mut self, incoming: ContactRecord) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if !incoming.display_name.is_empty() {
            self.display_name = incoming.display_name;
        }
        if !incoming.public_key.is_empty() && incoming.public_key != self.public_key {
            self.public_key = incoming.public_key;
            self.key_change_pending = true;
            outcome.key_changed = true;
        }
        if let Some(seen) = incoming.last_seen {
            self.last_seen = Some(self.last_seen.map_or(seen, |cur| cur.max(seen)));
        }
        self.is_online = incoming.is_online;
        if incoming.avatar.is_some() {
            self.avatar = incoming.avatar;
        }
        if incoming.status.is_some() {
            self.status = incoming.status;
        }
        if let Some(message) = incoming.last_message {
            self.set_last_message(message);
        }
        outcome
    }

    /// Replace the last message unless the stored one is newer.
    pub(crate) fn set_last_message(&mut self, message: LastMessage) -> bool {
        match &self.last_message {
            Some(current) if current.timestamp > message.timestamp => false,
            _ => {
                self.last_message = Some(message);
                true
            }
        }
    }

    fn redacted(&self) -> Self {
        Self {
            public_key: REDACTED_KEY.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergeOutcome {
    pub key_changed: bool,
}

pub fn default_display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

/// What is persisted under the registry key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RegistryDocument {
    pub version: u32,
    pub contacts: Vec<ContactRecord>,
}

/// Untagged so the bare-array layout written before versioning still loads.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum StoredRegistry {
    Versioned(RegistryDocument),
    Legacy(Vec<ContactRecord>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactExport {
    pub version: String,
    pub timestamp: i64,
    #[serde(rename = "friends")]
    pub contacts: Vec<ContactRecord>,
}

impl ContactExport {
    pub fn redacted(contacts: &[ContactRecord]) -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            contacts: contacts.iter().map(ContactRecord::redacted).collect(),
        }
    }
}
