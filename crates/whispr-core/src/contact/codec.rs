//! Portable contact descriptor, the payload carried by a QR code or pasted
//! by hand.
//!
//! ```json
//! {"email":"a@b.com","publicKey":"-----BEGIN PUBLIC KEY-----...","displayName":"A",
//!  "timestamp":1700000000000,"app":"Whispr","version":"1.0"}
//! ```

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ValidationError, ValidationReason};
use crate::provider::{self, MIN_RSA_BITS, PUBLIC_KEY_MARKER};

pub const APP_IDENTIFIER: &str = "Whispr";
pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDescriptor {
    pub email: String,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub app: String,
    pub version: String,
}

/// Shape accepted off the wire before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
    email: Option<String>,
    public_key: Option<String>,
    display_name: Option<String>,
    timestamp: Option<i64>,
    app: Option<String>,
    version: Option<String>,
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

pub struct ContactCodec;

impl ContactCodec {
    pub fn encode(email: &str, public_pem: &str, display_name: Option<&str>) -> ContactDescriptor {
        ContactDescriptor {
            email: email.to_string(),
            public_key: public_pem.to_string(),
            display_name: display_name.map(str::to_string),
            timestamp: Utc::now().timestamp_millis(),
            app: APP_IDENTIFIER.to_string(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// JSON text for the QR code.
    pub fn to_payload(descriptor: &ContactDescriptor) -> Result<String, ValidationError> {
        serde_json::to_string(descriptor)
            .map_err(|e| ValidationReason::Malformed(e.to_string()).into())
    }

    pub fn decode(raw: &str) -> Result<ContactDescriptor, ValidationError> {
        let parsed: RawDescriptor = serde_json::from_str(raw.trim())
            .map_err(|e| ValidationReason::Malformed(e.to_string()))?;

        let app = parsed
            .app
            .ok_or_else(|| ValidationReason::Malformed("missing field `app`".into()))?;
        if app != APP_IDENTIFIER {
            return Err(ValidationReason::AppMismatch(app).into());
        }
        let email = parsed
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ValidationReason::Malformed("missing field `email`".into()))?;
        let public_key = parsed
            .public_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ValidationReason::Malformed("missing field `publicKey`".into()))?;

        if !is_valid_email(&email) {
            return Err(ValidationReason::InvalidEmail(email).into());
        }
        if !public_key.contains(PUBLIC_KEY_MARKER) {
            return Err(ValidationReason::MissingPublicKeyMarker.into());
        }
        let bits = Self::validate_public_key(&public_key)?;
        debug!(bits, "contact descriptor accepted");

        Ok(ContactDescriptor {
            email,
            public_key,
            display_name: parsed.display_name,
            timestamp: parsed.timestamp.unwrap_or(0),
            app,
            version: parsed
                .version
                .unwrap_or_else(|| PROTOCOL_VERSION.to_string()),
        })
    }

    /// Parse the key and enforce the minimum modulus size; returns the size.
    pub fn validate_public_key(public_pem: &str) -> Result<usize, ValidationError> {
        let key = provider::parse_public_key(public_pem)
            .map_err(|e| ValidationReason::InvalidPublicKey(e.to_string()))?;
        let bits = provider::modulus_bits(&key);
        if bits < MIN_RSA_BITS {
            return Err(ValidationReason::KeyTooSmall { bits }.into());
        }
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(raw: &str) -> ValidationReason {
        ContactCodec::decode(raw).unwrap_err().reason
    }

    #[test]
    fn rejects_non_key_public_key() {
        let raw = r#"{"email":"a@b.com","publicKey":"not-a-key","app":"Whispr","version":"1.0"}"#;
        assert_eq!(reason(raw), ValidationReason::MissingPublicKeyMarker);
    }

    #[test]
    fn rejects_bad_email() {
        let raw = r#"{"email":"bad-email","publicKey":"-----BEGIN PUBLIC KEY-----...","app":"Whispr"}"#;
        assert_eq!(reason(raw), ValidationReason::InvalidEmail("bad-email".into()));
    }

    #[test]
    fn rejects_other_apps() {
        let raw = r#"{"email":"a@b.com","publicKey":"-----BEGIN PUBLIC KEY-----","app":"Signal"}"#;
        assert_eq!(reason(raw), ValidationReason::AppMismatch("Signal".into()));
    }

    #[test]
    fn rejects_unparseable_input() {
        assert!(matches!(reason("not json"), ValidationReason::Malformed(_)));
        assert!(matches!(reason("[1,2,3]"), ValidationReason::Malformed(_)));
        assert!(matches!(
            reason(r#"{"email":"a@b.com","app":"Whispr"}"#),
            ValidationReason::Malformed(_)
        ));
        assert!(matches!(
            reason(r#"{"email":"a@b.com","publicKey":"k","app":"Whispr","timestamp":"soon"}"#),
            ValidationReason::Malformed(_)
        ));
    }

    #[test]
    fn marker_without_key_body_is_invalid_key() {
        let raw = r#"{"email":"a@b.com","publicKey":"-----BEGIN PUBLIC KEY-----...","app":"Whispr"}"#;
        assert!(matches!(reason(raw), ValidationReason::InvalidPublicKey(_)));
    }

    #[test]
    fn email_grammar() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice example@x.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn encode_stamps_app_and_version() {
        let d = ContactCodec::encode("a@b.com", "PEM", None);
        assert_eq!(d.app, APP_IDENTIFIER);
        assert_eq!(d.version, PROTOCOL_VERSION);
        assert!(d.timestamp > 0);
        let payload = ContactCodec::to_payload(&d).unwrap();
        assert!(!payload.contains("displayName"));
        assert!(payload.contains(r#""publicKey":"PEM""#));
    }
}
