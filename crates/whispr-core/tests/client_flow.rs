mod common;

use std::sync::Arc;

use common::{alice_keys, bob_keys, weak_public_key, FixedProvider};
use whispr_core::cipher::MessageCipher;
use whispr_core::contact::{ContactCodec, ContactStore, MemoryRegistry};
use whispr_core::identity::{IdentityDirectory, MemoryDirectory};
use whispr_core::keys::{chunk_slot, KeyManager, KeyOptions, KeyPair, CHUNK_COUNT_SLOT, PRIVATE_KEY_SLOT};
use whispr_core::keystore::{KeyStore, MemoryKeyStore};
use whispr_core::{CoreConfig, SignIn, ValidationReason, WhisprClient, WhisprError};

struct Device {
    client: WhisprClient,
    directory: Arc<MemoryDirectory>,
}

fn device(pair: &KeyPair) -> Device {
    device_on(Arc::new(MemoryKeyStore::new(2048)), pair)
}

fn device_on(store: Arc<MemoryKeyStore>, pair: &KeyPair) -> Device {
    let directory = Arc::new(MemoryDirectory::new());
    let provider = Arc::new(FixedProvider::new(pair));
    let keys = KeyManager::new(
        store,
        provider.clone(),
        directory.clone(),
        KeyOptions::default(),
    )
    .unwrap();
    let client = WhisprClient::new(
        keys,
        MessageCipher::new(provider),
        ContactStore::new(Arc::new(MemoryRegistry::new()), "whispr_friends"),
    );
    Device { client, directory }
}

#[tokio::test]
async fn sign_in_bootstraps_once() {
    let alice = device(alice_keys());
    assert_eq!(
        alice.client.sign_in("alice").await.unwrap(),
        SignIn::GeneratedKeys
    );
    assert_eq!(
        alice.directory.get_public_key("alice").await.unwrap().as_deref(),
        Some(alice_keys().public_key.as_str())
    );
    assert_eq!(
        alice.client.sign_in("alice").await.unwrap(),
        SignIn::ExistingKeys
    );
}

#[tokio::test]
async fn sign_in_regenerates_when_public_key_is_unpublished() {
    let alice = device(alice_keys());
    alice.client.keys().generate_key_pair().await.unwrap();
    assert_eq!(
        alice.client.sign_in("alice").await.unwrap(),
        SignIn::GeneratedKeys
    );
}

#[tokio::test]
async fn sign_in_replaces_unreadable_chunk_count() {
    let store = Arc::new(MemoryKeyStore::new(2048));
    store.set(CHUNK_COUNT_SLOT, "many").await.unwrap();
    store.set(&chunk_slot(0), "abc").await.unwrap();
    let alice = device_on(store.clone(), alice_keys());

    assert_eq!(
        alice.client.sign_in("alice").await.unwrap(),
        SignIn::GeneratedKeys
    );
    let stored = alice.client.keys().get_private_key().await.unwrap().unwrap();
    assert_eq!(stored.as_str(), alice_keys().private_key.as_str());
    assert_eq!(store.keys(), vec![PRIVATE_KEY_SLOT.to_string()]);
}

#[tokio::test]
async fn sign_out_drops_private_key() {
    let alice = device(alice_keys());
    alice.client.sign_in("alice").await.unwrap();
    alice.client.sign_out().await.unwrap();
    assert!(!alice.client.keys().has_keys().await.unwrap());

    let err = alice.client.decrypt("AAAA").await.unwrap_err();
    assert!(matches!(err, WhisprError::NoPrivateKey));

    assert_eq!(
        alice.client.sign_in("alice").await.unwrap(),
        SignIn::GeneratedKeys
    );
}

#[tokio::test]
async fn scanned_contact_can_receive_messages() {
    let alice = device(alice_keys());
    let bob = device(bob_keys());
    alice.client.sign_in("alice").await.unwrap();
    bob.client.sign_in("bob").await.unwrap();

    let payload = alice
        .client
        .share_contact("alice", "alice@example.com", Some("Alice"))
        .await
        .unwrap();
    let record = bob.client.accept_contact(&payload).await.unwrap();
    assert_eq!(record.display_name, "Alice");
    assert_eq!(record.public_key, alice_keys().public_key);

    let ciphertext = bob
        .client
        .encrypt_for("alice@example.com", "hello alice")
        .await
        .unwrap();
    assert_eq!(alice.client.decrypt(&ciphertext).await.unwrap(), "hello alice");
    assert!(bob.client.decrypt(&ciphertext).await.is_err());
}

#[tokio::test]
async fn rescanning_updates_the_same_contact() {
    let bob = device(bob_keys());
    let first = ContactCodec::encode("alice@example.com", &alice_keys().public_key, None);
    let stored = bob
        .client
        .accept_contact(&ContactCodec::to_payload(&first).unwrap())
        .await
        .unwrap();
    assert_eq!(stored.display_name, "alice");

    let second =
        ContactCodec::encode("alice@example.com", &alice_keys().public_key, Some("Alice A."));
    let updated = bob
        .client
        .accept_contact(&ContactCodec::to_payload(&second).unwrap())
        .await
        .unwrap();

    let all = bob.client.contacts().list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(updated.id, stored.id);
    assert_eq!(all[0].display_name, "Alice A.");
    assert!(!all[0].key_change_pending);
}

#[tokio::test]
async fn changed_key_blocks_messaging_until_confirmed() {
    let bob = device(bob_keys());
    let original = ContactCodec::encode("alice@example.com", &alice_keys().public_key, None);
    bob.client
        .accept_contact(&ContactCodec::to_payload(&original).unwrap())
        .await
        .unwrap();

    // same address, different key
    let rotated = ContactCodec::encode("alice@example.com", &bob_keys().public_key, None);
    let record = bob
        .client
        .accept_contact(&ContactCodec::to_payload(&rotated).unwrap())
        .await
        .unwrap();
    assert!(record.key_change_pending);

    let err = bob
        .client
        .encrypt_for("alice@example.com", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, WhisprError::KeyChangePending(_)));

    assert!(bob.client.contacts().confirm_key("alice@example.com").await.unwrap());
    bob.client
        .encrypt_for("alice@example.com", "hi")
        .await
        .unwrap();
}

#[tokio::test]
async fn invalid_payloads_are_not_stored() {
    let bob = device(bob_keys());
    let weak = ContactCodec::encode("carol@example.com", weak_public_key(), None);
    let err = bob
        .client
        .accept_contact(&ContactCodec::to_payload(&weak).unwrap())
        .await
        .unwrap_err();
    match err {
        WhisprError::Validation(e) => {
            assert_eq!(e.reason, ValidationReason::KeyTooSmall { bits: 1024 })
        }
        other => panic!("unexpected error {other:?}"),
    }

    let err = bob
        .client
        .accept_contact(r#"{"email":"a@b.com","publicKey":"not-a-key","app":"Whispr","version":"1.0"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, WhisprError::Validation(_)));
    assert!(bob.client.contacts().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_recipient_is_refused() {
    let bob = device(bob_keys());
    let err = bob
        .client
        .encrypt_for("nobody@example.com", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, WhisprError::UnknownContact(_)));
}

#[tokio::test]
async fn client_from_default_config() {
    let client = WhisprClient::from_config(
        &CoreConfig::default(),
        Arc::new(MemoryKeyStore::new(2048)),
        Arc::new(MemoryDirectory::new()),
        Arc::new(MemoryRegistry::new()),
    )
    .unwrap();
    assert!(!client.keys().has_keys().await.unwrap());
    let err = client
        .share_contact("alice", "alice@example.com", None)
        .await
        .unwrap_err();
    assert!(matches!(err, WhisprError::NoPublicKey(_)));
}

#[tokio::test]
async fn client_rejects_weak_key_config() {
    let mut config = CoreConfig::default();
    config.keys.rsa_bits = 1024;
    let result = WhisprClient::from_config(
        &config,
        Arc::new(MemoryKeyStore::new(2048)),
        Arc::new(MemoryDirectory::new()),
        Arc::new(MemoryRegistry::new()),
    );
    assert!(result.is_err());
}
