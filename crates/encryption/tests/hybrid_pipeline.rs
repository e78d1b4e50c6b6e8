//! End-to-end tests of the layered pipeline: engine round trips, store
//! determinism under contention, and the outer-layer boundary.

use common::{KeyId, LayerPolicy};
use encryption::{
    aead, classify, kem, restore_from_outer_layer, wrap_for_outer_layer, Classification,
    EncryptionError, HybridEngine, KemAlgorithm, KeyStore,
};

#[test]
fn end_to_end_three_layer_hello_world() {
    let store = KeyStore::new();
    let engine = HybridEngine::with_store(store);
    let pair = kem::generate_keypair(KemAlgorithm::MlKem768);

    let message = engine
        .encrypt(b"hello world", &pair.public_key, LayerPolicy::ThreeLayer)
        .unwrap();
    assert!(message.envelope.used_aead);

    let plaintext = engine.decrypt(&message, pair.secret_key()).unwrap();
    assert_eq!(plaintext, b"hello world");
}

#[test]
fn concurrent_get_or_create_is_deterministic() {
    let store = KeyStore::new();
    let id = KeyId::generate();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let store = store.clone();
            let id = id.clone();
            std::thread::spawn(move || store.get_or_create(&id, 512).unwrap())
        })
        .collect();

    let keys: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for key in &keys[1..] {
        assert_eq!(key.bytes(), keys[0].bytes());
    }
    assert_eq!(store.key_count(), 1);
}

#[test]
fn concurrent_pipeline_interleaves_one_message() {
    // A single email fans out into subject, body, and attachments that run
    // through the engine concurrently against one shared store.
    let store = KeyStore::new();
    let engine = HybridEngine::with_store(store);
    let pair = kem::generate_keypair(KemAlgorithm::MlKem768);

    let parts: Vec<Vec<u8>> = vec![
        b"subject: quarterly numbers".to_vec(),
        b"body text with several sentences of content".to_vec(),
        vec![0xF0u8; 4096],
        vec![0x0Fu8; 1],
    ];

    let handles: Vec<_> = parts
        .into_iter()
        .map(|part| {
            let engine = engine.clone();
            let public_key = pair.public_key.clone();
            std::thread::spawn(move || {
                let message = engine
                    .encrypt(&part, &public_key, LayerPolicy::ThreeLayer)
                    .unwrap();
                (part, message)
            })
        })
        .collect();

    for handle in handles {
        let (part, message) = handle.join().unwrap();
        assert_eq!(engine.decrypt(&message, pair.secret_key()).unwrap(), part);
    }
}

#[test]
fn outer_composition_carries_envelope_through_aead() {
    // PQC-over-AEAD as used for subject/body/attachments: the inner PQC
    // envelope travels base64-wrapped through an outer AEAD layer.
    let engine = HybridEngine::derived_direct(KemAlgorithm::MlKem768);
    let pair = kem::generate_keypair(KemAlgorithm::MlKem768);
    let body: String = "long message body ".repeat(556); // > 10,000 chars

    let message = engine
        .encrypt(body.as_bytes(), &pair.public_key, LayerPolicy::TwoLayer)
        .unwrap();

    let wrapped = wrap_for_outer_layer(&message.envelope).unwrap();
    let outer_key = [0x42u8; aead::AEAD_KEY_LEN];
    let sealed = aead::encrypt(wrapped.as_bytes(), &outer_key, b"").unwrap();

    let opened = aead::decrypt(&sealed, &outer_key, b"").unwrap();
    let recovered = restore_from_outer_layer(std::str::from_utf8(&opened).unwrap()).unwrap();
    assert_eq!(recovered, message.envelope);

    let plaintext = engine.decrypt_envelope(&recovered, pair.secret_key()).unwrap();
    assert_eq!(plaintext, body.as_bytes());
}

#[test]
fn corrupted_outer_wrap_never_yields_an_envelope() {
    let engine = HybridEngine::derived_direct(KemAlgorithm::MlKem512);
    let pair = kem::generate_keypair(KemAlgorithm::MlKem512);
    let message = engine
        .encrypt(b"integrity", &pair.public_key, LayerPolicy::TwoLayer)
        .unwrap();

    let wrapped = wrap_for_outer_layer(&message.envelope).unwrap();
    let mut corrupted = wrapped.into_bytes();
    let mid = corrupted.len() / 2;
    corrupted[mid] = if corrupted[mid] == b'A' { b'B' } else { b'A' };

    let err = restore_from_outer_layer(std::str::from_utf8(&corrupted).unwrap()).unwrap_err();
    assert!(matches!(err, EncryptionError::EnvelopeCorrupted(_)));
}

#[test]
fn engine_output_classifies_as_pqc() {
    let store = KeyStore::new();
    let engine = HybridEngine::with_store(store);
    let pair = kem::generate_keypair(KemAlgorithm::MlKem768);

    let message = engine
        .encrypt(b"classified", &pair.public_key, LayerPolicy::TwoLayer)
        .unwrap();
    let raw = message.envelope.encode().unwrap();

    match classify(&raw) {
        Classification::Pqc(envelope) => assert_eq!(envelope, message.envelope),
        other => panic!("expected PQC classification, got {other:?}"),
    }
}

#[test]
fn legacy_snake_case_envelope_still_decrypts() {
    let store = KeyStore::new();
    let engine = HybridEngine::with_store(store);
    let pair = kem::generate_keypair(KemAlgorithm::MlKem768);

    let message = engine
        .encrypt(b"written by an older revision", &pair.public_key, LayerPolicy::ThreeLayer)
        .unwrap();
    let env = &message.envelope;

    // Rewrite the envelope the way the previous revision serialized it.
    let legacy = serde_json::json!({
        "encrypted_body": env.encrypted_body,
        "pqc_ciphertext": env.kem_ciphertext,
        "encrypted_key_id": env.encrypted_key_id,
        "algorithm": env.algorithm_label,
        "key_id": env.key_id,
        "security_level": env.security_level,
        "used_aead": env.used_aead,
    })
    .to_string();

    let decoded = match classify(&legacy) {
        Classification::Pqc(envelope) => envelope,
        other => panic!("expected PQC classification, got {other:?}"),
    };
    assert_eq!(&decoded, env);

    let plaintext = engine.decrypt_envelope(&decoded, pair.secret_key()).unwrap();
    assert_eq!(plaintext, b"written by an older revision");
}

#[test]
fn shared_store_links_sender_and_receiver() {
    // Sender and receiver engines are distinct handles over one store, the
    // deployment shape the key-manager service provides.
    let store = KeyStore::new();
    let sender = HybridEngine::with_store(store.clone());
    let receiver = HybridEngine::with_store(store);
    let pair = kem::generate_keypair(KemAlgorithm::MlKem768);

    let message = sender
        .encrypt(b"cross-engine", &pair.public_key, LayerPolicy::TwoLayer)
        .unwrap();
    let plaintext = receiver.decrypt(&message, pair.secret_key()).unwrap();
    assert_eq!(plaintext, b"cross-engine");
}
