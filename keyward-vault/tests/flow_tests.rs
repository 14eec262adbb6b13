mod support;

use keyward_storage::KeyValueStore;
use keyward_vault::field::{decrypt, encrypt};
use keyward_vault::{
    FlowState, MemoryDirectory, OperationOutcome, PendingOperation, PublicKeyDirectory,
    Submission, VaultConfig, VaultError, WRAPPED_KEY_STORE_KEY,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::{harness, harness_with, keypair, PASSPHRASE, SECRET};
use zeroize::Zeroizing;

fn reveal(field_id: &str, ciphertext: &str) -> PendingOperation {
    PendingOperation::Reveal {
        field_id: field_id.into(),
        ciphertext: ciphertext.into(),
    }
}

fn seal(field_id: &str, plaintext: &str) -> PendingOperation {
    PendingOperation::Seal {
        field_id: field_id.into(),
        plaintext: Zeroizing::new(plaintext.into()),
    }
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn new_device_restores_from_exported_backup() {
    let old = harness();
    old.flow
        .generate("Ada", "ada@example.com", PASSPHRASE, false)
        .await
        .unwrap();
    let public_key = old.flow.custody().public_key().unwrap().unwrap();
    let ciphertext = encrypt(SECRET, &public_key).unwrap();
    let backup = old.flow.export_backup(PASSPHRASE).unwrap();

    let new = harness_with(VaultConfig::for_tests(), old.directory.clone());
    assert_eq!(
        new.flow.refresh_state().await.unwrap(),
        FlowState::KeyConfiguredLocked {
            private_key_present: false
        }
    );

    let file = format!("Keyward backup, made on my laptop\n\n{}\nkeep this safe\n", *backup);
    new.flow.unlock_with_backup(PASSPHRASE, &file).await.unwrap();
    assert_eq!(new.flow.state().unwrap(), FlowState::Unlocked);

    let handle = new.flow.session().current().unwrap();
    assert_eq!(decrypt(&ciphertext, Some(&handle)).unwrap(), SECRET);
}

#[tokio::test]
async fn new_device_with_wrong_passphrase_gets_nothing() {
    let old = harness();
    old.flow
        .generate("Ada", "ada@example.com", PASSPHRASE, false)
        .await
        .unwrap();
    let public_key = old.flow.custody().public_key().unwrap().unwrap();
    let ciphertext = encrypt(SECRET, &public_key).unwrap();
    let backup = old.flow.export_backup(PASSPHRASE).unwrap();

    let new = harness();
    let err = new
        .flow
        .unlock_with_backup("wrong-pass", &backup)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::WrongPassphrase), "{err:?}");
    assert_eq!(err.user_message(), "Incorrect master password.");

    assert!(!new.flow.session().is_unlocked());
    assert_eq!(new.store.get(WRAPPED_KEY_STORE_KEY).unwrap(), None);
    assert!(decrypt(&ciphertext, new.flow.session().current().as_ref()).is_err());
}

// ── Transitions ──────────────────────────────────────────────────

#[tokio::test]
async fn generate_unlocks_and_publishes() {
    let h = harness();
    assert_eq!(h.flow.state().unwrap(), FlowState::NoKeyConfigured);

    h.flow
        .generate("Ada", "", PASSPHRASE, false)
        .await
        .unwrap();
    assert_eq!(h.flow.state().unwrap(), FlowState::Unlocked);

    let published = h.directory.fetch_public_key().await.unwrap();
    assert_eq!(published, h.flow.custody().public_key().unwrap());

    h.flow.lock();
    assert_eq!(
        h.flow.state().unwrap(),
        FlowState::KeyConfiguredLocked {
            private_key_present: true
        }
    );
    h.flow.unlock(PASSPHRASE).await.unwrap();
    assert_eq!(h.flow.state().unwrap(), FlowState::Unlocked);
}

#[tokio::test]
async fn generate_refuses_to_overwrite_unless_asked() {
    let h = harness();
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();
    let first = h.flow.custody().public_key().unwrap();

    let err = h
        .flow
        .generate("Ada", "", PASSPHRASE, false)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::KeyAlreadyConfigured));
    assert_eq!(h.flow.custody().public_key().unwrap(), first);

    h.flow.generate("Ada", "", PASSPHRASE, true).await.unwrap();
    assert_ne!(h.flow.custody().public_key().unwrap(), first);
}

#[tokio::test]
async fn generate_refuses_when_account_key_is_published() {
    let directory = Arc::new(MemoryDirectory::new());
    let old = harness_with(VaultConfig::for_tests(), directory.clone());
    old.flow
        .generate("Ada", "ada@example.com", PASSPHRASE, false)
        .await
        .unwrap();
    let published = directory.fetch_public_key().await.unwrap();

    let new = harness_with(VaultConfig::for_tests(), directory.clone());
    assert_eq!(
        new.flow.refresh_state().await.unwrap(),
        FlowState::KeyConfiguredLocked {
            private_key_present: false
        }
    );
    let err = new
        .flow
        .generate("Ada", "", PASSPHRASE, false)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::KeyAlreadyConfigured), "{err:?}");
    assert_eq!(directory.fetch_public_key().await.unwrap(), published);
    assert!(!new.flow.custody().has_private_key().unwrap());
}

#[tokio::test]
async fn failed_unlock_leaves_state_alone() {
    let h = harness();
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();
    h.flow.lock();

    let err = h.flow.unlock("wrong-pass").await.unwrap_err();
    assert!(matches!(err, VaultError::WrongPassphrase));
    assert_eq!(
        h.flow.state().unwrap(),
        FlowState::KeyConfiguredLocked {
            private_key_present: true
        }
    );
}

#[tokio::test]
async fn backup_that_fails_to_unlock_restores_previous_record() {
    let h = harness();
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();
    h.flow.lock();
    let before = h.store.get(WRAPPED_KEY_STORE_KEY).unwrap();

    let other = harness();
    other
        .flow
        .generate("Eve", "", "another-passphrase", false)
        .await
        .unwrap();
    let other_backup = other.flow.export_backup("another-passphrase").unwrap();

    // Wrap layer accepts any passphrase on import; the inner lock rejects it.
    let err = h
        .flow
        .unlock_with_backup(PASSPHRASE, &other_backup)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::WrongPassphrase), "{err:?}");
    assert_eq!(h.store.get(WRAPPED_KEY_STORE_KEY).unwrap(), before);

    h.flow.unlock(PASSPHRASE).await.unwrap();
}

#[tokio::test]
async fn backup_of_another_keypair_is_rejected() {
    let h = harness();
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();
    h.flow.lock();
    let before = h.store.get(WRAPPED_KEY_STORE_KEY).unwrap();

    let other = harness();
    other
        .flow
        .generate("Eve", "", "another-passphrase", false)
        .await
        .unwrap();
    let other_backup = other.flow.export_backup("another-passphrase").unwrap();

    let err = h
        .flow
        .unlock_with_backup("another-passphrase", &other_backup)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidKeyFormat(_)), "{err:?}");
    assert!(!h.flow.session().is_unlocked());
    assert_eq!(h.store.get(WRAPPED_KEY_STORE_KEY).unwrap(), before);

    h.flow.unlock(PASSPHRASE).await.unwrap();
    let sealed = h.flow.submit(seal("login-1", SECRET)).await.unwrap();
    assert!(matches!(
        sealed,
        Submission::Completed(OperationOutcome::Sealed { .. })
    ));
}

#[tokio::test]
async fn backup_without_key_block_fails_before_any_change() {
    let h = harness();
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();
    let before = h.store.get(WRAPPED_KEY_STORE_KEY).unwrap();

    let err = h
        .flow
        .unlock_with_backup(PASSPHRASE, "this file has no key in it")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidKeyFormat(_)));
    assert_eq!(h.store.get(WRAPPED_KEY_STORE_KEY).unwrap(), before);
}

#[tokio::test]
async fn backup_import_derives_missing_public_key() {
    let pair = keypair();
    let h = harness();
    h.flow
        .custody()
        .wrap_and_store(&pair.private_key, &pair.public_key, PASSPHRASE)
        .unwrap();
    let backup = h.flow.export_backup(PASSPHRASE).unwrap();
    h.flow.remove_keys().await.unwrap();
    assert_eq!(h.flow.state().unwrap(), FlowState::NoKeyConfigured);

    h.flow.unlock_with_backup(PASSPHRASE, &backup).await.unwrap();
    let public_key = h.flow.custody().public_key().unwrap().unwrap();
    let ciphertext = encrypt(SECRET, &public_key).unwrap();
    let handle = h.flow.session().current().unwrap();
    assert_eq!(decrypt(&ciphertext, Some(&handle)).unwrap(), SECRET);
}

#[tokio::test]
async fn corrupt_record_reports_on_unlock_and_backup_replaces_it() {
    let pair = keypair();
    let h = harness();
    h.flow
        .custody()
        .wrap_and_store(&pair.private_key, &pair.public_key, PASSPHRASE)
        .unwrap();
    let backup = h.flow.export_backup(PASSPHRASE).unwrap();

    h.store.put(WRAPPED_KEY_STORE_KEY, b"not json at all").unwrap();
    assert_eq!(
        h.flow.state().unwrap(),
        FlowState::KeyConfiguredLocked {
            private_key_present: true
        }
    );
    let err = h.flow.unlock(PASSPHRASE).await.unwrap_err();
    assert!(matches!(err, VaultError::CorruptKey(_)));

    h.flow.unlock_with_backup(PASSPHRASE, &backup).await.unwrap();
    assert_eq!(h.flow.state().unwrap(), FlowState::Unlocked);
}

#[tokio::test]
async fn change_passphrase_stays_unlocked() {
    let h = harness();
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();
    h.flow
        .change_passphrase(PASSPHRASE, "brand-new-passphrase")
        .await
        .unwrap();
    assert_eq!(h.flow.state().unwrap(), FlowState::Unlocked);

    h.flow.lock();
    assert!(h.flow.unlock(PASSPHRASE).await.is_err());
    h.flow.unlock("brand-new-passphrase").await.unwrap();
}

#[tokio::test]
async fn refresh_state_tolerates_bad_directory_key() {
    let directory = Arc::new(MemoryDirectory::with_public_key("not really a key"));
    let h = harness_with(VaultConfig::for_tests(), directory);
    assert_eq!(h.flow.refresh_state().await.unwrap(), FlowState::NoKeyConfigured);
}

// ── Pending operations ───────────────────────────────────────────

#[tokio::test]
async fn queued_operations_resume_in_order_after_unlock() {
    let h = harness();
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();
    let public_key = h.flow.custody().public_key().unwrap().unwrap();
    let first = encrypt("first", &public_key).unwrap();
    let second = encrypt("second", &public_key).unwrap();
    h.flow.lock();

    let queued = [
        h.flow.submit(reveal("a", &first)).await.unwrap(),
        h.flow
            .submit(PendingOperation::Copy {
                field_id: "b".into(),
                ciphertext: second.clone(),
            })
            .await
            .unwrap(),
        h.flow.submit(seal("c", "fresh secret")).await.unwrap(),
    ];
    for (i, submission) in queued.iter().enumerate() {
        assert!(matches!(submission, Submission::Queued { position } if *position == i + 1));
    }
    assert_eq!(h.flow.pending_len().await, 3);

    let outcomes = h.flow.unlock(PASSPHRASE).await.unwrap();
    let ids: Vec<&str> = outcomes.iter().map(OperationOutcome::field_id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    match &outcomes[0] {
        OperationOutcome::Revealed { plaintext, .. } => assert_eq!(plaintext.as_str(), "first"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(outcomes[1], OperationOutcome::Copied { .. }));
    assert_eq!(*h.clipboard.copied.lock().unwrap(), vec!["second".to_string()]);
    match &outcomes[2] {
        OperationOutcome::Sealed { ciphertext, .. } => {
            let handle = h.flow.session().current().unwrap();
            assert_eq!(decrypt(ciphertext, Some(&handle)).unwrap(), "fresh secret");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.flow.pending_len().await, 0);
}

#[tokio::test]
async fn unlocked_submissions_complete_immediately() {
    let h = harness();
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();

    let submission = h.flow.submit(reveal("legacy", "hunter2")).await.unwrap();
    match submission {
        Submission::Completed(OperationOutcome::Revealed { plaintext, .. }) => {
            assert_eq!(plaintext.as_str(), "hunter2")
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn ungated_seal_uses_public_key_alone() {
    let config = VaultConfig {
        gate_seal_on_unlock: false,
        ..VaultConfig::for_tests()
    };
    let h = harness_with(config, Arc::new(MemoryDirectory::new()));
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();
    h.flow.lock();

    let submission = h.flow.submit(seal("x", SECRET)).await.unwrap();
    let ciphertext = match submission {
        Submission::Completed(OperationOutcome::Sealed { ciphertext, .. }) => ciphertext,
        other => panic!("unexpected {other:?}"),
    };

    let outcomes = h.flow.unlock(PASSPHRASE).await.unwrap();
    assert!(outcomes.is_empty());
    let handle = h.flow.session().current().unwrap();
    assert_eq!(decrypt(&ciphertext, Some(&handle)).unwrap(), SECRET);
}

#[tokio::test]
async fn logout_discards_queue_but_lock_keeps_it() {
    let h = harness();
    h.flow.generate("Ada", "", PASSPHRASE, false).await.unwrap();
    h.flow.lock();

    h.flow.submit(reveal("a", "hunter2")).await.unwrap();
    h.flow.lock();
    assert_eq!(h.flow.pending_len().await, 1);

    h.flow.logout().await;
    assert_eq!(h.flow.pending_len().await, 0);
    assert!(h.flow.unlock(PASSPHRASE).await.unwrap().is_empty());
}
