//! Shared fixtures for vault integration tests.

#![allow(dead_code)]

use keyward_crypto::{generate_key_pair, KeyAlgorithm, KeyPair};
use keyward_storage::{KeyValueStore, MemoryStore};
use keyward_vault::{
    open_flow, ClipboardSink, KeyCustody, MemoryDirectory, UnlockFlow, UnlockSession,
    VaultConfig, VaultResult,
};
use std::sync::{Arc, Mutex};

pub const PASSPHRASE: &str = "correct-horse-battery";
pub const SECRET: &str = "p@ssw0rd!";

pub fn keypair() -> KeyPair {
    generate_key_pair("Ada", "ada@example.com", KeyAlgorithm::Cv25519).unwrap()
}

pub fn custody() -> KeyCustody {
    custody_on(Arc::new(MemoryStore::new()))
}

pub fn custody_on(store: Arc<dyn KeyValueStore>) -> KeyCustody {
    KeyCustody::new(store, UnlockSession::new(), VaultConfig::for_tests())
}

pub struct Harness {
    pub flow: UnlockFlow,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<MemoryDirectory>,
    pub clipboard: Arc<RecordingClipboard>,
}

pub fn harness() -> Harness {
    harness_with(VaultConfig::for_tests(), Arc::new(MemoryDirectory::new()))
}

pub fn harness_with(config: VaultConfig, directory: Arc<MemoryDirectory>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clipboard = Arc::new(RecordingClipboard::default());
    let flow = open_flow(store.clone(), directory.clone(), config)
        .with_clipboard(clipboard.clone());
    Harness {
        flow,
        store,
        directory,
        clipboard,
    }
}

#[derive(Default)]
pub struct RecordingClipboard {
    pub copied: Mutex<Vec<String>>,
}

impl ClipboardSink for RecordingClipboard {
    fn copy(&self, text: &str) -> VaultResult<()> {
        self.copied.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
