//! The unlock flow: what the UI drives.
//!
//! [`UnlockFlow`] ties the custody service, the session and the server
//! directory together and owns the queue of operations that were requested
//! while the vault was locked.
//!
//! # States
//!
//! ```text
//! NoKeyConfigured ──generate──────────────▶ Unlocked
//! NoKeyConfigured ──refresh (server key)──▶ KeyConfiguredLocked { private_key_present: false }
//! KeyConfiguredLocked ──unlock────────────▶ Unlocked
//! KeyConfiguredLocked ──unlock_with_backup▶ Unlocked
//! Unlocked ──lock / logout────────────────▶ KeyConfiguredLocked
//! any ──remove_keys───────────────────────▶ NoKeyConfigured
//! ```
//!
//! Failed transitions leave the state where it was.

use crate::custody::KeyCustody;
use crate::directory::PublicKeyDirectory;
use crate::error::{VaultError, VaultResult};
use crate::field;
use crate::handle::UnlockedKeyHandle;
use crate::session::UnlockSession;
use keyward_crypto::{
    armor_public_key, extract_private_key_block, fingerprint, parse_private_key, parse_public_key,
};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Where the flow currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    NoKeyConfigured,
    /// A key exists for this account. Without a private half on this
    /// device, only a backup import can unlock.
    KeyConfiguredLocked { private_key_present: bool },
    Unlocked,
}

/// An operation that needs the unlocked key.
pub enum PendingOperation {
    /// Decrypt for display or editing.
    Reveal { field_id: String, ciphertext: String },
    /// Decrypt straight to the clipboard.
    Copy { field_id: String, ciphertext: String },
    /// Encrypt a new or edited secret.
    Seal {
        field_id: String,
        plaintext: Zeroizing<String>,
    },
}

impl PendingOperation {
    pub fn field_id(&self) -> &str {
        match self {
            PendingOperation::Reveal { field_id, .. }
            | PendingOperation::Copy { field_id, .. }
            | PendingOperation::Seal { field_id, .. } => field_id,
        }
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            PendingOperation::Reveal { .. } => "Reveal",
            PendingOperation::Copy { .. } => "Copy",
            PendingOperation::Seal { .. } => "Seal",
        };
        f.debug_struct(kind)
            .field("field_id", &self.field_id())
            .finish_non_exhaustive()
    }
}

/// Result of running one [`PendingOperation`].
pub enum OperationOutcome {
    Revealed {
        field_id: String,
        plaintext: Zeroizing<String>,
    },
    /// The plaintext went to the clipboard and is not retained.
    Copied { field_id: String },
    Sealed { field_id: String, ciphertext: String },
    Failed { field_id: String, error: VaultError },
}

impl OperationOutcome {
    pub fn field_id(&self) -> &str {
        match self {
            OperationOutcome::Revealed { field_id, .. }
            | OperationOutcome::Copied { field_id }
            | OperationOutcome::Sealed { field_id, .. }
            | OperationOutcome::Failed { field_id, .. } => field_id,
        }
    }
}

impl fmt::Debug for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationOutcome::Revealed { field_id, .. } => f
                .debug_struct("Revealed")
                .field("field_id", field_id)
                .field("plaintext", &"<redacted>")
                .finish(),
            OperationOutcome::Copied { field_id } => {
                f.debug_struct("Copied").field("field_id", field_id).finish()
            }
            OperationOutcome::Sealed { field_id, .. } => f
                .debug_struct("Sealed")
                .field("field_id", field_id)
                .finish_non_exhaustive(),
            OperationOutcome::Failed { field_id, error } => f
                .debug_struct("Failed")
                .field("field_id", field_id)
                .field("error", error)
                .finish(),
        }
    }
}

/// What [`UnlockFlow::submit`] did with an operation.
#[derive(Debug)]
pub enum Submission {
    Completed(OperationOutcome),
    /// Waiting for unlock; `position` is 1-based.
    Queued { position: usize },
}

/// Destination for [`PendingOperation::Copy`].
pub trait ClipboardSink: Send + Sync {
    fn copy(&self, text: &str) -> VaultResult<()>;
}

pub struct UnlockFlow {
    custody: KeyCustody,
    directory: Arc<dyn PublicKeyDirectory>,
    clipboard: Option<Arc<dyn ClipboardSink>>,
    pending: Mutex<VecDeque<PendingOperation>>,
    /// Serializes generate / unlock / import / remove.
    transitions: Mutex<()>,
}

impl UnlockFlow {
    pub fn new(custody: KeyCustody, directory: Arc<dyn PublicKeyDirectory>) -> Self {
        Self {
            custody,
            directory,
            clipboard: None,
            pending: Mutex::new(VecDeque::new()),
            transitions: Mutex::new(()),
        }
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn ClipboardSink>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn custody(&self) -> &KeyCustody {
        &self.custody
    }

    pub fn session(&self) -> &UnlockSession {
        self.custody.session()
    }

    /// Current state, from local information only.
    pub fn state(&self) -> VaultResult<FlowState> {
        if self.session().is_unlocked() {
            return Ok(FlowState::Unlocked);
        }
        match self.custody.load_wrapped() {
            Ok(None) => Ok(FlowState::NoKeyConfigured),
            Ok(Some(record)) if !record.has_private_key() && !record.has_public_key() => {
                Ok(FlowState::NoKeyConfigured)
            }
            Ok(Some(record)) => Ok(FlowState::KeyConfiguredLocked {
                private_key_present: record.has_private_key(),
            }),
            // Unlock reports the corruption; a backup import replaces it.
            Err(VaultError::CorruptKey(_)) => Ok(FlowState::KeyConfiguredLocked {
                private_key_present: true,
            }),
            Err(e) => Err(e),
        }
    }

    /// Like [`state`](Self::state), but when nothing is stored locally asks
    /// the directory whether the account already has a key.
    ///
    /// An unreachable directory is not an error; the local state is
    /// returned.
    pub async fn refresh_state(&self) -> VaultResult<FlowState> {
        let state = self.state()?;
        if state != FlowState::NoKeyConfigured {
            return Ok(state);
        }

        match self.directory.fetch_public_key().await {
            Ok(Some(public_key)) => match self.custody.store_public_key(&public_key) {
                Ok(()) => info!("found published public key; private key import required"),
                Err(e) => warn!(error = %e, "ignoring unusable public key from directory"),
            },
            Ok(None) => debug!("no public key published for this account"),
            Err(e) => warn!(error = %e, "key directory unreachable"),
        }
        self.state()
    }

    /// Creates a keypair, stores it wrapped, publishes the public half and
    /// unlocks.
    ///
    /// Refuses to replace an existing private key unless `allow_overwrite`
    /// is set. Returns the outcomes of any operations that were waiting
    /// for unlock.
    pub async fn generate(
        &self,
        identity_name: &str,
        identity_email: &str,
        passphrase: &str,
        allow_overwrite: bool,
    ) -> VaultResult<Vec<OperationOutcome>> {
        let _transition = self.transitions.lock().await;

        // A cached server key counts: replacing it would orphan every other
        // device's ciphertexts. A corrupt record reads as locked here.
        if self.state()? != FlowState::NoKeyConfigured {
            if !allow_overwrite {
                return Err(VaultError::KeyAlreadyConfigured);
            }
            warn!("overwriting existing private key; data sealed to it becomes unreadable");
        }

        let custody = self.custody.clone();
        let name = identity_name.to_string();
        let email = identity_email.to_string();
        let secret = Zeroizing::new(passphrase.to_string());
        let pair = tokio::task::spawn_blocking(move || {
            custody.generate_key_pair(&name, &email, &secret)
        })
        .await
        .map_err(|e| VaultError::KeyGeneration(format!("keygen task failed: {e}")))??;

        self.custody
            .wrap_and_store(&pair.private_key, &pair.public_key, passphrase)?;
        if let Err(e) = self.directory.publish_public_key(&pair.public_key).await {
            warn!(error = %e, "public key not published; other devices cannot find it yet");
        }

        self.custody.unlock(passphrase)?;
        Ok(self.drain_pending().await)
    }

    /// Unlocks with the stored wrapped key.
    pub async fn unlock(&self, passphrase: &str) -> VaultResult<Vec<OperationOutcome>> {
        let _transition = self.transitions.lock().await;
        self.custody.unlock(passphrase)?;
        Ok(self.drain_pending().await)
    }

    /// Imports the private key found in `file_text` and unlocks with it.
    ///
    /// The file may contain other text around the key block. If the
    /// imported key does not unlock with `passphrase`, or is not the private
    /// half of the public key already known for the account, the previous
    /// record is put back (or removed, if there was none) and the error
    /// returned.
    pub async fn unlock_with_backup(
        &self,
        passphrase: &str,
        file_text: &str,
    ) -> VaultResult<Vec<OperationOutcome>> {
        let _transition = self.transitions.lock().await;

        let block = extract_private_key_block(file_text).ok_or_else(|| {
            VaultError::InvalidKeyFormat("no private key block found in file".into())
        })?;
        let previous = self.custody.snapshot()?;

        self.custody.import_private_key_only(block, passphrase)?;
        if let Err(e) = self.fill_public_key_from(block) {
            warn!(error = %e, "could not derive public key from backup");
        }

        let verified = self.custody.unlock(passphrase).and_then(|handle| {
            self.ensure_matches_public_key(&handle)?;
            Ok(handle)
        });
        match verified {
            Ok(handle) => {
                info!(fingerprint = %handle.fingerprint(), "restored key from backup");
                Ok(self.drain_pending().await)
            }
            Err(e) => {
                warn!(error = %e, "backup rejected; restoring previous record");
                self.custody.restore(previous)?;
                Err(e)
            }
        }
    }

    /// Clears the session. Queued operations stay queued.
    pub fn lock(&self) {
        self.session().clear();
    }

    /// Clears the session and drops anything waiting for unlock.
    pub async fn logout(&self) {
        self.session().clear();
        let dropped = {
            let mut pending = self.pending.lock().await;
            let n = pending.len();
            pending.clear();
            n
        };
        if dropped > 0 {
            debug!(dropped, "discarded pending operations on logout");
        }
    }

    pub async fn remove_keys(&self) -> VaultResult<()> {
        let _transition = self.transitions.lock().await;
        self.custody.remove_keys()?;
        self.pending.lock().await.clear();
        Ok(())
    }

    /// Re-wraps the key under `new` and leaves the session unlocked with it.
    pub async fn change_passphrase(
        &self,
        old: &str,
        new: &str,
    ) -> VaultResult<Vec<OperationOutcome>> {
        let _transition = self.transitions.lock().await;
        self.custody.change_passphrase(old, new)?;
        self.custody.unlock(new)?;
        Ok(self.drain_pending().await)
    }

    /// Backup file body for the stored private key.
    pub fn export_backup(&self, passphrase: &str) -> VaultResult<Zeroizing<String>> {
        self.custody.export_private_key(passphrase)
    }

    /// Runs `op` now if possible, otherwise queues it until the next unlock.
    pub async fn submit(&self, op: PendingOperation) -> VaultResult<Submission> {
        if let Some(handle) = self.session().current() {
            return Ok(Submission::Completed(self.run(op, Some(&handle))));
        }

        if matches!(op, PendingOperation::Seal { .. })
            && !self.custody.config().gate_seal_on_unlock
        {
            return Ok(Submission::Completed(self.run(op, None)));
        }

        let mut pending = self.pending.lock().await;
        debug!(field_id = op.field_id(), "queued until unlock");
        pending.push_back(op);
        Ok(Submission::Queued {
            position: pending.len(),
        })
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn drain_pending(&self) -> Vec<OperationOutcome> {
        let queued: Vec<PendingOperation> = self.pending.lock().await.drain(..).collect();
        if queued.is_empty() {
            return Vec::new();
        }

        let handle = self.session().current();
        debug!(count = queued.len(), "resuming pending operations");
        queued
            .into_iter()
            .map(|op| self.run(op, handle.as_ref()))
            .collect()
    }

    fn run(&self, op: PendingOperation, handle: Option<&UnlockedKeyHandle>) -> OperationOutcome {
        match op {
            PendingOperation::Reveal {
                field_id,
                ciphertext,
            } => match field::decrypt(&ciphertext, handle) {
                Ok(plaintext) => OperationOutcome::Revealed {
                    field_id,
                    plaintext: Zeroizing::new(plaintext),
                },
                Err(error) => OperationOutcome::Failed { field_id, error },
            },
            PendingOperation::Copy {
                field_id,
                ciphertext,
            } => match self.copy_to_clipboard(&ciphertext, handle) {
                Ok(()) => OperationOutcome::Copied { field_id },
                Err(error) => OperationOutcome::Failed { field_id, error },
            },
            PendingOperation::Seal {
                field_id,
                plaintext,
            } => match self.seal(&plaintext, handle) {
                Ok(ciphertext) => OperationOutcome::Sealed {
                    field_id,
                    ciphertext,
                },
                Err(error) => OperationOutcome::Failed { field_id, error },
            },
        }
    }

    fn copy_to_clipboard(
        &self,
        ciphertext: &str,
        handle: Option<&UnlockedKeyHandle>,
    ) -> VaultResult<()> {
        let clipboard = self
            .clipboard
            .as_ref()
            .ok_or_else(|| VaultError::Clipboard("no clipboard attached".into()))?;
        let plaintext = Zeroizing::new(field::decrypt(ciphertext, handle)?);
        clipboard.copy(&plaintext)
    }

    fn seal(&self, plaintext: &str, handle: Option<&UnlockedKeyHandle>) -> VaultResult<String> {
        let public_key = self
            .custody
            .public_key()?
            .ok_or_else(|| VaultError::Encryption("no public key configured".into()))?;
        field::encrypt_verified(plaintext, &public_key, handle)
    }

    /// Stores the public half of `private_block` when no public key is known.
    /// The unlocked key must be the private half of the cached public key.
    fn ensure_matches_public_key(&self, handle: &UnlockedKeyHandle) -> VaultResult<()> {
        let Some(public_key) = self.custody.public_key()? else {
            return Ok(());
        };
        let expected = fingerprint(&parse_public_key(&public_key)?);
        if expected == handle.fingerprint() {
            return Ok(());
        }
        warn!(
            expected = %expected,
            imported = %handle.fingerprint(),
            "backup belongs to a different keypair"
        );
        Err(VaultError::InvalidKeyFormat(
            "backup key does not match this account's public key".into(),
        ))
    }

    fn fill_public_key_from(&self, private_block: &str) -> VaultResult<()> {
        if self.custody.has_public_key()? {
            return Ok(());
        }
        let cert = parse_private_key(private_block)?;
        self.custody.store_public_key(&armor_public_key(&cert)?)
    }
}
