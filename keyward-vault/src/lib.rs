//! End-to-end key custody for the Keyward password vault.
//!
//! The server never sees plaintext secrets or private keys. This crate is
//! the client side of that promise:
//!
//! - [`KeyCustody`] generates keypairs and keeps the private half wrapped
//!   under the master passphrase in an untrusted local store
//! - [`UnlockSession`] holds the one in-memory [`UnlockedKeyHandle`]
//! - [`field`] seals and opens individual vault fields
//! - [`UnlockFlow`] drives the UI-facing state machine, backup restore and
//!   the queue of operations waiting for unlock
//!
//! A stored key can only become usable by going through
//! [`UnlockSession::unlock`]: [`LockedWrappedKey`] and [`UnlockedKeyHandle`]
//! are distinct types, and the handle is never serialized.

mod config;
mod custody;
mod directory;
mod error;
pub mod field;
mod flow;
mod handle;
mod record;
mod session;

pub use config::VaultConfig;
pub use custody::KeyCustody;
pub use directory::{MemoryDirectory, PublicKeyDirectory};
pub use error::{VaultError, VaultResult};
pub use field::EncryptedField;
pub use flow::{
    ClipboardSink, FlowState, OperationOutcome, PendingOperation, Submission, UnlockFlow,
};
pub use handle::{LockedWrappedKey, UnlockedKeyHandle};
pub use record::{WrappedPrivateKey, WRAPPED_KEY_STORE_KEY};
pub use session::UnlockSession;

pub use keyward_crypto::{DecryptFailure, KeyAlgorithm, KeyPair};

use keyward_storage::KeyValueStore;
use std::sync::Arc;

/// Wires a store, a directory and a config into a ready [`UnlockFlow`]
/// with a fresh, locked session.
pub fn open_flow(
    store: Arc<dyn KeyValueStore>,
    directory: Arc<dyn PublicKeyDirectory>,
    config: VaultConfig,
) -> UnlockFlow {
    let custody = KeyCustody::new(store, UnlockSession::new(), config);
    UnlockFlow::new(custody, directory)
}
