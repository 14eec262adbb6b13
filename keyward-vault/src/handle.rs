//! Typestate for the private key: locked as stored, or unlocked in memory.

use keyward_crypto::{fingerprint, has_locked_secrets, Cert};
use std::fmt;
use std::sync::Arc;

/// A wrapped private key exactly as loaded from the store.
///
/// The only thing to do with it is hand it to
/// [`UnlockSession::unlock`](crate::UnlockSession::unlock).
#[derive(Clone)]
pub struct LockedWrappedKey {
    armored: String,
}

impl LockedWrappedKey {
    pub fn new(armored: impl Into<String>) -> Self {
        Self {
            armored: armored.into(),
        }
    }

    pub(crate) fn armored(&self) -> &str {
        &self.armored
    }
}

impl fmt::Debug for LockedWrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedWrappedKey")
            .field("len", &self.armored.len())
            .finish()
    }
}

/// A private key whose secret material is decrypted and usable.
///
/// Lives only in memory. Clones share the same certificate; the secret
/// material is zeroized when the last clone is dropped.
#[derive(Clone)]
pub struct UnlockedKeyHandle {
    cert: Arc<Cert>,
}

impl UnlockedKeyHandle {
    pub(crate) fn new(cert: Cert) -> Self {
        Self {
            cert: Arc::new(cert),
        }
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.cert)
    }

    /// Whether the encryption keys can be used without another passphrase.
    pub fn is_usable(&self) -> bool {
        !has_locked_secrets(&self.cert)
    }

    pub(crate) fn cert(&self) -> &Cert {
        &self.cert
    }
}

impl fmt::Debug for UnlockedKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKeyHandle")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
