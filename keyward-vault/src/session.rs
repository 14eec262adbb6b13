//! The in-memory unlock session.

use crate::error::{VaultError, VaultResult};
use crate::handle::{LockedWrappedKey, UnlockedKeyHandle};
use keyward_crypto::{
    parse_private_key, unlock_secret_material, unwrap_private_key, CryptoError, Password,
};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Holds at most one unlocked private key.
///
/// Cloning yields another view of the same session, so the custody service
/// and the unlock flow observe the same lock state.
#[derive(Clone, Default)]
pub struct UnlockSession {
    current: Arc<RwLock<Option<UnlockedKeyHandle>>>,
}

impl UnlockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peels both passphrase layers and installs the result as the current
    /// handle, replacing any previous one.
    ///
    /// A failed attempt leaves the session locked, even if it was unlocked
    /// before.
    pub fn unlock(
        &self,
        wrapped: &LockedWrappedKey,
        passphrase: &Password,
    ) -> VaultResult<UnlockedKeyHandle> {
        match open_key(wrapped, passphrase) {
            Ok(handle) => {
                self.install(handle.clone());
                info!(fingerprint = %handle.fingerprint(), "session unlocked");
                Ok(handle)
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    pub fn current(&self) -> Option<UnlockedKeyHandle> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.current().is_some()
    }

    /// Drops the current handle, if any.
    pub fn clear(&self) {
        let previous = self.swap(None);
        if previous.is_some() {
            info!("session locked");
        }
    }

    fn install(&self, handle: UnlockedKeyHandle) {
        self.swap(Some(handle));
    }

    fn swap(&self, next: Option<UnlockedKeyHandle>) -> Option<UnlockedKeyHandle> {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}

fn open_key(wrapped: &LockedWrappedKey, passphrase: &Password) -> VaultResult<UnlockedKeyHandle> {
    let armored = unwrap_private_key(wrapped.armored(), passphrase).map_err(|e| {
        if matches!(e, CryptoError::WrongPassphrase) {
            warn!(layer = "wrap", "passphrase rejected");
        } else {
            warn!(layer = "wrap", error = %e, "wrapped key unreadable");
        }
        VaultError::from(e)
    })?;

    let cert = parse_private_key(&armored).map_err(|e| {
        warn!(layer = "wrap", error = %e, "unwrapped content is not a private key");
        VaultError::CorruptKey(e.to_string())
    })?;

    let cert = unlock_secret_material(cert, passphrase).map_err(|e| {
        warn!(layer = "inner", error = %e, "secret key packets refused passphrase");
        VaultError::from(e)
    })?;

    Ok(UnlockedKeyHandle::new(cert))
}
