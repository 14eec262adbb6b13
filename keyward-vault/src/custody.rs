//! Key custody: the generate / wrap / store / unwrap lifecycle.
//!
//! All reads and writes of the wrapped-key record go through
//! [`KeyCustody`]. Every write or delete of the record clears the shared
//! [`UnlockSession`], so a handle never outlives the record it came from.

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::handle::{LockedWrappedKey, UnlockedKeyHandle};
use crate::record::{WrappedPrivateKey, WRAPPED_KEY_STORE_KEY};
use crate::session::UnlockSession;
use keyward_crypto::{
    armor_private_key, extract_private_key_block, has_locked_secrets, is_valid_public_key_armor,
    lock_secret_material, parse_private_key, unlock_secret_material, unwrap_private_key,
    wrap_private_key, Cert, KeyPair, Password,
};
use keyward_storage::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

#[derive(Clone)]
pub struct KeyCustody {
    store: Arc<dyn KeyValueStore>,
    session: UnlockSession,
    config: VaultConfig,
}

impl KeyCustody {
    pub fn new(store: Arc<dyn KeyValueStore>, session: UnlockSession, config: VaultConfig) -> Self {
        Self {
            store,
            session,
            config,
        }
    }

    pub fn session(&self) -> &UnlockSession {
        &self.session
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Generates a fresh keypair. Nothing is stored.
    ///
    /// The passphrase is only checked against the length policy here; it is
    /// never mixed into the asymmetric key.
    pub fn generate_key_pair(
        &self,
        identity_name: &str,
        identity_email: &str,
        passphrase: &str,
    ) -> VaultResult<KeyPair> {
        if identity_name.trim().is_empty() && identity_email.trim().is_empty() {
            return Err(VaultError::InvalidIdentity);
        }
        self.check_passphrase(passphrase)?;

        let pair = keyward_crypto::generate_key_pair(
            identity_name,
            identity_email,
            self.config.key_algorithm,
        )?;
        Ok(pair)
    }

    /// Wraps `private_key_armored` under `passphrase` and replaces the
    /// stored record with it and `public_key_armored`.
    pub fn wrap_and_store(
        &self,
        private_key_armored: &str,
        public_key_armored: &str,
        passphrase: &str,
    ) -> VaultResult<()> {
        self.check_passphrase(passphrase)?;
        let block = private_key_block(private_key_armored)?;
        if !is_valid_public_key_armor(public_key_armored) {
            return Err(VaultError::InvalidKeyFormat(
                "public key armor is missing or does not parse".into(),
            ));
        }

        let encrypted = wrap_private_key(block, &Password::from(passphrase))?;
        self.save(&WrappedPrivateKey {
            public_key: Some(public_key_armored.to_string()),
            encrypted_private_key: Some(encrypted),
        })?;
        info!("stored wrapped keypair");
        Ok(())
    }

    /// Stores a private key restored from a backup.
    ///
    /// `private_key_armored` may carry surrounding text; only the private
    /// key block is kept. A previously known public key is preserved. The
    /// passphrase is not checked against the key here; call
    /// [`unlock`](Self::unlock) to verify.
    pub fn import_private_key_only(
        &self,
        private_key_armored: &str,
        passphrase: &str,
    ) -> VaultResult<()> {
        let block = private_key_block(private_key_armored)?;

        let public_key = match self.load_wrapped() {
            Ok(existing) => existing.and_then(|r| r.public_key),
            Err(VaultError::CorruptKey(e)) => {
                warn!(error = %e, "replacing unreadable record with imported key");
                None
            }
            Err(e) => return Err(e),
        };

        let encrypted = wrap_private_key(block, &Password::from(passphrase))?;
        self.save(&WrappedPrivateKey {
            public_key,
            encrypted_private_key: Some(encrypted),
        })?;
        info!("imported private key from backup");
        Ok(())
    }

    /// Caches a public key (typically fetched from the server), keeping any
    /// wrapped private key already stored.
    pub fn store_public_key(&self, public_key_armored: &str) -> VaultResult<()> {
        if !is_valid_public_key_armor(public_key_armored) {
            return Err(VaultError::InvalidKeyFormat(
                "public key armor is missing or does not parse".into(),
            ));
        }
        let mut record = self.load_wrapped()?.unwrap_or_default();
        record.public_key = Some(public_key_armored.to_string());
        self.save(&record)?;
        debug!("cached public key");
        Ok(())
    }

    /// Reads the stored record. `None` when nothing was ever stored.
    pub fn load_wrapped(&self) -> VaultResult<Option<WrappedPrivateKey>> {
        match self.store.get(WRAPPED_KEY_STORE_KEY)? {
            Some(bytes) => WrappedPrivateKey::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Puts back a record exactly as it was, or removes the record when
    /// `previous` is `None`.
    pub(crate) fn restore(&self, previous: Option<Vec<u8>>) -> VaultResult<()> {
        match previous {
            Some(bytes) => self.store.put(WRAPPED_KEY_STORE_KEY, &bytes)?,
            None => self.store.delete(WRAPPED_KEY_STORE_KEY)?,
        }
        self.session.clear();
        Ok(())
    }

    /// Raw bytes of the stored record, for [`restore`](Self::restore).
    pub(crate) fn snapshot(&self) -> VaultResult<Option<Vec<u8>>> {
        Ok(self.store.get(WRAPPED_KEY_STORE_KEY)?)
    }

    pub fn remove_keys(&self) -> VaultResult<()> {
        self.store.delete(WRAPPED_KEY_STORE_KEY)?;
        self.session.clear();
        info!("removed stored keys");
        Ok(())
    }

    pub fn has_private_key(&self) -> VaultResult<bool> {
        Ok(self
            .load_wrapped()?
            .is_some_and(|record| record.has_private_key()))
    }

    pub fn has_public_key(&self) -> VaultResult<bool> {
        Ok(self
            .load_wrapped()?
            .is_some_and(|record| record.has_public_key()))
    }

    /// The stored public key, if any.
    pub fn public_key(&self) -> VaultResult<Option<String>> {
        Ok(self
            .load_wrapped()?
            .filter(WrappedPrivateKey::has_public_key)
            .and_then(|record| record.public_key))
    }

    /// Unwraps the stored private key into the session.
    pub fn unlock(&self, passphrase: &str) -> VaultResult<UnlockedKeyHandle> {
        let locked = self.locked_key().inspect_err(|_| self.session.clear())?;
        self.session.unlock(&locked, &Password::from(passphrase))
    }

    /// Re-wraps the stored private key under a new passphrase.
    ///
    /// The keypair itself is unchanged, so existing ciphertexts stay
    /// readable. Secret key packets that carried their own lock are
    /// re-locked under the new passphrase. Clears the session.
    pub fn change_passphrase(&self, old: &str, new: &str) -> VaultResult<()> {
        self.check_passphrase(new)?;
        let record = self.load_wrapped()?.ok_or(VaultError::NotConfigured)?;
        let old = Password::from(old);
        let new = Password::from(new);

        let (cert, inner_locked) = self.open_private_key(&old)?;
        let cert = if inner_locked {
            lock_secret_material(cert, &new)?
        } else {
            cert
        };
        let armored = armor_private_key(&cert)?;
        let encrypted = wrap_private_key(&armored, &new)?;

        self.save(&WrappedPrivateKey {
            public_key: record.public_key,
            encrypted_private_key: Some(encrypted),
        })?;
        info!(fingerprint = %cert.fingerprint().to_hex(), "master passphrase changed");
        Ok(())
    }

    /// Produces a backup: the private key with its secret packets locked
    /// under `passphrase`, armored. Importing the file elsewhere needs the
    /// same passphrase.
    pub fn export_private_key(&self, passphrase: &str) -> VaultResult<Zeroizing<String>> {
        let passphrase = Password::from(passphrase);
        let (cert, _) = self.open_private_key(&passphrase)?;
        let locked = lock_secret_material(cert, &passphrase)?;
        let armored = armor_private_key(&locked)?;
        info!(fingerprint = %locked.fingerprint().to_hex(), "exported private key backup");
        Ok(armored)
    }

    fn locked_key(&self) -> VaultResult<LockedWrappedKey> {
        let record = self.load_wrapped()?.ok_or(VaultError::NotConfigured)?;
        match record.encrypted_private_key {
            Some(encrypted) if !encrypted.trim().is_empty() => Ok(LockedWrappedKey::new(encrypted)),
            _ => Err(VaultError::NotConfigured),
        }
    }

    /// Peels both layers without touching the session. Also reports whether
    /// the inner layer was locked.
    fn open_private_key(&self, passphrase: &Password) -> VaultResult<(Cert, bool)> {
        let locked = self.locked_key()?;
        let armored = unwrap_private_key(locked.armored(), passphrase).inspect_err(|_| {
            warn!(layer = "wrap", "passphrase rejected");
        })?;
        let cert = parse_private_key(&armored)
            .map_err(|e| VaultError::CorruptKey(e.to_string()))?;
        let inner_locked = has_locked_secrets(&cert);
        let cert = unlock_secret_material(cert, passphrase).inspect_err(|_| {
            warn!(layer = "inner", "passphrase rejected");
        })?;
        Ok((cert, inner_locked))
    }

    fn check_passphrase(&self, passphrase: &str) -> VaultResult<()> {
        let min = self.config.min_passphrase_length;
        if passphrase.chars().count() < min {
            return Err(VaultError::PassphraseTooShort { min });
        }
        Ok(())
    }

    fn save(&self, record: &WrappedPrivateKey) -> VaultResult<()> {
        self.store.put(WRAPPED_KEY_STORE_KEY, &record.to_bytes()?)?;
        self.session.clear();
        Ok(())
    }
}

/// The private-key armor block inside `text`, checked to parse.
fn private_key_block(text: &str) -> VaultResult<&str> {
    let block = extract_private_key_block(text).ok_or_else(|| {
        VaultError::InvalidKeyFormat("no private key block found".into())
    })?;
    parse_private_key(block)?;
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_storage::MemoryStore;

    fn custody() -> KeyCustody {
        KeyCustody::new(
            Arc::new(MemoryStore::new()),
            UnlockSession::new(),
            VaultConfig::for_tests(),
        )
    }

    #[test]
    fn identity_and_passphrase_are_checked_before_keygen() {
        let c = custody();
        assert!(matches!(
            c.generate_key_pair(" ", "", "correct-horse-battery"),
            Err(VaultError::InvalidIdentity)
        ));
        assert!(matches!(
            c.generate_key_pair("Ada", "", "short"),
            Err(VaultError::PassphraseTooShort { min: 8 })
        ));
    }

    #[test]
    fn unlock_without_record_is_not_configured() {
        assert!(matches!(
            custody().unlock("correct-horse-battery"),
            Err(VaultError::NotConfigured)
        ));
    }

    #[test]
    fn import_requires_private_key_block() {
        let err = custody()
            .import_private_key_only("just some notes", "correct-horse-battery")
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidKeyFormat(_)));
    }
}
