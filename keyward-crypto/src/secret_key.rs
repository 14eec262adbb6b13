//! Certificate parsing and the inner secret-key lock.
//!
//! OpenPGP secret key packets can carry their own passphrase protection,
//! independent of the wrap layer in [`crate::passphrase`]. Keys exported
//! for backup are locked this way; keys held by an unlocked session are not.

use crate::error::{CryptoError, CryptoResult};
use anyhow::Context;
use sequoia_openpgp as openpgp;
use openpgp::crypto::Password;
use openpgp::packet::key::{SecretParts, UnspecifiedRole};
use openpgp::packet::Key;
use openpgp::parse::Parse;
use openpgp::{Cert, Fingerprint};
use tracing::debug;

/// Parses an armored (or binary) certificate and keeps only its public parts.
pub fn parse_public_key(text: &str) -> CryptoResult<Cert> {
    let cert = Cert::from_bytes(text.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(format!("public key does not parse: {e}")))?;
    Ok(cert.strip_secret_key_material())
}

/// Parses an armored certificate that must carry secret key material.
pub fn parse_private_key(text: &str) -> CryptoResult<Cert> {
    let cert = Cert::from_bytes(text.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(format!("private key does not parse: {e}")))?;
    if !cert.is_tsk() {
        return Err(CryptoError::InvalidKey(
            "certificate carries no secret key material".into(),
        ));
    }
    Ok(cert)
}

/// Hex fingerprint of the primary key.
pub fn fingerprint(cert: &Cert) -> String {
    cert.fingerprint().to_hex()
}

/// Whether any secret key packet is still passphrase-locked.
pub fn has_locked_secrets(cert: &Cert) -> bool {
    cert.keys()
        .secret()
        .any(|ka| ka.key().secret().is_encrypted())
}

/// Decrypts every passphrase-locked secret key packet.
///
/// Packets that are already unencrypted are left alone. Any packet that
/// refuses the passphrase fails the whole operation with
/// [`CryptoError::WrongPassphrase`].
pub fn unlock_secret_material(cert: Cert, passphrase: &Password) -> CryptoResult<Cert> {
    if !has_locked_secrets(&cert) {
        return Ok(cert);
    }

    let primary_fpr = cert.fingerprint();
    let mut out = cert.clone();
    for ka in cert.keys().secret() {
        let key = ka.key();
        if !key.secret().is_encrypted() {
            continue;
        }

        let decrypted = key
            .clone()
            .decrypt_secret(passphrase)
            .map_err(|_| CryptoError::WrongPassphrase)?;
        debug!(key = %decrypted.fingerprint().to_hex(), "unlocked secret key packet");

        out = replace_key(out, decrypted, &primary_fpr)
            .map_err(|e| CryptoError::InvalidKey(format!("{e:#}")))?;
    }

    if has_locked_secrets(&out) {
        return Err(CryptoError::InvalidKey(
            "secret key material is still locked after decryption".into(),
        ));
    }
    Ok(out)
}

/// Locks every unencrypted secret key packet with `passphrase`.
pub fn lock_secret_material(cert: Cert, passphrase: &Password) -> CryptoResult<Cert> {
    let primary_fpr = cert.fingerprint();
    let mut out = cert.clone();
    for ka in cert.keys().secret() {
        let key = ka.key();
        if key.secret().is_encrypted() {
            continue;
        }

        let encrypted = key
            .clone()
            .encrypt_secret(passphrase)
            .map_err(|e| CryptoError::Encryption(format!("secret key encryption failed: {e}")))?;

        out = replace_key(out, encrypted, &primary_fpr)
            .map_err(|e| CryptoError::InvalidKey(format!("{e:#}")))?;
    }

    if out.keys().unencrypted_secret().count() != 0 {
        return Err(CryptoError::Encryption(
            "failed to lock all secret key material".into(),
        ));
    }
    Ok(out)
}

/// Swaps `key` into `cert` in the primary or subkey slot it came from.
fn replace_key(
    cert: Cert,
    key: Key<SecretParts, UnspecifiedRole>,
    primary: &Fingerprint,
) -> anyhow::Result<Cert> {
    let (cert, _) = if key.fingerprint() == *primary {
        cert.insert_packets(key.role_into_primary())
    } else {
        cert.insert_packets(key.role_into_subordinate())
    }
    .context("certificate update failed")?;
    Ok(cert)
}
