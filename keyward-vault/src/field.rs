//! Sealing and opening of individual vault fields.
//!
//! Fields are opaque strings to the rest of the system. A field holding an
//! armored OpenPGP message is encrypted; anything else is legacy plaintext
//! and passes through [`decrypt`] unchanged.

use crate::error::{VaultError, VaultResult};
use crate::handle::UnlockedKeyHandle;
use keyward_crypto::{
    decrypt_message, encrypt_message, is_armored_message, parse_public_key, CryptoError,
    DecryptFailure,
};
use tracing::{debug, warn};

pub use keyward_crypto::{is_valid_private_key_armor, is_valid_public_key_armor};

/// A vault field as stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncryptedField {
    /// Written before encryption was enabled.
    Plaintext(String),
    Armored(String),
}

impl EncryptedField {
    pub fn as_str(&self) -> &str {
        match self {
            EncryptedField::Plaintext(s) | EncryptedField::Armored(s) => s,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, EncryptedField::Armored(_))
    }
}

/// Structural classification; never decrypts.
pub fn classify(text: &str) -> EncryptedField {
    if is_armored_message(text) {
        EncryptedField::Armored(text.to_string())
    } else {
        EncryptedField::Plaintext(text.to_string())
    }
}

/// Encrypts `plaintext` to `public_key_armored`.
pub fn encrypt(plaintext: &str, public_key_armored: &str) -> VaultResult<String> {
    if plaintext.is_empty() {
        return Err(VaultError::Encryption("plaintext is empty".into()));
    }
    if public_key_armored.trim().is_empty() {
        return Err(VaultError::Encryption("no public key configured".into()));
    }
    let recipient = parse_public_key(public_key_armored)
        .map_err(|e| VaultError::Encryption(format!("public key unusable: {e}")))?;

    Ok(encrypt_message(plaintext.as_bytes(), &recipient)?)
}

/// Encrypts, then proves the result opens with `handle` before returning it.
///
/// Without a handle this is plain [`encrypt`]. With one, a ciphertext that
/// does not decrypt back to `plaintext` is discarded and the call fails, so
/// a secret is never replaced by something that cannot be read back.
pub fn encrypt_verified(
    plaintext: &str,
    public_key_armored: &str,
    handle: Option<&UnlockedKeyHandle>,
) -> VaultResult<String> {
    let ciphertext = encrypt(plaintext, public_key_armored)?;
    let Some(handle) = handle else {
        return Ok(ciphertext);
    };

    match decrypt_message(&ciphertext, handle.cert()) {
        Ok(roundtrip) if roundtrip.as_slice() == plaintext.as_bytes() => {
            debug!("encryption self-test passed");
            Ok(ciphertext)
        }
        Ok(_) => {
            warn!("encryption self-test produced different plaintext");
            Err(VaultError::Encryption("self-test failed".into()))
        }
        Err(e) => {
            warn!(error = %e, "encryption self-test could not decrypt");
            Err(VaultError::Encryption("self-test failed".into()))
        }
    }
}

/// Opens a field.
///
/// Text without message armor is returned unchanged. Content that is not
/// UTF-8 fails with [`DecryptFailure::NotText`] rather than being altered.
pub fn decrypt(text: &str, handle: Option<&UnlockedKeyHandle>) -> VaultResult<String> {
    if !is_armored_message(text) {
        return Ok(text.to_string());
    }
    let handle = handle.ok_or(VaultError::Decryption(DecryptFailure::KeyLocked))?;

    match decrypt_message(text, handle.cert()) {
        Ok(plaintext) => std::str::from_utf8(&plaintext)
            .map(str::to_owned)
            .map_err(|_| VaultError::Decryption(DecryptFailure::NotText)),
        Err(CryptoError::Decryption(DecryptFailure::Malformed)) => Ok(text.to_string()),
        Err(e) => Err(e.into()),
    }
}
