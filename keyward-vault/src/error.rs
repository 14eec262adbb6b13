//! Error taxonomy for the custody layer and its user-facing translation.

use keyward_crypto::{CryptoError, DecryptFailure};
use keyward_storage::StorageError;
use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("wrong passphrase")]
    WrongPassphrase,

    /// The stored record or the wrapped key inside it cannot be read.
    #[error("stored key is corrupt: {0}")]
    CorruptKey(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(DecryptFailure),

    #[error("no key configured")]
    NotConfigured,

    #[error("passphrase too short (min {min} characters)")]
    PassphraseTooShort { min: usize },

    #[error("identity needs a name or an email")]
    InvalidIdentity,

    #[error("a key is already configured")]
    KeyAlreadyConfigured,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("key directory error: {0}")]
    Directory(String),

    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyGeneration(msg) => VaultError::KeyGeneration(msg),
            CryptoError::InvalidKey(msg) | CryptoError::Armor(msg) => {
                VaultError::InvalidKeyFormat(msg)
            }
            CryptoError::WrongPassphrase => VaultError::WrongPassphrase,
            CryptoError::CorruptWrappedKey(msg) => VaultError::CorruptKey(msg),
            CryptoError::Encryption(msg) => VaultError::Encryption(msg),
            CryptoError::Decryption(failure) => VaultError::Decryption(failure),
        }
    }
}

impl VaultError {
    /// Message suitable for showing to the person at the keyboard.
    ///
    /// Never includes key material or internal error detail.
    pub fn user_message(&self) -> String {
        match self {
            VaultError::WrongPassphrase => "Incorrect master password.".into(),
            VaultError::CorruptKey(_) => {
                "Your stored encryption key is damaged. Restore it from a backup file.".into()
            }
            VaultError::InvalidKeyFormat(_) => {
                "That file does not contain a valid private key.".into()
            }
            VaultError::KeyGeneration(_) => "Could not create an encryption key.".into(),
            VaultError::Encryption(_) => "Could not encrypt this item. Nothing was saved.".into(),
            VaultError::Decryption(DecryptFailure::KeyLocked) => {
                "Unlock your vault to view this item.".into()
            }
            VaultError::Decryption(DecryptFailure::WrongKey) => {
                "This item was encrypted with a different key.".into()
            }
            VaultError::Decryption(DecryptFailure::Malformed) => {
                "This item is not encrypted.".into()
            }
            VaultError::Decryption(DecryptFailure::NotText) => {
                "This item could not be read as text.".into()
            }
            VaultError::NotConfigured => "No encryption key is set up yet.".into(),
            VaultError::PassphraseTooShort { min } => {
                format!("Master password must be at least {min} characters.")
            }
            VaultError::InvalidIdentity => "Enter a name or an email address.".into(),
            VaultError::KeyAlreadyConfigured => {
                "An encryption key already exists. Remove it before creating a new one.".into()
            }
            VaultError::Storage(_) => "Could not access local storage.".into(),
            VaultError::Directory(_) => "Could not reach the key server.".into(),
            VaultError::Clipboard(_) => "Could not copy to the clipboard.".into(),
        }
    }
}
