use std::fmt;
use thiserror::Error;

/// Result type for OpenPGP operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Why a field could not be decrypted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecryptFailure {
    /// The ciphertext was not addressed to this key, or could not be opened by it.
    WrongKey,
    /// The decryption key's secret material is still passphrase-locked.
    KeyLocked,
    /// The input carries no message armor. Callers treat this as legacy
    /// plaintext rather than an error.
    Malformed,
    /// The message opened but its content is not UTF-8 text.
    NotText,
}

impl fmt::Display for DecryptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptFailure::WrongKey => write!(f, "key does not match ciphertext"),
            DecryptFailure::KeyLocked => write!(f, "decryption key is locked"),
            DecryptFailure::Malformed => write!(f, "input is not an armored message"),
            DecryptFailure::NotText => write!(f, "decrypted content is not text"),
        }
    }
}

/// Errors from the OpenPGP layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Either unwrap layer rejected the passphrase.
    #[error("passphrase rejected")]
    WrongPassphrase,

    /// The wrapped blob is not a passphrase-encrypted OpenPGP message, or
    /// its content is not a private key.
    #[error("wrapped key is unreadable: {0}")]
    CorruptWrappedKey(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(DecryptFailure),

    #[error("armor encoding failed: {0}")]
    Armor(String),
}
