//! OpenPGP layer for Keyward.
//!
//! Provides everything the key-custody subsystem needs from OpenPGP:
//! - Keypair generation (RSA-4096 or Curve25519)
//! - Passphrase wrapping of an armored private key (symmetric OpenPGP message)
//! - The inner passphrase lock some private-key encodings carry on their
//!   secret key packets
//! - Public-key encryption and private-key decryption of vault fields
//! - Structural armor checks
//!
//! # Architecture
//!
//! A private key is protected by two independent layers:
//!
//! 1. **Wrap layer**: the armored private-key text is encrypted as a whole
//!    with the master passphrase (SKESK + SEIP, armored as `PGP MESSAGE`).
//!    This is what lands in the local store.
//!
//! 2. **Inner layer**: individual secret key packets may themselves be
//!    locked with a passphrase (S2K). Keys generated here are not; keys
//!    imported from a backup usually are.
//!
//! Unlocking peels both layers with the same passphrase. The passphrase
//! never touches the asymmetric key material directly, so it can be changed
//! by re-wrapping without regenerating the keypair.

pub mod armor;
mod error;
pub mod keygen;
pub mod message;
pub mod passphrase;
pub mod secret_key;

pub use armor::{
    extract_private_key_block, is_armored_message, is_valid_private_key_armor,
    is_valid_public_key_armor, MESSAGE_BEGIN, MESSAGE_END, PRIVATE_KEY_BEGIN, PRIVATE_KEY_END,
    PUBLIC_KEY_BEGIN, PUBLIC_KEY_END,
};
pub use error::{CryptoError, CryptoResult, DecryptFailure};
pub use keygen::{armor_private_key, armor_public_key, generate_key_pair, KeyAlgorithm, KeyPair};
pub use message::{decrypt_message, encrypt_message};
pub use passphrase::{unwrap_private_key, wrap_private_key};
pub use secret_key::{
    fingerprint, has_locked_secrets, lock_secret_material, parse_private_key, parse_public_key,
    unlock_secret_material,
};

/// Re-exported so callers can hold passphrases in the library's protected
/// memory type without depending on the OpenPGP crate directly.
pub use sequoia_openpgp::crypto::Password;
pub use sequoia_openpgp::Cert;
