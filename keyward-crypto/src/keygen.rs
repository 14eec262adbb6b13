//! Keypair generation and armoring.

use crate::error::{CryptoError, CryptoResult};
use sequoia_openpgp as openpgp;
use openpgp::armor::{Kind as ArmorKind, Writer as ArmorWriter};
use openpgp::cert::{CertBuilder, CipherSuite};
use openpgp::serialize::Serialize as _;
use openpgp::Cert;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Asymmetric algorithm used for newly generated keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAlgorithm {
    /// 4096-bit RSA primary key and encryption subkey.
    #[default]
    Rsa4k,
    /// Ed25519 primary key with a Curve25519 encryption subkey.
    Cv25519,
}

impl KeyAlgorithm {
    fn cipher_suite(self) -> CipherSuite {
        match self {
            KeyAlgorithm::Rsa4k => CipherSuite::RSA4k,
            KeyAlgorithm::Cv25519 => CipherSuite::Cv25519,
        }
    }
}

/// Freshly generated or imported keypair, both halves armored.
///
/// The private half lives in zeroize-on-drop memory and should be wrapped
/// and dropped as soon as possible.
pub struct KeyPair {
    pub public_key: String,
    pub private_key: Zeroizing<String>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Generates a new keypair with a certification primary key and one
/// transport-encryption subkey.
///
/// `name` and `email` only become the user id; at least one must be
/// non-empty. The result carries unencrypted secret material.
pub fn generate_key_pair(name: &str, email: &str, algorithm: KeyAlgorithm) -> CryptoResult<KeyPair> {
    let user_id = user_id(name, email)?;
    debug!(?algorithm, "generating keypair");

    let (cert, _revocation) = CertBuilder::new()
        .add_userid(user_id)
        .set_cipher_suite(algorithm.cipher_suite())
        .add_transport_encryption_subkey()
        .generate()
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

    info!(fingerprint = %cert.fingerprint().to_hex(), "generated keypair");

    Ok(KeyPair {
        public_key: armor_public_key(&cert)?,
        private_key: armor_private_key(&cert)?,
    })
}

/// Armors the public half of a certificate.
pub fn armor_public_key(cert: &Cert) -> CryptoResult<String> {
    let mut writer = ArmorWriter::new(Vec::new(), ArmorKind::PublicKey)
        .map_err(|e| CryptoError::Armor(e.to_string()))?;
    cert.serialize(&mut writer)
        .map_err(|e| CryptoError::Armor(e.to_string()))?;
    let bytes = writer
        .finalize()
        .map_err(|e| CryptoError::Armor(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CryptoError::Armor(e.to_string()))
}

/// Armors a certificate including its secret key packets, locked or not.
pub fn armor_private_key(cert: &Cert) -> CryptoResult<Zeroizing<String>> {
    if !cert.is_tsk() {
        return Err(CryptoError::InvalidKey(
            "certificate carries no secret key material".into(),
        ));
    }

    let mut writer = ArmorWriter::new(Vec::new(), ArmorKind::SecretKey)
        .map_err(|e| CryptoError::Armor(e.to_string()))?;
    cert.as_tsk()
        .serialize(&mut writer)
        .map_err(|e| CryptoError::Armor(e.to_string()))?;
    let bytes = writer
        .finalize()
        .map_err(|e| CryptoError::Armor(e.to_string()))?;
    String::from_utf8(bytes)
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::Armor(e.to_string()))
}

fn user_id(name: &str, email: &str) -> CryptoResult<String> {
    let name = name.trim();
    let email = email.trim();
    match (name.is_empty(), email.is_empty()) {
        (true, true) => Err(CryptoError::KeyGeneration(
            "user id needs a name or an email".into(),
        )),
        (false, true) => Ok(name.to_string()),
        (true, false) => Ok(format!("<{email}>")),
        (false, false) => Ok(format!("{name} <{email}>")),
    }
}
