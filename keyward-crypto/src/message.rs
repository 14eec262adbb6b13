//! Public-key encryption and private-key decryption of vault fields.

use crate::armor::{is_armored_message, MESSAGE_BEGIN, MESSAGE_END};
use crate::error::{CryptoError, CryptoResult, DecryptFailure};
use sequoia_openpgp as openpgp;
use openpgp::crypto::SessionKey;
use openpgp::packet::key::{SecretParts, UnspecifiedRole};
use openpgp::packet::{Key, PKESK, SKESK};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Armorer, Encryptor, LiteralWriter, Message, Recipient};
use openpgp::types::SymmetricAlgorithm;
use openpgp::{Cert, KeyHandle};
use std::io::{Read, Write};
use tracing::debug;
use zeroize::Zeroizing;

/// Encrypts `plaintext` to every valid transport-encryption key of
/// `recipient`, returning an armored `PGP MESSAGE`.
pub fn encrypt_message(plaintext: &[u8], recipient: &Cert) -> CryptoResult<String> {
    if plaintext.is_empty() {
        return Err(CryptoError::Encryption("plaintext is empty".into()));
    }

    let policy = StandardPolicy::new();
    let recipients: Vec<Recipient<'_>> = recipient
        .keys()
        .with_policy(&policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_transport_encryption()
        .map(Into::into)
        .collect();
    if recipients.is_empty() {
        return Err(CryptoError::Encryption(
            "public key has no encryption-capable subkey".into(),
        ));
    }

    let mut sink = Vec::new();
    {
        let message = Message::new(&mut sink);
        let message = Armorer::new(message)
            .build()
            .map_err(|e| CryptoError::Encryption(format!("armor failed: {e}")))?;
        let message = Encryptor::for_recipients(message, recipients)
            .symmetric_algo(SymmetricAlgorithm::AES256)
            .build()
            .map_err(|e| CryptoError::Encryption(format!("encryptor failed: {e}")))?;
        let mut literal = LiteralWriter::new(message)
            .build()
            .map_err(|e| CryptoError::Encryption(format!("literal writer failed: {e}")))?;
        literal
            .write_all(plaintext)
            .map_err(|e| CryptoError::Encryption(format!("write failed: {e}")))?;
        literal
            .finalize()
            .map_err(|e| CryptoError::Encryption(format!("finalize failed: {e}")))?;
    }

    let armored = String::from_utf8(sink).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    if !armored.contains(MESSAGE_BEGIN) || !armored.contains(MESSAGE_END) {
        return Err(CryptoError::Encryption("output is missing message armor".into()));
    }
    Ok(armored)
}

/// Decrypts an armored message with the unlocked secret keys of `cert`.
///
/// Text without message armor fails with [`DecryptFailure::Malformed`]; a
/// certificate whose encryption keys are absent or still locked fails with
/// [`DecryptFailure::KeyLocked`]; anything the keys cannot open fails with
/// [`DecryptFailure::WrongKey`].
pub fn decrypt_message(armored: &str, cert: &Cert) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if !is_armored_message(armored) {
        return Err(CryptoError::Decryption(DecryptFailure::Malformed));
    }

    let policy = StandardPolicy::new();
    let keys: Vec<_> = cert
        .keys()
        .unencrypted_secret()
        .with_policy(&policy, None)
        .supported()
        .for_transport_encryption()
        .map(|ka| ka.key().clone())
        .collect();
    if keys.is_empty() {
        return Err(CryptoError::Decryption(DecryptFailure::KeyLocked));
    }

    let helper = KeyringHelper { keys };
    let mut decryptor = DecryptorBuilder::from_bytes(armored.as_bytes())
        .map_err(|e| {
            debug!("message does not parse: {e}");
            CryptoError::Decryption(DecryptFailure::WrongKey)
        })?
        .with_policy(&policy, None, helper)
        .map_err(|e| {
            debug!("no session key recovered: {e}");
            CryptoError::Decryption(DecryptFailure::WrongKey)
        })?;

    let mut plaintext = Zeroizing::new(Vec::new());
    decryptor.read_to_end(&mut plaintext).map_err(|e| {
        debug!("message body failed integrity check: {e}");
        CryptoError::Decryption(DecryptFailure::WrongKey)
    })?;
    Ok(plaintext)
}

struct KeyringHelper {
    keys: Vec<Key<SecretParts, UnspecifiedRole>>,
}

impl VerificationHelper for KeyringHelper {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        Ok(())
    }
}

impl DecryptionHelper for KeyringHelper {
    fn decrypt(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        decrypt: &mut dyn FnMut(Option<SymmetricAlgorithm>, &SessionKey) -> bool,
    ) -> openpgp::Result<Option<Cert>> {
        for pkesk in pkesks {
            for key in &self.keys {
                let mut keypair = key.clone().into_keypair()?;
                if let Some((algo, sk)) = pkesk.decrypt(&mut keypair, sym_algo)
                    && decrypt(algo, &sk)
                {
                    return Ok(None);
                }
            }
        }
        Err(openpgp::Error::MissingSessionKey("no key opens this message".into()).into())
    }
}
