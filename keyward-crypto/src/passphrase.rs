//! Wrap layer: the armored private key encrypted as a whole under the
//! master passphrase.
//!
//! The wrapped form is an ordinary armored OpenPGP message protected only by
//! a passphrase (SKESK + SEIP), so any OpenPGP tool can open a backup of the
//! local store given the passphrase.

use crate::armor::{MESSAGE_BEGIN, MESSAGE_END};
use crate::error::{CryptoError, CryptoResult};
use sequoia_openpgp as openpgp;
use openpgp::armor::Kind as ArmorKind;
use openpgp::crypto::{Password, SessionKey};
use openpgp::packet::{PKESK, SKESK};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper,
};
use openpgp::parse::{PacketParser, PacketParserResult, Parse};
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Armorer, Encryptor, LiteralWriter, Message};
use openpgp::types::SymmetricAlgorithm;
use openpgp::{Cert, KeyHandle, Packet};
use std::io::{Read, Write};
use tracing::debug;
use zeroize::Zeroizing;

/// Encrypts armored private-key text under `passphrase`, returning an
/// armored `PGP MESSAGE`.
pub fn wrap_private_key(private_key_armored: &str, passphrase: &Password) -> CryptoResult<String> {
    let mut sink = Vec::new();
    {
        let message = Message::new(&mut sink);
        let message = Armorer::new(message)
            .kind(ArmorKind::Message)
            .build()
            .map_err(|e| CryptoError::Encryption(format!("armor failed: {e}")))?;
        let message = Encryptor::with_passwords(message, Some(passphrase.clone()))
            .symmetric_algo(SymmetricAlgorithm::AES256)
            .build()
            .map_err(|e| CryptoError::Encryption(format!("encryptor failed: {e}")))?;
        let mut literal = LiteralWriter::new(message)
            .build()
            .map_err(|e| CryptoError::Encryption(format!("literal writer failed: {e}")))?;
        literal
            .write_all(private_key_armored.as_bytes())
            .map_err(|e| CryptoError::Encryption(format!("write failed: {e}")))?;
        literal
            .finalize()
            .map_err(|e| CryptoError::Encryption(format!("finalize failed: {e}")))?;
    }

    let wrapped =
        String::from_utf8(sink).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    if !wrapped.contains(MESSAGE_BEGIN) || !wrapped.contains(MESSAGE_END) {
        return Err(CryptoError::Encryption(
            "wrapped key is missing message armor".into(),
        ));
    }
    Ok(wrapped)
}

/// Decrypts a wrapped private key, returning the armored private-key text.
///
/// A blob that is not a passphrase-encrypted OpenPGP message fails with
/// [`CryptoError::CorruptWrappedKey`] regardless of the passphrase; a well
/// formed blob that the passphrase does not open fails with
/// [`CryptoError::WrongPassphrase`].
pub fn unwrap_private_key(wrapped: &str, passphrase: &Password) -> CryptoResult<Zeroizing<String>> {
    inspect_wrapped(wrapped)?;

    let policy = StandardPolicy::new();
    let helper = PassphraseHelper { passphrase };
    let mut decryptor = DecryptorBuilder::from_bytes(wrapped.as_bytes())
        .map_err(|e| CryptoError::CorruptWrappedKey(e.to_string()))?
        .with_policy(&policy, None, helper)
        .map_err(|e| {
            debug!("wrap layer rejected passphrase: {e}");
            CryptoError::WrongPassphrase
        })?;

    let mut plaintext = Zeroizing::new(Vec::new());
    decryptor.read_to_end(&mut plaintext).map_err(|e| {
        debug!("wrap layer integrity check failed: {e}");
        CryptoError::WrongPassphrase
    })?;

    let text = std::str::from_utf8(&plaintext)
        .map_err(|_| CryptoError::CorruptWrappedKey("wrapped content is not text".into()))?;
    Ok(Zeroizing::new(text.to_string()))
}

/// Checks that the blob is an armored message that starts with at least one
/// passphrase-encrypted session key packet.
fn inspect_wrapped(wrapped: &str) -> CryptoResult<()> {
    if !wrapped.contains(MESSAGE_BEGIN) {
        return Err(CryptoError::CorruptWrappedKey("missing message armor".into()));
    }

    let mut ppr = PacketParser::from_bytes(wrapped.as_bytes())
        .map_err(|e| CryptoError::CorruptWrappedKey(e.to_string()))?;
    let mut saw_skesk = false;
    while let PacketParserResult::Some(pp) = ppr {
        match &pp.packet {
            Packet::SKESK(_) => saw_skesk = true,
            Packet::SEIP(_) => break,
            _ => {}
        }
        let (_, next) = pp
            .next()
            .map_err(|e| CryptoError::CorruptWrappedKey(e.to_string()))?;
        ppr = next;
    }

    if saw_skesk {
        Ok(())
    } else {
        Err(CryptoError::CorruptWrappedKey(
            "message is not passphrase-encrypted".into(),
        ))
    }
}

struct PassphraseHelper<'a> {
    passphrase: &'a Password,
}

impl VerificationHelper for PassphraseHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        Ok(())
    }
}

impl DecryptionHelper for PassphraseHelper<'_> {
    fn decrypt(
        &mut self,
        _pkesks: &[PKESK],
        skesks: &[SKESK],
        _sym_algo: Option<SymmetricAlgorithm>,
        decrypt: &mut dyn FnMut(Option<SymmetricAlgorithm>, &SessionKey) -> bool,
    ) -> openpgp::Result<Option<Cert>> {
        for skesk in skesks {
            if let Ok((algo, session_key)) = skesk.decrypt(self.passphrase) {
                if decrypt(algo, &session_key) {
                    return Ok(None);
                }
            }
        }
        Err(openpgp::Error::MissingSessionKey("passphrase does not open any SKESK".into()).into())
    }
}
