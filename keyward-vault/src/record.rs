//! The persisted wrapped-key record.

use crate::error::{VaultError, VaultResult};
use serde::{Deserialize, Serialize};

/// Store key under which the single wrapped-key record lives.
pub const WRAPPED_KEY_STORE_KEY: &str = "keyward.wrapped-key";

/// What the local store holds for one profile.
///
/// Either half may be missing: a device that fetched only the public key
/// from the server has no private half yet, and a backup import with no
/// known public key leaves the public half blank.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedPrivateKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Armored private key, encrypted under the master passphrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<String>,
}

impl WrappedPrivateKey {
    pub fn has_private_key(&self) -> bool {
        self.encrypted_private_key
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    pub fn has_public_key(&self) -> bool {
        self.public_key.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub(crate) fn to_bytes(&self) -> VaultResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| VaultError::Encryption(e.to_string()))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VaultError::CorruptKey(format!("record does not parse: {e}")))
    }
}
