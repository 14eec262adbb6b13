//! Vault configuration.

use keyward_crypto::KeyAlgorithm;
use serde::{Deserialize, Serialize};

/// Configuration for the custody layer of one local profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Local profile name; selects the store table.
    pub profile: String,

    /// Algorithm for newly generated keypairs.
    pub key_algorithm: KeyAlgorithm,

    /// Minimum master passphrase length, in characters.
    pub min_passphrase_length: usize,

    /// When locked, queue sealing of new secrets until unlock instead of
    /// sealing with the public key alone.
    pub gate_seal_on_unlock: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
            key_algorithm: KeyAlgorithm::Rsa4k,
            min_passphrase_length: 8,
            gate_seal_on_unlock: true,
        }
    }
}

impl VaultConfig {
    /// Fast-keygen config used throughout the test suite.
    #[doc(hidden)]
    pub fn for_tests() -> Self {
        Self {
            key_algorithm: KeyAlgorithm::Cv25519,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.profile, "default");
        assert_eq!(config.key_algorithm, KeyAlgorithm::Rsa4k);
        assert_eq!(config.min_passphrase_length, 8);
        assert!(config.gate_seal_on_unlock);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"key_algorithm":"cv25519","profile":"work"}"#).unwrap();
        assert_eq!(config.key_algorithm, KeyAlgorithm::Cv25519);
        assert_eq!(config.profile, "work");
        assert_eq!(config.min_passphrase_length, 8);
    }
}
