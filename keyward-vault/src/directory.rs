//! The server-side public key directory, as seen from the client.

use crate::error::VaultResult;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Where the account's public key is published so other devices can find
/// it. Only ever sees public material.
#[async_trait]
pub trait PublicKeyDirectory: Send + Sync {
    /// The account's published public key, if any.
    async fn fetch_public_key(&self) -> VaultResult<Option<String>>;

    /// Publishes (or replaces) the account's public key.
    async fn publish_public_key(&self, public_key_armored: &str) -> VaultResult<()>;
}

/// In-process directory for offline profiles and tests.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    public_key: RwLock<Option<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_public_key(public_key_armored: impl Into<String>) -> Self {
        Self {
            public_key: RwLock::new(Some(public_key_armored.into())),
        }
    }
}

#[async_trait]
impl PublicKeyDirectory for MemoryDirectory {
    async fn fetch_public_key(&self) -> VaultResult<Option<String>> {
        Ok(self.public_key.read().await.clone())
    }

    async fn publish_public_key(&self, public_key_armored: &str) -> VaultResult<()> {
        *self.public_key.write().await = Some(public_key_armored.to_string());
        Ok(())
    }
}
