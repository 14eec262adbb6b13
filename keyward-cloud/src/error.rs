//! Control plane error types.

use thiserror::Error;

/// Result type for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur talking to the control plane.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The payload carried something other than a public key.
    #[error("refusing to upload non-public key material")]
    PrivateMaterial,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<CloudError> for keyward_vault::VaultError {
    fn from(err: CloudError) -> Self {
        keyward_vault::VaultError::Directory(err.to_string())
    }
}
