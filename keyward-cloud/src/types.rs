//! Wire types for the control plane API.

use serde::{Deserialize, Serialize};

/// Authentication tokens from the API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: i64,
    pub email: String,
}

/// Body of `GET /api/keys/public`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub public_key: Option<String>,
}

/// Body of `POST /api/keys/public`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishPublicKeyRequest {
    pub public_key: String,
    /// Hex SHA-256 of `public_key`, for server-side dedup and audit.
    pub fingerprint: String,
}
