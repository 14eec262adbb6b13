//! HTTP client for the Keyward control plane API.
//!
//! The control plane stores exactly one thing for the vault: the account's
//! armored public key. Requests carry a bearer token; a 401 triggers one
//! token refresh and a single retry.

use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use crate::types::{AuthTokens, PublicKeyResponse, PublishPublicKeyRequest};
use keyward_crypto::{is_valid_public_key_armor, MESSAGE_BEGIN, PRIVATE_KEY_BEGIN};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const LOGIN_PATH: &str = "/api/auth/login";
const REFRESH_PATH: &str = "/api/auth/refresh";
const PUBLIC_KEY_PATH: &str = "/api/keys/public";

#[derive(Default)]
struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user_id: Option<i64>,
    /// Bumped on every successful refresh so a caller that waited on the
    /// refresh lock can reuse the token another caller just obtained.
    generation: u64,
}

impl Session {
    fn install(&mut self, tokens: &TokenResponse) {
        self.access_token = Some(tokens.access_token.clone());
        self.refresh_token = Some(tokens.refresh_token.clone());
        self.user_id = Some(tokens.user.id);
    }
}

/// HTTP client for the Keyward control plane. Clones share one session.
#[derive(Clone)]
pub struct CloudApiClient {
    http: Client,
    base_url: String,
    session: Arc<RwLock<Session>>,
    /// Refresh tokens are single use, so refreshes must not overlap.
    refresh_lock: Arc<Mutex<()>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: i64,
    email: String,
}

impl CloudApiClient {
    pub fn new(config: CloudConfig) -> CloudResult<Self> {
        let base_url = config.api_base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(CloudError::Config("api_base_url is empty".into()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CloudError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            session: Arc::new(RwLock::new(Session::default())),
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Restores a saved session.
    pub async fn set_tokens(&self, access_token: String, refresh_token: String, user_id: i64) {
        let mut session = self.session.write().await;
        session.access_token = Some(access_token);
        session.refresh_token = Some(refresh_token);
        session.user_id = Some(user_id);
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.access_token.is_some()
    }

    pub async fn user_id(&self) -> Option<i64> {
        self.session.read().await.user_id
    }

    pub async fn logout(&self) {
        let mut session = self.session.write().await;
        let generation = session.generation;
        *session = Session {
            generation,
            ..Session::default()
        };
    }

    // ── Auth ──

    pub async fn authenticate(&self, email: &str, password: &str) -> CloudResult<AuthTokens> {
        let resp = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let tokens: TokenResponse = resp
            .error_for_status()
            .map_err(|e| CloudError::AuthFailed(e.to_string()))?
            .json()
            .await?;

        self.session.write().await.install(&tokens);
        info!(user_id = tokens.user.id, "signed in to control plane");
        Ok(AuthTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user_id: tokens.user.id,
            email: tokens.user.email,
        })
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// A rejected refresh token ends the session.
    pub async fn refresh_access_token(&self) -> CloudResult<String> {
        let seen = self.session.read().await.generation;
        let _refreshing = self.refresh_lock.lock().await;

        let refresh_token = {
            let session = self.session.read().await;
            if session.generation != seen {
                return session.access_token.clone().ok_or(CloudError::AuthRequired);
            }
            session.refresh_token.clone().ok_or(CloudError::AuthRequired)?
        };

        let resp = self
            .http
            .post(self.url(REFRESH_PATH))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!("refresh token rejected; signing out");
            self.logout().await;
            return Err(CloudError::AuthFailed(
                "session expired, sign in again".to_string(),
            ));
        }

        let tokens: TokenResponse = resp
            .error_for_status()
            .map_err(|e| CloudError::AuthFailed(format!("token refresh failed: {e}")))?
            .json()
            .await?;

        let mut session = self.session.write().await;
        session.install(&tokens);
        session.generation += 1;
        Ok(tokens.access_token)
    }

    async fn access_token(&self) -> CloudResult<String> {
        self.session
            .read()
            .await
            .access_token
            .clone()
            .ok_or(CloudError::AuthRequired)
    }

    /// Sends an authenticated request, refreshing and retrying once on 401.
    async fn send_authed<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> CloudResult<Response> {
        let url = self.url(path);
        let send = |token: String| {
            let mut req = self.http.request(method.clone(), &url).bearer_auth(token);
            if let Some(body) = body {
                req = req.json(body);
            }
            req.send()
        };

        let resp = send(self.access_token().await?).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        debug!(%method, path, "access token rejected, refreshing");
        let token = self.refresh_access_token().await?;
        Ok(send(token).await?)
    }

    // ── Public key ──

    /// The account's published public key. `None` when nothing was
    /// published yet.
    pub async fn get_public_key(&self) -> CloudResult<Option<String>> {
        let resp = self
            .send_authed::<()>(Method::GET, PUBLIC_KEY_PATH, None)
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let data: PublicKeyResponse = resp
            .error_for_status()
            .map_err(|e| CloudError::Api(e.to_string()))?
            .json()
            .await?;
        Ok(data.public_key.filter(|k| !k.trim().is_empty()))
    }

    /// Publishes the account's public key.
    ///
    /// Text carrying private-key or message armor is refused before any
    /// request is made.
    pub async fn upload_public_key(&self, public_key_armored: &str) -> CloudResult<()> {
        if public_key_armored.contains(PRIVATE_KEY_BEGIN) || public_key_armored.contains(MESSAGE_BEGIN)
        {
            return Err(CloudError::PrivateMaterial);
        }
        if !is_valid_public_key_armor(public_key_armored) {
            return Err(CloudError::InvalidPublicKey(
                "armor missing or does not parse".into(),
            ));
        }

        let body = PublishPublicKeyRequest {
            public_key: public_key_armored.to_string(),
            fingerprint: hex::encode(Sha256::digest(public_key_armored.as_bytes())),
        };
        self.send_authed(Method::POST, PUBLIC_KEY_PATH, Some(&body))
            .await?
            .error_for_status()
            .map_err(|e| CloudError::Api(e.to_string()))?;
        info!(fingerprint = %body.fingerprint, "published public key");
        Ok(())
    }
}
