//! Process-wide OAuth credential for the Google backends.
//!
//! Holds one access token minted from a stored refresh token and re-mints it
//! shortly before expiry. Concurrent callers share a single refresh.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REVOKE_URI: &str = "https://oauth2.googleapis.com/revoke";
/// Tokens closer than this to expiry are treated as expired.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("credentials file not found: {0}")]
    CredentialsNotFound(String),
    #[error("invalid credentials file {path}: {reason}")]
    InvalidCredentials { path: String, reason: String },
    #[error("token endpoint rejected refresh ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// `authorized_user` credentials, as written by `gcloud auth application-default login`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl AuthorizedUser {
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Err(AuthError::CredentialsNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| AuthError::InvalidCredentials {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Source of bearer tokens for Google API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// A fixed, pre-minted token.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

/// Refresh-token backed credential cache.
///
/// Lifecycle: [`init`](Self::init) at startup mints the first token (so bad
/// credentials fail the process early), [`shutdown`](Self::shutdown) revokes
/// it on exit.
pub struct OAuthTokenCache {
    creds: AuthorizedUser,
    client: reqwest::Client,
    revoke_uri: String,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthTokenCache {
    pub fn new(creds: AuthorizedUser, client: reqwest::Client) -> Self {
        Self {
            creds,
            client,
            revoke_uri: DEFAULT_REVOKE_URI.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_revoke_uri(mut self, uri: impl Into<String>) -> Self {
        self.revoke_uri = uri.into();
        self
    }

    /// Build the cache and mint the first token.
    pub async fn init(self) -> Result<Self, AuthError> {
        self.access_token().await?;
        tracing::info!(client_id = %self.creds.client_id, "OAuth credential initialized");
        Ok(self)
    }

    async fn refresh(&self) -> Result<CachedToken, AuthError> {
        let resp = self
            .client
            .post(&self.creds.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.creds.client_id.as_str()),
                ("client_secret", self.creds.client_secret.as_str()),
                ("refresh_token", self.creds.refresh_token.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, body) = crate::http::failure(resp).await;
            return Err(AuthError::Rejected { status, body });
        }

        let token: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        tracing::debug!(expires_in_secs = lifetime.as_secs(), "access token refreshed");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }

    /// Revoke and forget the cached token. Failures are logged, not returned.
    pub async fn shutdown(&self) {
        let Some(token) = self.cached.lock().await.take() else {
            return;
        };
        let result = self
            .client
            .post(&self.revoke_uri)
            .form(&[("token", token.value.as_str())])
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("OAuth access token revoked");
            }
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "token revocation rejected");
            }
            Err(err) => {
                tracing::warn!(error = %err, "token revocation failed");
            }
        }
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenCache {
    async fn access_token(&self) -> Result<String, AuthError> {
        // Holding the lock across the refresh makes concurrent callers wait
        // for one refresh instead of each minting their own.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }
        let token = self.refresh().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeOAuth {
        refreshes: AtomicUsize,
        revokes: AtomicUsize,
        expires_in: u64,
        reject: bool,
    }

    async fn token(
        State(state): State<Arc<FakeOAuth>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        if state.reject || form.get("grant_type").map(String::as_str) != Some("refresh_token") {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid_grant"})),
            );
        }
        let n = state.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "access_token": format!("token-{n}"),
                "expires_in": state.expires_in,
                "token_type": "Bearer",
            })),
        )
    }

    async fn revoke(State(state): State<Arc<FakeOAuth>>) -> StatusCode {
        state.revokes.fetch_add(1, Ordering::SeqCst);
        StatusCode::OK
    }

    async fn fake(state: FakeOAuth) -> (Arc<FakeOAuth>, OAuthTokenCache) {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/token", post(token))
            .route("/revoke", post(revoke))
            .with_state(state.clone());
        let base = serve(app).await;
        let creds = AuthorizedUser {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            refresh_token: "rt".into(),
            token_uri: format!("{base}/token"),
        };
        let cache = OAuthTokenCache::new(creds, crate::http::client(Duration::from_secs(5)))
            .with_revoke_uri(format!("{base}/revoke"));
        (state, cache)
    }

    #[tokio::test]
    async fn test_token_cached_across_calls() {
        let (state, cache) = fake(FakeOAuth { expires_in: 3600, ..Default::default() }).await;
        let cache = cache.init().await.unwrap();

        assert_eq!(cache.access_token().await.unwrap(), "token-1");
        assert_eq!(cache.access_token().await.unwrap(), "token-1");
        assert_eq!(state.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_near_expiry_token_is_refreshed() {
        // 30s lifetime is inside the refresh margin, so every call refreshes.
        let (state, cache) = fake(FakeOAuth { expires_in: 30, ..Default::default() }).await;
        assert_eq!(cache.access_token().await.unwrap(), "token-1");
        assert_eq!(cache.access_token().await.unwrap(), "token-2");
        assert_eq!(state.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_refresh() {
        let (state, cache) = fake(FakeOAuth { expires_in: 3600, ..Default::default() }).await;
        let cache = Arc::new(cache);
        let (a, b) = tokio::join!(cache.access_token(), cache.access_token());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(state.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_refresh() {
        let (_, cache) = fake(FakeOAuth { reject: true, ..Default::default() }).await;
        let err = cache.init().await.err().unwrap();
        assert!(matches!(err, AuthError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_shutdown_revokes_and_clears() {
        let (state, cache) = fake(FakeOAuth { expires_in: 3600, ..Default::default() }).await;
        let cache = cache.init().await.unwrap();
        cache.shutdown().await;
        assert_eq!(state.revokes.load(Ordering::SeqCst), 1);

        // Nothing cached any more: the next call mints a fresh token.
        assert_eq!(cache.access_token().await.unwrap(), "token-2");

        // Revokes token-2; the trailing call has nothing cached and is a no-op.
        cache.shutdown().await;
        cache.shutdown().await;
        assert_eq!(state.revokes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_secrets.json");
        assert!(matches!(
            AuthorizedUser::from_file(&path),
            Err(AuthError::CredentialsNotFound(_))
        ));

        std::fs::write(
            &path,
            r#"{"type":"authorized_user","client_id":"c","client_secret":"s","refresh_token":"r"}"#,
        )
        .unwrap();
        let creds = AuthorizedUser::from_file(&path).unwrap();
        assert_eq!(creds.refresh_token, "r");
        assert_eq!(creds.token_uri, DEFAULT_TOKEN_URI);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            AuthorizedUser::from_file(&path),
            Err(AuthError::InvalidCredentials { .. })
        ));
    }
}
