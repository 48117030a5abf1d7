// Service-account OAuth2 for the Google collaborators.
//
// Server-to-server flow: sign a short-lived JWT with the service account's
// RSA key and exchange it at the token endpoint for a bearer token. The
// token is cached and refreshed a little before it expires. Interactive
// OAuth flows are deliberately out of scope; the spreadsheets must be shared
// with the service account email.
//
// Credentials come from either:
// - `GOOGLE_SERVICE_ACCOUNT_KEY` - path to the JSON key file, or
// - `GOOGLE_SERVICE_ACCOUNT_JSON` - the JSON content directly (deployments).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Read-only access to drive metadata and spreadsheet values.
const SCOPES: &str = "https://www.googleapis.com/auth/drive.metadata.readonly \
                      https://www.googleapis.com/auth/spreadsheets.readonly";

#[derive(Debug, Error)]
pub enum GoogleAuthError {
    #[error("failed to read service account key: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid service account key: {0}")]
    Key(#[from] serde_json::Error),
    #[error("failed to sign auth JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token exchange failed ({status}): {body}")]
    TokenExchange { status: u16, body: String },
    #[error("neither GOOGLE_SERVICE_ACCOUNT_KEY nor GOOGLE_SERVICE_ACCOUNT_JSON is set")]
    MissingCredentials,
    #[error("system clock is before the unix epoch")]
    Clock,
}

/// Service account credentials from the JSON key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

/// JWT claims for Google's OAuth2 jwt-bearer grant.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    client: Client,
    cached: RwLock<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub async fn from_file(path: &str) -> Result<Self, GoogleAuthError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, GoogleAuthError> {
        let key: ServiceAccountKey = serde_json::from_str(json)?;
        Ok(Self {
            key,
            client: Client::new(),
            cached: RwLock::new(None),
        })
    }

    pub async fn from_env() -> Result<Self, GoogleAuthError> {
        if let Ok(path) = std::env::var("GOOGLE_SERVICE_ACCOUNT_KEY") {
            return Self::from_file(&path).await;
        }
        if let Ok(json) = std::env::var("GOOGLE_SERVICE_ACCOUNT_JSON") {
            return Self::from_json(&json);
        }
        Err(GoogleAuthError::MissingCredentials)
    }

    /// Gets a valid access token, refreshing if necessary.
    pub async fn access_token(&self) -> Result<String, GoogleAuthError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + Duration::from_secs(60) {
                    return Ok(token.token.clone());
                }
            }
        }

        let token = self.fetch_token().await?;

        {
            let mut cached = self.cached.write().await;
            // Google issues one-hour tokens; refresh a few minutes early.
            *cached = Some(CachedToken {
                token: token.clone(),
                expires_at: SystemTime::now() + Duration::from_secs(55 * 60),
            });
        }

        Ok(token)
    }

    async fn fetch_token(&self) -> Result<String, GoogleAuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| GoogleAuthError::Clock)?
            .as_secs();

        let claims = JwtClaims {
            iss: self.key.client_email.clone(),
            scope: SCOPES.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let header = Header::new(Algorithm::RS256);
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &signing_key)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GoogleAuthError::TokenExchange { status, body });
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}
