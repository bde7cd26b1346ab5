//! Google OAuth 2.0 access tokens for the Sheets, Drive and Docs APIs.
//!
//! Three credential sources are supported, checked in this order: a
//! pre-generated access token, a service account key (JWT bearer grant), and a
//! user OAuth refresh token.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes needed to read the jobs sheet, search Drive and edit job documents.
pub const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/documents",
];

const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const STATIC_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
const JWT_LIFETIME_SECS: u64 = 3600;

/// Configuration for Google OAuth.
#[derive(Debug, Clone, Default)]
pub struct GoogleAuthConfig {
    /// OAuth client ID (for user OAuth flow)
    pub client_id: Option<String>,
    /// OAuth client secret (for user OAuth flow)
    pub client_secret: Option<String>,
    /// Refresh token (for user OAuth flow)
    pub refresh_token: Option<String>,
    /// Service account key JSON
    pub service_account_json: Option<String>,
    /// Pre-generated access token
    pub access_token: Option<String>,
    /// Token endpoint override
    pub token_url: Option<String>,
}

impl GoogleAuthConfig {
    /// Read credentials through a variable lookup (normally the process environment).
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            client_id: var("GOOGLE_CLIENT_ID"),
            client_secret: var("GOOGLE_CLIENT_SECRET"),
            refresh_token: var("GOOGLE_REFRESH_TOKEN"),
            service_account_json: var("GOOGLE_SERVICE_ACCOUNT_JSON")
                .or_else(|| var("GOOGLE_CREDS_JSON")),
            access_token: var("GOOGLE_ACCESS_TOKEN"),
            token_url: var("GOOGLE_OAUTH_TOKEN_URL"),
        }
    }

    /// Check if the configuration has a usable credential source.
    pub fn is_valid(&self) -> bool {
        self.access_token.is_some()
            || self.service_account_json.is_some()
            || (self.client_id.is_some()
                && self.client_secret.is_some()
                && self.refresh_token.is_some())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GoogleAuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),
    #[error("service account auth failed: {0}")]
    ServiceAccountAuthFailed(String),
    #[error("http error: {0}")]
    HttpError(String),
    #[error("json error: {0}")]
    JsonError(String),
}

#[derive(Debug, Clone)]
enum Credentials {
    Static,
    ServiceAccount(ServiceAccountKey),
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Access-token source shared by every Google adapter.
#[derive(Debug)]
pub struct GoogleAuth {
    http: reqwest::Client,
    credentials: Credentials,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    pub fn new(config: GoogleAuthConfig, http: reqwest::Client) -> Result<Self, GoogleAuthError> {
        if !config.is_valid() {
            return Err(GoogleAuthError::MissingCredentials(
                "Either GOOGLE_ACCESS_TOKEN, GOOGLE_SERVICE_ACCOUNT_JSON, or (GOOGLE_CLIENT_ID + GOOGLE_CLIENT_SECRET + GOOGLE_REFRESH_TOKEN) must be set".to_string(),
            ));
        }

        let mut token_url = config
            .token_url
            .clone()
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
        let mut cached = None;
        let credentials = if let Some(token) = config.access_token {
            cached = Some(CachedToken {
                value: token,
                expires_at: Instant::now() + STATIC_TOKEN_LIFETIME,
            });
            Credentials::Static
        } else if let Some(json) = config.service_account_json {
            let key: ServiceAccountKey = serde_json::from_str(&json)
                .map_err(|e| GoogleAuthError::JsonError(e.to_string()))?;
            if config.token_url.is_none() {
                if let Some(uri) = key.token_uri.clone() {
                    token_url = uri;
                }
            }
            Credentials::ServiceAccount(key)
        } else {
            match (config.client_id, config.client_secret, config.refresh_token) {
                (Some(client_id), Some(client_secret), Some(refresh_token)) => {
                    Credentials::RefreshToken {
                        client_id,
                        client_secret,
                        refresh_token,
                    }
                }
                _ => {
                    return Err(GoogleAuthError::MissingCredentials(
                        "incomplete OAuth refresh credentials".to_string(),
                    ))
                }
            }
        };

        Ok(Self {
            http,
            credentials,
            token_url,
            cached: Mutex::new(cached),
        })
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn access_token(&self) -> Result<String, GoogleAuthError> {
        {
            let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() + EXPIRY_MARGIN
                    || matches!(self.credentials, Credentials::Static)
                {
                    return Ok(token.value.clone());
                }
            }
        }
        self.refresh_access_token().await
    }

    /// Fetch a new access token from the token endpoint.
    pub async fn refresh_access_token(&self) -> Result<String, GoogleAuthError> {
        let form: Vec<(&str, String)> = match &self.credentials {
            Credentials::Static => {
                return Err(GoogleAuthError::TokenRefreshFailed(
                    "static access token cannot be refreshed".to_string(),
                ))
            }
            Credentials::ServiceAccount(key) => {
                debug!("Requesting Google token for service account {}", key.client_email);
                let assertion = self.sign_service_account_jwt(key)?;
                vec![
                    (
                        "grant_type",
                        "urn:ietf:params:oauth:grant-type:jwt-bearer".to_string(),
                    ),
                    ("assertion", assertion),
                ]
            }
            Credentials::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => {
                debug!("Refreshing Google OAuth token");
                vec![
                    ("client_id", client_id.clone()),
                    ("client_secret", client_secret.clone()),
                    ("refresh_token", refresh_token.clone()),
                    ("grant_type", "refresh_token".to_string()),
                ]
            }
        };

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GoogleAuthError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Google token request failed: {} - {}", status, body);
            return Err(GoogleAuthError::TokenRefreshFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|e| GoogleAuthError::JsonError(e.to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in.max(0) as u64);

        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        debug!("Google access token refreshed");
        Ok(token.access_token)
    }

    fn sign_service_account_jwt(&self, key: &ServiceAccountKey) -> Result<String, GoogleAuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs();
        let claims = JwtClaims {
            iss: &key.client_email,
            scope: GOOGLE_SCOPES.join(" "),
            aud: &self.token_url,
            iat: now,
            exp: now + JWT_LIFETIME_SECS,
        };
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| GoogleAuthError::ServiceAccountAuthFailed(e.to_string()))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| GoogleAuthError::ServiceAccountAuthFailed(e.to_string()))
    }
}
