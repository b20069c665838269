//! Cached OAuth token and its on-disk store.
//!
//! The file uses Google's "authorized user" JSON layout, so a `token.json`
//! written by Google's own client libraries loads as-is.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client_secret::ClientConfig;
use super::MailSession;
use crate::error::AuthError;

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Default Google token endpoint.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Persisted OAuth credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredToken {
    /// Current access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Granted scopes. `None` means the file did not record them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Provider-agnostic view of a token endpoint response.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
    pub scopes: Option<Vec<String>>,
}

impl TokenGrant {
    pub fn from_response(response: &BasicTokenResponse) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in: response.expires_in(),
            scopes: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str().to_owned()).collect()),
        }
    }
}

impl StoredToken {
    /// Build a fresh token from a consent-flow grant.
    pub fn issued(
        client: &ClientConfig,
        grant: TokenGrant,
        requested_scopes: &[String],
        now: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            expiry: grant.expires_in.map(|d| expiry_from(now, d)).transpose()?,
            token: Some(grant.access_token),
            refresh_token: grant.refresh_token,
            token_uri: client.token_uri.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes: Some(grant.scopes.unwrap_or_else(|| requested_scopes.to_vec())),
        })
    }

    /// Apply a refresh grant in place. The refresh token and scopes are kept
    /// when the provider does not send new ones.
    pub fn refreshed(mut self, grant: TokenGrant, now: DateTime<Utc>) -> Result<Self, AuthError> {
        self.expiry = grant.expires_in.map(|d| expiry_from(now, d)).transpose()?;
        self.token = Some(grant.access_token);
        if grant.refresh_token.is_some() {
            self.refresh_token = grant.refresh_token;
        }
        if grant.scopes.is_some() {
            self.scopes = grant.scopes;
        }
        Ok(self)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry.timestamp() - now.timestamp() < EXPIRY_SKEW_SECS,
            None => false,
        }
    }

    /// Whether every required scope was granted. Tokens that did not record
    /// their scopes are assumed to carry the ones they were loaded for.
    pub fn covers(&self, required: &[String]) -> bool {
        match &self.scopes {
            Some(granted) => required.iter().all(|r| granted.iter().any(|g| g == r)),
            None => true,
        }
    }

    /// Usable without any round trip.
    pub fn is_valid(&self, required: &[String], now: DateTime<Utc>) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
            && !self.is_expired(now)
            && self.covers(required)
    }

    /// Enough material to hit the token endpoint with `grant_type=refresh_token`.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
            && !self.client_id.is_empty()
    }

    pub fn session(&self) -> Result<MailSession, AuthError> {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => {
                Ok(MailSession::new(SecretString::from(token.to_string())))
            }
            _ => Err(AuthError::AuthorizationFailed(
                "token holds no access token".to_string(),
            )),
        }
    }
}

/// `now + expires_in`, rejecting lifetimes chrono cannot represent.
fn expiry_from(now: DateTime<Utc>, expires_in: Duration) -> Result<DateTime<Utc>, AuthError> {
    i64::try_from(expires_in.as_secs())
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            AuthError::TokenExchangeFailed(format!(
                "token lifetime out of range: expires_in={}s",
                expires_in.as_secs()
            ))
        })
}

/// File-backed token store.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored token. A missing file is `Ok(None)`; a file that
    /// exists but does not parse is an error.
    pub async fn load(&self) -> Result<Option<StoredToken>, AuthError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cached token");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AuthError::InvalidTokenStore {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    pub async fn save(&self, token: &StoredToken) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(token).map_err(|e| {
            AuthError::InvalidTokenStore {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "Token persisted");
        Ok(())
    }
}
