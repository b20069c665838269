//! Gmail authentication.
//!
//! [`Authenticator::authorize`] turns the cached token into a [`MailSession`]:
//! - a valid cached token is used as-is
//! - an expired token with a refresh token is refreshed in place
//! - anything else goes through the interactive consent flow
//!
//! Whenever the token changes it is written back to the token store before
//! the session is returned.

pub mod client_secret;
pub mod consent;
pub mod http;
pub mod refresh;
pub mod token;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tracing::{debug, info};

use crate::error::AuthError;

pub use client_secret::{ClientConfig, load_client_config};
pub use consent::InstalledAppFlow;
pub use refresh::OAuthRefresher;
pub use token::{StoredToken, TokenGrant, TokenStore};

/// Read-only Gmail scope.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Obtains a brand-new token, typically by asking the user for consent.
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn obtain(
        &self,
        client: &ClientConfig,
        scopes: &[String],
    ) -> Result<StoredToken, AuthError>;
}

/// Exchanges a stored refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, AuthError>;
}

/// Authorized handle for the mail API.
#[derive(Clone)]
pub struct MailSession {
    access_token: SecretString,
}

impl MailSession {
    pub fn new(access_token: SecretString) -> Self {
        Self { access_token }
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }
}

impl fmt::Debug for MailSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSession")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Produces an authorized [`MailSession`] from the local token store.
pub struct Authenticator {
    store: TokenStore,
    client_secret_path: PathBuf,
    scopes: Vec<String>,
    consent: Box<dyn ConsentFlow>,
    refresher: Box<dyn TokenRefresher>,
}

impl Authenticator {
    /// Authenticator backed by the browser consent flow and Google's token
    /// endpoint. `timeout` bounds every token endpoint request.
    pub fn new(
        token_path: impl Into<PathBuf>,
        client_secret_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self::with_capabilities(
            token_path,
            client_secret_path,
            Box::new(InstalledAppFlow::new().with_timeout(timeout)),
            Box::new(OAuthRefresher::new().with_timeout(timeout)),
        )
    }

    pub fn with_capabilities(
        token_path: impl Into<PathBuf>,
        client_secret_path: impl Into<PathBuf>,
        consent: Box<dyn ConsentFlow>,
        refresher: Box<dyn TokenRefresher>,
    ) -> Self {
        Self {
            store: TokenStore::new(token_path),
            client_secret_path: client_secret_path.into(),
            scopes: vec![GMAIL_READONLY_SCOPE.to_string()],
            consent,
            refresher,
        }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub async fn authorize(&self) -> Result<MailSession, AuthError> {
        let now = Utc::now();
        let token = match self.store.load().await? {
            Some(token) if token.is_valid(&self.scopes, now) => {
                debug!(path = %self.store.path().display(), "Using cached token");
                token
            }
            Some(token) if token.can_refresh() && token.covers(&self.scopes) => {
                info!("Cached token expired, refreshing");
                let refreshed = self.refresher.refresh(&token).await?;
                self.store.save(&refreshed).await?;
                refreshed
            }
            _ => {
                let client = load_client_config(&self.client_secret_path).await?;
                info!(
                    client_id = %client.client_id,
                    "No usable cached token, starting consent flow"
                );
                let issued = self.consent.obtain(&client, &self.scopes).await?;
                self.store.save(&issued).await?;
                issued
            }
        };

        token.session()
    }
}
