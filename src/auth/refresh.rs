//! `grant_type=refresh_token` against the token's own client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use oauth2::RefreshToken;

use super::TokenRefresher;
use super::client_secret::{ClientConfig, GOOGLE_AUTH_URI};
use super::consent::oauth_client;
use super::http::{DEFAULT_TOKEN_TIMEOUT, TokenHttpClient};
use super::token::{StoredToken, TokenGrant};
use crate::error::AuthError;

/// Refreshes tokens using the client id/secret recorded in the token file.
#[derive(Debug, Clone)]
pub struct OAuthRefresher {
    timeout: Duration,
}

impl Default for OAuthRefresher {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }
}

impl OAuthRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, AuthError> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::RefreshFailed("no refresh token stored".to_string()))?;

        let client = ClientConfig {
            client_id: token.client_id.clone(),
            client_secret: token.client_secret.clone(),
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: token.token_uri.clone(),
        };

        let http = TokenHttpClient::with_timeout(self.timeout)?;
        let response = oauth_client(&client, None)?
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(|request| http.execute(request))
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        token
            .clone()
            .refreshed(TokenGrant::from_response(&response), Utc::now())
    }
}
