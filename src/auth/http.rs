//! Token endpoint transport.
//!
//! `oauth2` hands us a prepared [`HttpRequest`]; we send it through the
//! crate's own reqwest client so token requests share the configured timeout
//! with every other call.

use std::time::Duration;

use oauth2::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use oauth2::{HttpRequest, HttpResponse};

use crate::error::AuthError;

/// Timeout used when nothing else is configured.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum TokenHttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("malformed HTTP exchange: {0}")]
    Malformed(String),
}

/// reqwest client for the token endpoint. Redirects are not followed.
#[derive(Debug, Clone)]
pub struct TokenHttpClient {
    client: reqwest::Client,
}

impl TokenHttpClient {
    pub fn with_timeout(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TokenHttpError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TokenHttpError::Malformed(e.to_string()))?;

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        let response = builder.body(request.body).send().await?;

        let status_code = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| TokenHttpError::Malformed(e.to_string()))?;
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers() {
            let name = HeaderName::from_bytes(name.as_str().as_bytes())
                .map_err(|e| TokenHttpError::Malformed(e.to_string()))?;
            let value = HeaderValue::from_bytes(value.as_bytes())
                .map_err(|e| TokenHttpError::Malformed(e.to_string()))?;
            headers.append(name, value);
        }
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status_code,
            headers,
            body,
        })
    }
}
