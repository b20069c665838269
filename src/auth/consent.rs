//! Installed-app consent flow: authorization code + PKCE with a loopback
//! redirect.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, Scope, TokenUrl,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info};

use super::ConsentFlow;
use super::client_secret::ClientConfig;
use super::http::{DEFAULT_TOKEN_TIMEOUT, TokenHttpClient};
use super::token::{StoredToken, TokenGrant};
use crate::error::AuthError;

/// Runs the browser consent flow against a one-shot local callback listener.
#[derive(Debug, Clone)]
pub struct InstalledAppFlow {
    bind_host: String,
    /// `0` picks a free port.
    port: u16,
    /// Applies to the code exchange, not to the wait for the browser.
    timeout: Duration,
}

impl Default for InstalledAppFlow {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }
}

impl InstalledAppFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub(crate) fn oauth_client(
    client: &ClientConfig,
    redirect: Option<RedirectUrl>,
) -> Result<BasicClient, AuthError> {
    let auth_url = AuthUrl::new(client.auth_uri.clone())
        .map_err(|e| AuthError::InvalidConfig(format!("Invalid auth URL: {e}")))?;
    let token_url = TokenUrl::new(client.token_uri.clone())
        .map_err(|e| AuthError::InvalidConfig(format!("Invalid token URL: {e}")))?;
    let secret = Some(client.client_secret.clone())
        .filter(|s| !s.is_empty())
        .map(ClientSecret::new);

    let oauth = BasicClient::new(
        ClientId::new(client.client_id.clone()),
        secret,
        auth_url,
        Some(token_url),
    );
    Ok(match redirect {
        Some(redirect) => oauth.set_redirect_uri(redirect),
        None => oauth,
    })
}

#[async_trait]
impl ConsentFlow for InstalledAppFlow {
    async fn obtain(
        &self,
        client: &ClientConfig,
        scopes: &[String],
    ) -> Result<StoredToken, AuthError> {
        let listener = TcpListener::bind((self.bind_host.as_str(), self.port))
            .await
            .map_err(|e| AuthError::CallbackServerFailed(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::CallbackServerFailed(e.to_string()))?
            .port();

        let redirect = RedirectUrl::new(format!("http://localhost:{port}/"))
            .map_err(|e| AuthError::InvalidConfig(format!("Invalid redirect URL: {e}")))?;
        let oauth = oauth_client(client, Some(redirect))?;
        let http = TokenHttpClient::with_timeout(self.timeout)?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let mut request = oauth
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");
        for scope in scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (auth_url, csrf_token) = request.url();

        eprintln!("Please visit this URL to authorize Gmail access:\n\n    {auth_url}\n");
        info!(port, "Waiting for OAuth2 callback");

        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|e| AuthError::CallbackServerFailed(e.to_string()))?;
        let (read_half, mut write_half) = stream.split();

        let mut request_line = String::new();
        BufReader::new(read_half)
            .read_line(&mut request_line)
            .await
            .map_err(|e| AuthError::CallbackServerFailed(e.to_string()))?;
        debug!("Received callback request: {}", request_line.trim());

        let (code, state) = match parse_callback_request(&request_line) {
            Ok(parsed) => parsed,
            Err(e) => {
                write_half
                    .write_all(callback_page("Authorization failed", &e.to_string()).as_bytes())
                    .await
                    .ok();
                return Err(e);
            }
        };

        if state != *csrf_token.secret() {
            write_half
                .write_all(callback_page("Authorization failed", "Invalid state parameter.").as_bytes())
                .await
                .ok();
            return Err(AuthError::AuthorizationFailed(
                "CSRF token mismatch".to_string(),
            ));
        }

        write_half
            .write_all(
                callback_page(
                    "Authorization complete",
                    "You can close this window and return to the terminal.",
                )
                .as_bytes(),
            )
            .await
            .ok();
        write_half.flush().await.ok();

        let response = oauth
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(|request| http.execute(request))
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        info!("Consent granted, token issued");
        StoredToken::issued(
            client,
            TokenGrant::from_response(&response),
            scopes,
            Utc::now(),
        )
    }
}

/// Pull `code` and `state` out of the callback's HTTP request line
/// (`GET /?code=xxx&state=yyy HTTP/1.1`).
pub fn parse_callback_request(request_line: &str) -> Result<(String, String), AuthError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AuthError::AuthorizationFailed("Invalid callback request".to_string()))?;

    let url = Url::parse(&format!("http://localhost{target}"))
        .map_err(|e| AuthError::AuthorizationFailed(format!("Invalid callback URL: {e}")))?;

    let mut code = None;
    let mut state = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => {
                let description = url
                    .query_pairs()
                    .find(|(k, _)| k == "error_description")
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_else(|| value.to_string());
                return Err(AuthError::AuthorizationFailed(description));
            }
            _ => {}
        }
    }

    match (code, state) {
        (Some(c), Some(s)) => Ok((c, s)),
        _ => Err(AuthError::AuthorizationFailed(
            "Missing code or state in callback".to_string(),
        )),
    }
}

fn callback_page(title: &str, message: &str) -> String {
    let body = format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head>\
         <body style=\"font-family: system-ui, sans-serif; text-align: center; padding: 3rem;\">\
         <h1>{title}</h1><p>{message}</p></body></html>"
    );
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_with_code_and_state() {
        let (code, state) =
            parse_callback_request("GET /?state=abc123&code=4%2F0Adeu5B&scope=x HTTP/1.1\r\n")
                .unwrap();
        assert_eq!(code, "4/0Adeu5B");
        assert_eq!(state, "abc123");
    }

    #[test]
    fn callback_error_uses_description() {
        let err = parse_callback_request(
            "GET /?error=access_denied&error_description=User+said+no HTTP/1.1",
        )
        .unwrap_err();
        assert!(err.to_string().contains("User said no"));
    }

    #[test]
    fn callback_error_without_description() {
        let err = parse_callback_request("GET /?error=access_denied HTTP/1.1").unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn callback_missing_state() {
        let err = parse_callback_request("GET /?code=abc HTTP/1.1").unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationFailed(_)));
    }

    #[test]
    fn callback_garbage_request_line() {
        assert!(parse_callback_request("").is_err());
    }

    #[test]
    fn callback_page_has_content_length() {
        let page = callback_page("Done", "ok");
        let (head, body) = page.split_once("\r\n\r\n").unwrap();
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
    }

    #[test]
    fn oauth_client_rejects_bad_token_uri() {
        let client = ClientConfig {
            client_id: "abc".to_string(),
            client_secret: String::new(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: "not a url".to_string(),
        };
        assert!(matches!(
            oauth_client(&client, None),
            Err(AuthError::InvalidConfig(_))
        ));
    }
}
