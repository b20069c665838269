//! Gmail REST API (v1) implementation of [`MailClient`].
//!
//! Uses two endpoints:
//! - `users.messages.list` with a `q` filter, following `nextPageToken`
//! - `users.messages.get` with `format=metadata` restricted to the Subject
//!   header, so message bodies are never downloaded

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{MailClient, MessageRef, subject_from_headers};
use crate::auth::MailSession;
use crate::error::QueryError;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail API message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<GmailMessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageRef {
    id: String,
    #[serde(default)]
    thread_id: String,
}

/// Gmail API message (metadata format).
#[derive(Debug, Deserialize)]
struct GmailMessage {
    payload: Option<GmailPayload>,
}

#[derive(Debug, Deserialize)]
struct GmailPayload {
    #[serde(default)]
    headers: Vec<GmailHeader>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

/// Gmail client bound to one authorized session.
pub struct GmailClient {
    session: MailSession,
    client: reqwest::Client,
    base_url: String,
}

impl GmailClient {
    pub fn new(session: MailSession) -> Self {
        Self {
            session,
            client: reqwest::Client::new(),
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    pub fn with_timeout(session: MailSession, timeout: Duration) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Http(e.to_string()))?;
        Ok(Self {
            session,
            client,
            base_url: GMAIL_API_BASE.to_string(),
        })
    }

    /// Point the client at a different API root (used against mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, QueryError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.session.access_token().expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| QueryError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => QueryError::Unauthorized {
                    status: status.as_u16(),
                    body,
                },
                _ => QueryError::BadStatus {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        response
            .json()
            .await
            .map_err(|e| QueryError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl MailClient for GmailClient {
    async fn search(&self, query: &str) -> Result<Vec<MessageRef>, QueryError> {
        let mut found = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("q", query)];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let page: MessageListResponse = self.get("/messages", &params).await?;
            found.extend(
                page.messages
                    .into_iter()
                    .map(|m| MessageRef::new(m.id, m.thread_id)),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(query, count = found.len(), "Gmail search complete");
        Ok(found)
    }

    async fn subject_of(&self, message: &MessageRef) -> Result<String, QueryError> {
        let endpoint = format!("/messages/{}", message.id);
        let msg: GmailMessage = self
            .get(
                &endpoint,
                &[("format", "metadata"), ("metadataHeaders", "Subject")],
            )
            .await?;

        let headers = msg.payload.map(|p| p.headers).unwrap_or_default();
        Ok(subject_from_headers(
            headers.iter().map(|h| (h.name.as_str(), h.value.as_str())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn session() -> MailSession {
        MailSession::new(SecretString::from("ya29.test".to_string()))
    }

    #[test]
    fn list_response_without_messages_is_empty() {
        let page: MessageListResponse =
            serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(page.messages.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn list_response_with_page_token() {
        let page: MessageListResponse = serde_json::from_str(
            r#"{"messages":[{"id":"m1","threadId":"t1"}],"nextPageToken":"p2","resultSizeEstimate":2}"#,
        )
        .unwrap();
        assert_eq!(page.messages[0].id, "m1");
        assert_eq!(page.messages[0].thread_id, "t1");
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));
    }

    #[test]
    fn metadata_message_without_payload() {
        let msg: GmailMessage = serde_json::from_str(r#"{"id":"m1"}"#).unwrap();
        assert!(msg.payload.is_none());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = GmailClient::new(session()).with_base_url("http://127.0.0.1:9/gmail/");
        assert_eq!(client.base_url, "http://127.0.0.1:9/gmail");
    }
}
