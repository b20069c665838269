//! Twilio Messages API notifier (WhatsApp).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::{MessagingCredentials, Notifier, whatsapp_address};
use crate::error::SendError;

pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

/// Twilio's JSON error body.
#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

/// Sends WhatsApp messages through Twilio with HTTP basic auth.
pub struct TwilioNotifier {
    credentials: MessagingCredentials,
    client: reqwest::Client,
    base_url: String,
}

impl TwilioNotifier {
    pub fn new(credentials: MessagingCredentials) -> Self {
        Self {
            credentials,
            client: reqwest::Client::new(),
            base_url: TWILIO_API_BASE.to_string(),
        }
    }

    pub fn with_timeout(
        credentials: MessagingCredentials,
        timeout: Duration,
    ) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SendError::Http(e.to_string()))?;
        Ok(Self {
            credentials,
            client,
            base_url: TWILIO_API_BASE.to_string(),
        })
    }

    /// Point the notifier at a different API root (used against mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.credentials.account_sid
        )
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn notify(&self, from: &str, to: &str, body: &str) -> Result<String, SendError> {
        let from = whatsapp_address(from);
        let to = whatsapp_address(to);
        let form = [("Body", body), ("From", from.as_str()), ("To", to.as_str())];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.credentials.account_sid,
                Some(self.credentials.auth_token.expose_secret()),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| SendError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &raw));
        }

        let message: MessageResource = response
            .json()
            .await
            .map_err(|e| SendError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            sid = %message.sid,
            status = message.status.as_deref().unwrap_or("unknown"),
            to = %to,
            "WhatsApp message accepted"
        );
        Ok(message.sid)
    }
}

fn classify_failure(status: StatusCode, raw: &str) -> SendError {
    let parsed: Option<TwilioErrorBody> = serde_json::from_str(raw).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_else(|| raw.to_string());

    match status {
        StatusCode::UNAUTHORIZED => SendError::AuthFailed(message),
        StatusCode::TOO_MANY_REQUESTS => SendError::RateLimited,
        _ => SendError::Rejected {
            status: status.as_u16(),
            code: parsed.and_then(|b| b.code),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn creds() -> MessagingCredentials {
        MessagingCredentials {
            account_sid: "AC0123".to_string(),
            auth_token: SecretString::from("tok".to_string()),
            from_whatsapp_number: "+14155238886".to_string(),
            to_whatsapp_number: "+34600111222".to_string(),
        }
    }

    #[test]
    fn messages_url_embeds_account() {
        let notifier = TwilioNotifier::new(creds()).with_base_url("http://127.0.0.1:1/");
        assert_eq!(
            notifier.messages_url(),
            "http://127.0.0.1:1/2010-04-01/Accounts/AC0123/Messages.json"
        );
    }

    #[test]
    fn unauthorized_maps_to_auth_failed() {
        let err = classify_failure(
            StatusCode::UNAUTHORIZED,
            r#"{"code": 20003, "message": "Authenticate", "status": 401}"#,
        );
        assert!(matches!(err, SendError::AuthFailed(m) if m == "Authenticate"));
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, SendError::RateLimited));
    }

    #[test]
    fn invalid_recipient_keeps_twilio_code() {
        let err = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"code": 21211, "message": "The 'To' number is not a valid phone number.", "more_info": "https://www.twilio.com/docs/errors/21211", "status": 400}"#,
        );
        match err {
            SendError::Rejected {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, Some(21211));
                assert!(message.contains("not a valid phone number"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_kept_verbatim() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            err,
            SendError::Rejected { status: 502, code: None, ref message } if message == "upstream down"
        ));
    }
}
