//! Outbound messaging: credentials file and the notifier abstraction.

pub mod twilio;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{ConfigError, SendError};

pub use twilio::TwilioNotifier;

/// Addressing scheme prefix for WhatsApp senders and recipients.
pub const WHATSAPP_SCHEME: &str = "whatsapp:";

/// Messaging provider credentials and the two WhatsApp endpoints.
#[derive(Clone)]
pub struct MessagingCredentials {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_whatsapp_number: String,
    pub to_whatsapp_number: String,
}

impl fmt::Debug for MessagingCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingCredentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_whatsapp_number", &self.from_whatsapp_number)
            .field("to_whatsapp_number", &self.to_whatsapp_number)
            .finish()
    }
}

#[derive(Deserialize)]
struct MessagingConfigFile {
    twilio: RawTwilioSection,
}

#[derive(Deserialize)]
struct RawTwilioSection {
    account_sid: String,
    auth_token: String,
    from_whatsapp_number: String,
    to_whatsapp_number: String,
}

/// Source of [`MessagingCredentials`], loaded only once there is something
/// to send.
#[async_trait]
pub trait MessagingConfigSource: Send + Sync {
    async fn load(&self) -> Result<MessagingCredentials, ConfigError>;
}

/// The JSON messaging config file at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonMessagingConfig {
    path: PathBuf,
}

impl JsonMessagingConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MessagingConfigSource for JsonMessagingConfig {
    async fn load(&self) -> Result<MessagingCredentials, ConfigError> {
        load_messaging_config(&self.path).await
    }
}

/// Read `{"twilio": {account_sid, auth_token, from_whatsapp_number,
/// to_whatsapp_number}}`. Every field is required.
pub async fn load_messaging_config(path: &Path) -> Result<MessagingCredentials, ConfigError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    parse_messaging_config(path, &raw)
}

pub fn parse_messaging_config(path: &Path, raw: &str) -> Result<MessagingCredentials, ConfigError> {
    let file: MessagingConfigFile =
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let section = file.twilio;

    Ok(MessagingCredentials {
        account_sid: section.account_sid,
        auth_token: SecretString::from(section.auth_token),
        from_whatsapp_number: section.from_whatsapp_number,
        to_whatsapp_number: section.to_whatsapp_number,
    })
}

/// Prefix a raw number with the WhatsApp scheme unless it already has it.
pub fn whatsapp_address(number: &str) -> String {
    let number = number.trim();
    if number.starts_with(WHATSAPP_SCHEME) {
        number.to_string()
    } else {
        format!("{WHATSAPP_SCHEME}{number}")
    }
}

/// Sends one outbound chat message and returns the provider's delivery id.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, from: &str, to: &str, body: &str) -> Result<String, SendError>;
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    const VALID: &str = r#"{
        "twilio": {
            "account_sid": "AC0123",
            "auth_token": "tok",
            "from_whatsapp_number": "+14155238886",
            "to_whatsapp_number": "+34600111222"
        }
    }"#;

    fn path() -> PathBuf {
        PathBuf::from("twilio_conf.json")
    }

    #[test]
    fn parses_nested_twilio_section() {
        let creds = parse_messaging_config(&path(), VALID).unwrap();
        assert_eq!(creds.account_sid, "AC0123");
        assert_eq!(creds.auth_token.expose_secret(), "tok");
        assert_eq!(creds.from_whatsapp_number, "+14155238886");
        assert_eq!(creds.to_whatsapp_number, "+34600111222");
    }

    #[test]
    fn missing_provider_key_is_error() {
        let err = parse_messaging_config(&path(), r#"{"account_sid": "AC0123"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn missing_field_is_error() {
        let raw = r#"{"twilio": {"account_sid": "AC", "auth_token": "t", "from_whatsapp_number": "+1"}}"#;
        let err = parse_messaging_config(&path(), raw).unwrap_err();
        assert!(err.to_string().contains("to_whatsapp_number"));
    }

    #[test]
    fn wrong_type_is_error() {
        let raw = r#"{"twilio": {"account_sid": 12, "auth_token": "t", "from_whatsapp_number": "+1", "to_whatsapp_number": "+2"}}"#;
        assert!(parse_messaging_config(&path(), raw).is_err());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_messaging_config(&dir.path().join("twilio_conf.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[tokio::test]
    async fn json_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("twilio_conf.json");
        std::fs::write(&file, VALID).unwrap();
        let creds = JsonMessagingConfig::new(&file).load().await.unwrap();
        assert_eq!(creds.account_sid, "AC0123");
    }

    #[test]
    fn debug_redacts_auth_token() {
        let creds = parse_messaging_config(&path(), VALID).unwrap();
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("AC0123"));
        assert!(!rendered.contains("\"tok\""));
    }

    #[test]
    fn whatsapp_prefix() {
        assert_eq!(whatsapp_address("+14155238886"), "whatsapp:+14155238886");
        assert_eq!(whatsapp_address("whatsapp:+1415"), "whatsapp:+1415");
        assert_eq!(whatsapp_address(" +1415 "), "whatsapp:+1415");
    }
}
