//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::mail::gmail::GMAIL_API_BASE;
use crate::messaging::twilio::TWILIO_API_BASE;

/// Sender address of Keepa price-alert notifications.
pub const DEFAULT_ALERT_SENDER: &str = "pricealert@keepa.com";

/// What the relay does when one outbound message fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendFailurePolicy {
    /// Stop at the first failed send.
    #[default]
    Abort,
    /// Log the failure, keep sending, and fail the run at the end.
    Continue,
}

impl FromStr for SendFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(ConfigError::InvalidValue {
                key: "KEEPA_RELAY_ON_SEND_FAILURE".to_string(),
                message: format!("expected 'abort' or 'continue', got '{other}'"),
            }),
        }
    }
}

/// Relay configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Cached OAuth token (read, and rewritten when it changes).
    pub token_path: PathBuf,
    /// OAuth client descriptor, only read when consent is required.
    pub client_secret_path: PathBuf,
    /// Twilio credentials and WhatsApp numbers.
    pub messaging_config_path: PathBuf,
    /// Mail sender whose messages are relayed.
    pub alert_sender: String,
    pub on_send_failure: SendFailurePolicy,
    /// Overall timeout applied to every HTTP request.
    pub http_timeout: Duration,
    /// Gmail REST root, up to and including `users/me`.
    pub gmail_api_base: String,
    pub twilio_api_base: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from("token.json"),
            client_secret_path: PathBuf::from("credentials.json"),
            messaging_config_path: PathBuf::from("twilio_conf.json"),
            alert_sender: DEFAULT_ALERT_SENDER.to_string(),
            on_send_failure: SendFailurePolicy::Abort,
            http_timeout: Duration::from_secs(30),
            gmail_api_base: GMAIL_API_BASE.to_string(),
            twilio_api_base: TWILIO_API_BASE.to_string(),
        }
    }
}

impl RelayConfig {
    /// Build config from `KEEPA_RELAY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup; unset keys fall back
    /// to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let path = |key: &str, default: PathBuf| {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
        };

        let on_send_failure = match lookup("KEEPA_RELAY_ON_SEND_FAILURE") {
            Some(raw) => raw.parse()?,
            None => defaults.on_send_failure,
        };

        let http_timeout = match lookup("KEEPA_RELAY_HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: "KEEPA_RELAY_HTTP_TIMEOUT_SECS".to_string(),
                        message: format!("expected a positive number of seconds, got '{raw}'"),
                    })?;
                Duration::from_secs(secs)
            }
            None => defaults.http_timeout,
        };

        Ok(Self {
            token_path: path("KEEPA_RELAY_TOKEN_PATH", defaults.token_path),
            client_secret_path: path("KEEPA_RELAY_CLIENT_SECRET_PATH", defaults.client_secret_path),
            messaging_config_path: path(
                "KEEPA_RELAY_MESSAGING_CONFIG_PATH",
                defaults.messaging_config_path,
            ),
            alert_sender: text("KEEPA_RELAY_ALERT_SENDER", defaults.alert_sender),
            on_send_failure,
            http_timeout,
            gmail_api_base: text("KEEPA_RELAY_GMAIL_API_BASE", defaults.gmail_api_base),
            twilio_api_base: text("KEEPA_RELAY_TWILIO_API_BASE", defaults.twilio_api_base),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = RelayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.token_path, PathBuf::from("token.json"));
        assert_eq!(config.client_secret_path, PathBuf::from("credentials.json"));
        assert_eq!(config.messaging_config_path, PathBuf::from("twilio_conf.json"));
        assert_eq!(config.alert_sender, "pricealert@keepa.com");
        assert_eq!(config.on_send_failure, SendFailurePolicy::Abort);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.gmail_api_base, GMAIL_API_BASE);
        assert_eq!(config.twilio_api_base, TWILIO_API_BASE);
    }

    #[test]
    fn overrides_from_lookup() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("KEEPA_RELAY_TOKEN_PATH", "/var/lib/relay/token.json"),
            ("KEEPA_RELAY_ALERT_SENDER", " alerts@example.com "),
            ("KEEPA_RELAY_ON_SEND_FAILURE", "Continue"),
            ("KEEPA_RELAY_HTTP_TIMEOUT_SECS", "5"),
            ("KEEPA_RELAY_GMAIL_API_BASE", "http://127.0.0.1:8080/gmail"),
            ("KEEPA_RELAY_TWILIO_API_BASE", "http://127.0.0.1:8080"),
        ]))
        .unwrap();
        assert_eq!(config.token_path, PathBuf::from("/var/lib/relay/token.json"));
        assert_eq!(config.alert_sender, "alerts@example.com");
        assert_eq!(config.on_send_failure, SendFailurePolicy::Continue);
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.gmail_api_base, "http://127.0.0.1:8080/gmail");
        assert_eq!(config.twilio_api_base, "http://127.0.0.1:8080");
    }

    #[test]
    fn blank_path_falls_back_to_default() {
        let config =
            RelayConfig::from_lookup(lookup_from(&[("KEEPA_RELAY_TOKEN_PATH", "  ")])).unwrap();
        assert_eq!(config.token_path, PathBuf::from("token.json"));
    }

    #[test]
    fn unknown_policy_rejected() {
        let err = RelayConfig::from_lookup(lookup_from(&[(
            "KEEPA_RELAY_ON_SEND_FAILURE",
            "retry",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn non_numeric_timeout_rejected() {
        let err = RelayConfig::from_lookup(lookup_from(&[(
            "KEEPA_RELAY_HTTP_TIMEOUT_SECS",
            "soon",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("KEEPA_RELAY_HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = RelayConfig::from_lookup(lookup_from(&[("KEEPA_RELAY_HTTP_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "KEEPA_RELAY_HTTP_TIMEOUT_SECS"
        ));
    }
}
