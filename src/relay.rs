//! The relay run: search today's alerts and forward each one.

use std::io::Write;

use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::config::{RelayConfig, SendFailurePolicy};
use crate::error::{Error, Result, SendError};
use crate::mail::{GmailClient, MailClient, MessageRef, todays_alert_query};
use crate::messaging::{
    JsonMessagingConfig, MessagingConfigSource, MessagingCredentials, Notifier, TwilioNotifier,
};

/// Printed once when the search finds nothing.
pub const NO_MESSAGES_NOTICE: &str = "No Keepa messages found.";

/// Outbound message text for one alert.
pub fn alert_body(subject: &str) -> String {
    format!("You have received a Keepa deal for product: {subject}")
}

/// Confirmation line printed after each successful send.
pub fn confirmation_line(sid: &str, message_id: &str, subject: &str) -> String {
    format!("WhatsApp message sent: {sid} for email with ID: {message_id} and subject: {subject}")
}

/// One alert that went out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub subject: String,
    pub sid: String,
}

/// One alert whose send failed (only recorded under
/// [`SendFailurePolicy::Continue`]).
#[derive(Debug)]
pub struct FailedDelivery {
    pub message_id: String,
    pub subject: String,
    pub error: SendError,
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct RelayReport {
    /// Number of messages the search matched.
    pub found: usize,
    pub delivered: Vec<Delivery>,
    pub failed: Vec<FailedDelivery>,
}

impl RelayReport {
    /// `Err(PartialDelivery)` if any send failed.
    pub fn into_result(self) -> Result<Self> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(Error::PartialDelivery {
                failed: self.failed.len(),
                total: self.found,
            })
        }
    }
}

/// Query → (early exit | load messaging config → notify each match).
pub struct Relay<'a> {
    mail: &'a dyn MailClient,
    messaging: &'a dyn MessagingConfigSource,
    query: String,
    policy: SendFailurePolicy,
}

impl<'a> Relay<'a> {
    pub fn new(
        mail: &'a dyn MailClient,
        messaging: &'a dyn MessagingConfigSource,
        query: impl Into<String>,
    ) -> Self {
        Self {
            mail,
            messaging,
            query: query.into(),
            policy: SendFailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SendFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the relay. `make_notifier` is only called once at least one
    /// message matched and the messaging config loaded.
    pub async fn run<F, N, W>(&self, make_notifier: F, out: &mut W) -> Result<RelayReport>
    where
        F: FnOnce(&MessagingCredentials) -> std::result::Result<N, SendError>,
        N: Notifier,
        W: Write,
    {
        info!(query = %self.query, "Searching mailbox");
        let messages = self.mail.search(&self.query).await?;

        if messages.is_empty() {
            writeln!(out, "{NO_MESSAGES_NOTICE}")?;
            return Ok(RelayReport::default());
        }

        info!(count = messages.len(), "Found matching alerts");

        let credentials = self.messaging.load().await?;
        let notifier = make_notifier(&credentials)?;

        let mut report = RelayReport {
            found: messages.len(),
            ..RelayReport::default()
        };

        for message in &messages {
            self.relay_one(message, &credentials, &notifier, &mut report, out)
                .await?;
        }

        Ok(report)
    }

    async fn relay_one<N: Notifier, W: Write>(
        &self,
        message: &MessageRef,
        credentials: &MessagingCredentials,
        notifier: &N,
        report: &mut RelayReport,
        out: &mut W,
    ) -> Result<()> {
        let subject = self.mail.subject_of(message).await?;
        let body = alert_body(&subject);

        match notifier
            .notify(
                &credentials.from_whatsapp_number,
                &credentials.to_whatsapp_number,
                &body,
            )
            .await
        {
            Ok(sid) => {
                writeln!(out, "{}", confirmation_line(&sid, &message.id, &subject))?;
                report.delivered.push(Delivery {
                    message_id: message.id.clone(),
                    subject,
                    sid,
                });
            }
            Err(error) => match self.policy {
                SendFailurePolicy::Abort => return Err(error.into()),
                SendFailurePolicy::Continue => {
                    warn!(message_id = %message.id, error = %error, "Send failed, continuing");
                    report.failed.push(FailedDelivery {
                        message_id: message.id.clone(),
                        subject,
                        error,
                    });
                }
            },
        }

        Ok(())
    }
}

/// Full production run: authenticate against Gmail, then relay today's
/// alerts through Twilio, writing confirmations to `out`.
pub async fn run<W: Write>(config: &RelayConfig, out: &mut W) -> Result<RelayReport> {
    let authenticator = Authenticator::new(
        &config.token_path,
        &config.client_secret_path,
        config.http_timeout,
    );
    run_with(config, &authenticator, out).await
}

/// [`run`] with a caller-supplied authenticator. Nothing is written to `out`
/// unless authorization succeeds.
pub async fn run_with<W: Write>(
    config: &RelayConfig,
    authenticator: &Authenticator,
    out: &mut W,
) -> Result<RelayReport> {
    let session = authenticator.authorize().await?;

    let mail = GmailClient::with_timeout(session, config.http_timeout)?
        .with_base_url(&config.gmail_api_base);
    let messaging = JsonMessagingConfig::new(&config.messaging_config_path);
    let query = todays_alert_query(&config.alert_sender);
    let timeout = config.http_timeout;
    let twilio_base = config.twilio_api_base.as_str();

    let report = Relay::new(&mail, &messaging, query)
        .with_policy(config.on_send_failure)
        .run(
            |credentials| {
                TwilioNotifier::with_timeout(credentials.clone(), timeout)
                    .map(|notifier| notifier.with_base_url(twilio_base))
            },
            out,
        )
        .await?;

    info!(
        found = report.found,
        delivered = report.delivered.len(),
        failed = report.failed.len(),
        "Relay run complete"
    );
    report.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_embeds_subject() {
        assert_eq!(
            alert_body("Echo Dot"),
            "You have received a Keepa deal for product: Echo Dot"
        );
    }

    #[test]
    fn confirmation_includes_sid_id_and_subject() {
        let line = confirmation_line("SM123", "m1", "Deal A");
        assert!(line.contains("SM123"));
        assert!(line.contains("m1"));
        assert!(line.contains("Deal A"));
    }

    #[test]
    fn report_with_failures_is_partial_delivery() {
        let report = RelayReport {
            found: 2,
            delivered: vec![],
            failed: vec![FailedDelivery {
                message_id: "m1".to_string(),
                subject: "x".to_string(),
                error: SendError::RateLimited,
            }],
        };
        assert!(matches!(
            report.into_result(),
            Err(Error::PartialDelivery { failed: 1, total: 2 })
        ));
    }

    #[test]
    fn clean_report_is_ok() {
        assert!(RelayReport::default().into_result().is_ok());
    }
}
