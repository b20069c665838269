//! Mailbox search and subject lookup.

pub mod gmail;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::QueryError;

pub use gmail::GmailClient;

/// Placeholder used when a message carries no usable subject.
pub const NO_SUBJECT: &str = "No Subject";

/// One matched message, as returned by the search step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

impl MessageRef {
    pub fn new(id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
        }
    }
}

/// Read-only access to a mailbox.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// All messages matching `query`, in provider order. Empty when nothing
    /// matches.
    async fn search(&self, query: &str) -> Result<Vec<MessageRef>, QueryError>;

    /// Subject header of `message`, or [`NO_SUBJECT`].
    async fn subject_of(&self, message: &MessageRef) -> Result<String, QueryError>;
}

/// Search filter for alerts from `sender` received on or after `date`.
pub fn alert_query(sender: &str, date: NaiveDate) -> String {
    format!("from:{sender} after:{}", date.format("%Y/%m/%d"))
}

/// [`alert_query`] for the local calendar date.
pub fn todays_alert_query(sender: &str) -> String {
    alert_query(sender, chrono::Local::now().date_naive())
}

/// Pick the subject out of `(name, value)` header pairs. Header names match
/// case-insensitively; a missing or blank subject yields [`NO_SUBJECT`].
pub fn subject_from_headers<'a, I>(headers: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("subject"))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(NO_SUBJECT)
        .to_string()
}
