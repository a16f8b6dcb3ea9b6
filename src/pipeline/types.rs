//! Shared types for the bill extraction pipeline.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{MailboxError, NotifyError};

// ── Inbound mail ────────────────────────────────────────────────────

/// An unseen email fetched from the mailbox.
#[derive(Debug, Clone)]
pub struct Email {
    /// Mailbox-native identifier used to mark the email seen.
    pub uid: String,
    pub subject: String,
    /// Plain-text body, if the email had one.
    pub content: Option<String>,
    /// PDF attachments in the order they appear in the email.
    pub attachments: Vec<Attachment>,
}

/// A binary file carried by an email (a PDF bill).
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content: Vec<u8>,
}

// ── Extracted bill ──────────────────────────────────────────────────

/// A bill record extracted from one attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub subject: String,
    pub company: String,
    /// Due date (no time component).
    pub date: NaiveDate,
    pub amount: Decimal,
}

// ── Run report ──────────────────────────────────────────────────────

/// Result of delivering one `Message` to the notification sink.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub message: Message,
    /// `None` on success, the failure text otherwise.
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a finished pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Number of unseen emails fetched.
    pub emails: usize,
    /// Number of attachments submitted to the model.
    pub attachments: usize,
    /// Attachments dropped because they were not readable PDFs.
    pub skipped_attachments: Vec<String>,
    /// One entry per notification attempt, in send order.
    pub deliveries: Vec<DeliveryOutcome>,
}

impl RunReport {
    pub fn empty(run_id: Uuid) -> Self {
        Self {
            run_id,
            emails: 0,
            attachments: 0,
            skipped_attachments: Vec::new(),
            deliveries: Vec::new(),
        }
    }

    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.delivered()
    }
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Source of unseen emails. Pure I/O, no extraction logic.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Fetch every unseen email without flagging it seen.
    async fn fetch_unseen(&self, cancel: &CancellationToken) -> Result<Vec<Email>, MailboxError>;

    /// Flag the given emails as seen so later runs skip them.
    ///
    /// Takes no cancellation token: once an email's bills have gone out, the
    /// flag must be written even if the run is being cancelled.
    async fn mark_seen(&self, uids: &[String]) -> Result<(), MailboxError>;
}

/// Destination for extracted bills, one record at a time.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink name for logging.
    fn name(&self) -> &str;

    async fn send(&self, message: &Message, cancel: &CancellationToken) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bill(subject: &str) -> Message {
        Message {
            subject: subject.into(),
            company: "PowerCo".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            amount: dec!(120.00),
        }
    }

    #[test]
    fn report_counts_delivered_and_failed() {
        let mut report = RunReport::empty(Uuid::new_v4());
        report.deliveries = vec![
            DeliveryOutcome {
                message: bill("a"),
                error: None,
            },
            DeliveryOutcome {
                message: bill("b"),
                error: Some("status 500".into()),
            },
            DeliveryOutcome {
                message: bill("c"),
                error: None,
            },
        ];
        assert_eq!(report.delivered(), 2);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn message_serializes_date_as_iso() {
        let json = serde_json::to_value(bill("Electricity")).unwrap();
        assert_eq!(json["date"], "2024-03-01");
        assert_eq!(json["company"], "PowerCo");
    }
}
