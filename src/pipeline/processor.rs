//! Inbox processor. One run turns every unseen email into bill notifications.
//!
//! Flow:
//! 1. Fetch unseen emails (no work → done)
//! 2. Extract text from every PDF attachment, email order then attachment order
//! 3. One prompt, one model call, one parse for the whole batch
//! 4. Notify the sink once per bill, best-effort, marking each email seen
//!    once all of its bills have been attempted

use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{MailboxError, PipelineError};
use crate::extraction::{BillExtractor, ExtractedDocument, build_prompt, parse_bills};
use crate::pipeline::types::{
    Attachment, DeliveryOutcome, Mailbox, NotificationSink, RunReport,
};

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    FetchingMail,
    NoWork,
    ExtractingText,
    Prompting,
    Invoking,
    Parsing,
    Notifying,
}

impl RunState {
    /// Short label for logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FetchingMail => "fetching mail",
            Self::NoWork => "no work",
            Self::ExtractingText => "extracting text",
            Self::Prompting => "prompting",
            Self::Invoking => "invoking",
            Self::Parsing => "parsing",
            Self::Notifying => "notifying",
        }
    }
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Orchestrates mailbox → extraction → notification for one run at a time.
pub struct InboxProcessor {
    mailbox: Arc<dyn Mailbox>,
    extractor: BillExtractor,
    sink: Arc<dyn NotificationSink>,
    today: Clock,
}

impl InboxProcessor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        extractor: BillExtractor,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            mailbox,
            extractor,
            sink,
            today: Arc::new(|| chrono::Local::now().date_naive()),
        }
    }

    /// Override the source of "today" used for the date default.
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    /// Execute one full run.
    ///
    /// Fails on the first fatal stage error. Notification failures are
    /// recorded in the report and do not stop later notifications.
    pub async fn process(&self, cancel: &CancellationToken) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let result = self
            .run(run_id, cancel)
            .instrument(info_span!("inbox_run", %run_id))
            .await;

        if let Err(ref e) = result {
            error!(%run_id, error = %e, "Inbox run failed");
        }
        result
    }

    async fn run(&self, run_id: Uuid, cancel: &CancellationToken) -> Result<RunReport, PipelineError> {
        let mut state = RunState::Idle;

        advance(&mut state, RunState::FetchingMail, cancel)?;
        let emails = self
            .mailbox
            .fetch_unseen(cancel)
            .await
            .map_err(|e| mailbox_error(e, state))?;

        if emails.is_empty() {
            advance(&mut state, RunState::NoWork, cancel)?;
            info!("No unseen emails");
            return Ok(RunReport::empty(run_id));
        }

        let mut report = RunReport::empty(run_id);
        report.emails = emails.len();

        advance(&mut state, RunState::ExtractingText, cancel)?;
        let uids: Vec<String> = emails.iter().map(|e| e.uid.clone()).collect();
        let attachments: Vec<(String, Attachment)> = emails
            .into_iter()
            .flat_map(|email| {
                debug!(
                    uid = %email.uid,
                    subject = %email.subject,
                    attachments = email.attachments.len(),
                    "Queued email attachments"
                );
                let uid = email.uid;
                email
                    .attachments
                    .into_iter()
                    .map(move |attachment| (uid.clone(), attachment))
            })
            .collect();

        let (doc_uids, documents): (Vec<String>, Vec<ExtractedDocument>) = self
            .extract_documents(attachments, &mut report.skipped_attachments)
            .await?
            .into_iter()
            .unzip();

        // Emails with nothing to extract are done once extraction succeeds.
        let without_bills: Vec<String> = uids
            .iter()
            .filter(|uid| !doc_uids.contains(uid))
            .cloned()
            .collect();

        if documents.is_empty() {
            info!(emails = report.emails, "No readable PDF attachments in unseen emails");
            self.mark_seen(&without_bills, state).await?;
            state = RunState::Idle;
            debug!(state = state.label(), "Run finished");
            return Ok(report);
        }
        report.attachments = documents.len();

        advance(&mut state, RunState::Prompting, cancel)?;
        let today = (self.today)();
        let prompt = build_prompt(&documents, today);

        advance(&mut state, RunState::Invoking, cancel)?;
        let reply = self
            .extractor
            .invoke(self.extractor.request(prompt), cancel)
            .await?;

        advance(&mut state, RunState::Parsing, cancel)?;
        let messages = parse_bills(&reply, documents.len(), today).inspect_err(|e| {
            warn!(error = %e, raw_reply = %reply, "Extraction reply rejected");
        })?;

        self.mark_seen(&without_bills, state).await?;

        // Bills arrive grouped by email, so an email is finished when the
        // next bill belongs to a different one. Cancellation leaves every
        // unfinished email unseen.
        advance(&mut state, RunState::Notifying, cancel)?;
        for (i, (message, uid)) in messages.into_iter().zip(&doc_uids).enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    stage: state.label(),
                });
            }

            let error = match self.sink.send(&message, cancel).await {
                Ok(()) => {
                    info!(
                        sink = self.sink.name(),
                        company = %message.company,
                        amount = %message.amount,
                        date = %message.date,
                        "Bill notification sent"
                    );
                    None
                }
                Err(e) => {
                    warn!(
                        sink = self.sink.name(),
                        company = %message.company,
                        error = %e,
                        "Bill notification failed"
                    );
                    Some(e.to_string())
                }
            };
            report.deliveries.push(DeliveryOutcome { message, error });

            if doc_uids.get(i + 1) != Some(uid) {
                self.mark_seen(std::slice::from_ref(uid), state).await?;
            }
        }

        state = RunState::Idle;
        info!(
            state = state.label(),
            emails = report.emails,
            attachments = report.attachments,
            skipped = report.skipped_attachments.len(),
            delivered = report.delivered(),
            failed = report.failed(),
            "Inbox run complete"
        );
        Ok(report)
    }

    /// Extract every attachment in parallel, keeping input order and each
    /// document's email uid.
    async fn extract_documents(
        &self,
        attachments: Vec<(String, Attachment)>,
        skipped: &mut Vec<String>,
    ) -> Result<Vec<(String, ExtractedDocument)>, PipelineError> {
        let skip_unreadable = self.extractor.config().skip_unreadable;

        let results = futures::future::join_all(attachments.into_iter().map(
            |(uid, attachment)| async move {
                let file_name = attachment.file_name.clone();
                (uid, file_name, ExtractedDocument::from_attachment(attachment).await)
            },
        ))
        .await;

        let mut documents = Vec::with_capacity(results.len());
        for (uid, file_name, result) in results {
            match result {
                Ok(doc) => {
                    debug!(uid = %uid, file_name = %doc.file_name, chars = doc.text.len(), "Extracted attachment text");
                    documents.push((uid, doc));
                }
                Err(e) if skip_unreadable => {
                    warn!(file_name = %file_name, error = %e, "Skipping unreadable attachment");
                    skipped.push(file_name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(documents)
    }

    async fn mark_seen(&self, uids: &[String], state: RunState) -> Result<(), PipelineError> {
        if uids.is_empty() {
            return Ok(());
        }
        self.mailbox
            .mark_seen(uids)
            .await
            .map_err(|e| mailbox_error(e, state))?;
        debug!(?uids, "Emails marked seen");
        Ok(())
    }
}

/// Move to the next state, honoring cancellation at the boundary.
fn advance(
    state: &mut RunState,
    next: RunState,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled {
            stage: next.label(),
        });
    }
    debug!(from = state.label(), to = next.label(), "Run state transition");
    *state = next;
    Ok(())
}

fn mailbox_error(e: MailboxError, state: RunState) -> PipelineError {
    match e {
        MailboxError::Cancelled => PipelineError::Cancelled {
            stage: state.label(),
        },
        other => PipelineError::Mailbox(other),
    }
}
