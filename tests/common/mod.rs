//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use bill_inbox::error::{LlmError, MailboxError};
use bill_inbox::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use bill_inbox::pipeline::{Attachment, Email, Mailbox};

/// Build a minimal PDF with one page per entry in `pages`.
pub fn make_pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::dictionary;
    use lopdf::{Document, Object, Stream};

    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let kids: Vec<Object> = pages
        .iter()
        .map(|text| -> Object {
            let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            })
            .into()
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

pub fn pdf_attachment(file_name: &str, text: &str) -> Attachment {
    Attachment {
        file_name: file_name.into(),
        content: make_pdf(&[text]),
    }
}

pub fn email(uid: &str, subject: &str, attachments: Vec<Attachment>) -> Email {
    Email {
        uid: uid.into(),
        subject: subject.into(),
        content: Some("Your bill is attached.".into()),
        attachments,
    }
}

/// In-memory mailbox. Optionally parks each fetch until released.
pub struct MemoryMailbox {
    emails: Mutex<Vec<Email>>,
    pub fetches: Mutex<usize>,
    pub marked: Mutex<Vec<String>>,
    gate: Option<(Notify, Notify)>,
}

impl MemoryMailbox {
    pub fn new(emails: Vec<Email>) -> Self {
        Self {
            emails: Mutex::new(emails),
            fetches: Mutex::new(0),
            marked: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Every fetch signals `started` and then waits for `release`.
    pub fn gated() -> Self {
        Self {
            gate: Some((Notify::new(), Notify::new())),
            ..Self::new(Vec::new())
        }
    }

    pub async fn wait_started(&self) {
        if let Some((started, _)) = &self.gate {
            started.notified().await;
        }
    }

    pub fn release(&self) {
        if let Some((_, release)) = &self.gate {
            release.notify_one();
        }
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn fetch_unseen(&self, _cancel: &CancellationToken) -> Result<Vec<Email>, MailboxError> {
        *self.fetches.lock().unwrap() += 1;
        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }
        let marked = self.marked.lock().unwrap().clone();
        Ok(self
            .emails
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !marked.contains(&e.uid))
            .cloned()
            .collect())
    }

    async fn mark_seen(&self, uids: &[String]) -> Result<(), MailboxError> {
        self.marked.lock().unwrap().extend_from_slice(uids);
        Ok(())
    }
}

/// Stub LLM provider that returns a canned reply (no real API calls).
pub struct StubLlm {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl StubLlm {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);
        Ok(CompletionResponse {
            content: self.reply.clone(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}
