//! IMAP mailbox: fetches unseen emails with PDF attachments over TLS.
//!
//! Raw IMAP over rustls, run on the blocking pool. Fetches use
//! `BODY.PEEK[]` so reading never sets `\Seen`; the pipeline flags emails
//! explicitly through [`Mailbox::mark_seen`] once their bills have been
//! sent.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mail_parser::{MessageParser, MimeHeaders};
use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{env_parse_or, env_required};
use crate::error::{ConfigError, MailboxError};
use crate::pipeline::types::{Attachment, Email, Mailbox};

// ── Configuration ───────────────────────────────────────────────────

/// IMAP mailbox configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub folder: String,
    pub timeout_secs: u64,
}

impl MailboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_required("BILL_IMAP_HOST")?,
            port: env_parse_or("BILL_IMAP_PORT", 993)?,
            username: env_required("BILL_IMAP_USERNAME")?,
            password: SecretString::from(env_required("BILL_IMAP_PASSWORD")?),
            folder: std::env::var("BILL_IMAP_FOLDER").unwrap_or_else(|_| "INBOX".to_string()),
            timeout_secs: env_parse_or("BILL_IMAP_TIMEOUT_SECS", 30)?,
        })
    }
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// `Mailbox` implementation backed by an IMAP server.
pub struct ImapMailbox {
    config: MailboxConfig,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn fetch_unseen(&self, cancel: &CancellationToken) -> Result<Vec<Email>, MailboxError> {
        let cfg = self.config.clone();
        let task = tokio::task::spawn_blocking(move || fetch_unseen_imap(&cfg));

        // PEEK fetches leave flags untouched, so the task may be abandoned.
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(MailboxError::Cancelled),
            joined = task => joined.map_err(|e| MailboxError::Command {
                command: "FETCH".into(),
                reason: format!("fetch task panicked: {e}"),
            })?,
        }
    }

    async fn mark_seen(&self, uids: &[String]) -> Result<(), MailboxError> {
        if uids.is_empty() {
            return Ok(());
        }

        let cfg = self.config.clone();
        let uids = uids.to_vec();
        // STORE runs to completion once started.
        tokio::task::spawn_blocking(move || mark_seen_imap(&cfg, &uids))
            .await
            .map_err(|e| MailboxError::Command {
                command: "STORE".into(),
                reason: format!("store task panicked: {e}"),
            })?
    }
}

// ── IMAP session ────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Untagged lines plus any literals the server sent with them.
struct ImapResponse {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

/// A logged-out-on-every-path IMAP connection.
struct ImapSession {
    stream: TlsStream,
    next_tag: u32,
}

impl ImapSession {
    fn connect(config: &MailboxConfig) -> Result<Self, MailboxError> {
        let connect_err = |reason: String| MailboxError::Connect {
            host: config.host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .map_err(|e| connect_err(e.to_string()))?;
        let timeout = Some(Duration::from_secs(config.timeout_secs));
        tcp.set_read_timeout(timeout)?;
        tcp.set_write_timeout(timeout)?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name =
            ServerName::try_from(config.host.clone()).map_err(|e| connect_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| connect_err(e.to_string()))?;

        let mut session = Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(connect_err(format!("unexpected greeting: {}", greeting.trim())));
        }
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte)? {
                0 => {
                    return Err(MailboxError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "IMAP connection closed",
                    )));
                }
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
            }
        }
    }

    /// Send one tagged command and collect its response.
    fn command(&mut self, cmd: &str) -> Result<ImapResponse, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let tag_prefix = format!("{tag} ");
        let mut response = ImapResponse {
            lines: Vec::new(),
            literals: Vec::new(),
        };

        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_len(&line) {
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                response.literals.push(literal);
                response.lines.push(line);
                continue;
            }
            if let Some(status) = line.strip_prefix(&tag_prefix) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(MailboxError::Command {
                    command: command_name(cmd).to_string(),
                    reason: status.trim().to_string(),
                });
            }
            response.lines.push(line);
        }
    }

    fn login(&mut self, config: &MailboxConfig) -> Result<(), MailboxError> {
        self.command(&format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        ))
        .map(|_| ())
        .map_err(|_| MailboxError::AuthFailed {
            username: config.username.clone(),
        })
    }

    fn select(&mut self, folder: &str) -> Result<(), MailboxError> {
        self.command(&format!("SELECT {}", quote(folder))).map(|_| ())
    }

    fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError> {
        let response = self.command("UID SEARCH UNSEEN")?;
        Ok(parse_search(&response.lines))
    }

    fn fetch_raw(&mut self, uid: &str) -> Result<Option<Vec<u8>>, MailboxError> {
        let response = self.command(&format!("UID FETCH {uid} (BODY.PEEK[])"))?;
        Ok(response.literals.into_iter().next())
    }

    fn store_seen(&mut self, uids: &[String]) -> Result<(), MailboxError> {
        self.command(&format!("UID STORE {} +FLAGS.SILENT (\\Seen)", uids.join(",")))
            .map(|_| ())
    }

    fn logout(mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!("IMAP logout did not complete cleanly: {e}");
        }
    }
}

/// Open a session, run `f`, and log out whether or not `f` succeeded.
fn with_session<T>(
    config: &MailboxConfig,
    f: impl FnOnce(&mut ImapSession) -> Result<T, MailboxError>,
) -> Result<T, MailboxError> {
    let mut session = ImapSession::connect(config)?;
    let result = session
        .login(config)
        .and_then(|()| session.select(&config.folder))
        .and_then(|()| f(&mut session));
    session.logout();
    result
}

/// Fetch every unseen email (blocking, run in spawn_blocking).
fn fetch_unseen_imap(config: &MailboxConfig) -> Result<Vec<Email>, MailboxError> {
    with_session(config, |session| {
        let uids = session.search_unseen()?;
        debug!(count = uids.len(), folder = %config.folder, "Unseen emails found");

        let mut emails = Vec::with_capacity(uids.len());
        for uid in uids {
            let Some(raw) = session.fetch_raw(&uid)? else {
                warn!(uid = %uid, "FETCH returned no message body");
                continue;
            };
            match email_from_raw(&uid, &raw) {
                Some(email) => emails.push(email),
                None => warn!(uid = %uid, "Could not parse email, leaving it unseen"),
            }
        }

        info!(count = emails.len(), host = %config.host, "Fetched unseen emails");
        Ok(emails)
    })
}

/// Flag emails seen (blocking, run in spawn_blocking).
fn mark_seen_imap(config: &MailboxConfig, uids: &[String]) -> Result<(), MailboxError> {
    with_session(config, |session| {
        session.store_seen(uids)?;
        debug!(count = uids.len(), "Marked emails seen");
        Ok(())
    })
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Build an `Email` from an RFC822 message, keeping only PDF attachments.
pub fn email_from_raw(uid: &str, raw: &[u8]) -> Option<Email> {
    let parsed = MessageParser::default().parse(raw)?;

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();
    let content = parsed
        .body_text(0)
        .map(|text| text.trim().to_string())
        .or_else(|| parsed.body_html(0).map(|html| strip_html(html.as_ref())));

    let attachments = parsed
        .attachments()
        .filter_map(|part| {
            let file_name = MimeHeaders::attachment_name(part)
                .unwrap_or("attachment.pdf")
                .to_string();
            if !is_pdf_part(part) {
                debug!(uid = %uid, file_name = %file_name, "Skipping non-PDF attachment");
                return None;
            }
            Some(Attachment {
                file_name,
                content: part.contents().to_vec(),
            })
        })
        .collect();

    Some(Email {
        uid: uid.to_string(),
        subject,
        content,
        attachments,
    })
}

fn is_pdf_part(part: &mail_parser::MessagePart) -> bool {
    let by_type = MimeHeaders::content_type(part).is_some_and(|ct| {
        ct.ctype().eq_ignore_ascii_case("application")
            && ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case("pdf"))
    });
    let by_name = MimeHeaders::attachment_name(part)
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(".pdf"));
    by_type || by_name
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collect UIDs from `* SEARCH` response lines.
pub fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// Byte length of a literal announced at the end of a line (`{123}\r\n`).
pub fn literal_len(line: &str) -> Option<usize> {
    let body = line.strip_suffix("\r\n")?.strip_suffix('}')?;
    let open = body.rfind('{')?;
    body[open + 1..].parse().ok()
}

/// Quote a string argument per IMAP quoted-string rules.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// First word of a command, for error messages that must not echo credentials.
fn command_name(cmd: &str) -> &str {
    match cmd.split_whitespace().next() {
        Some("UID") => cmd.split_whitespace().nth(1).unwrap_or("UID"),
        Some(name) => name,
        None => cmd,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
