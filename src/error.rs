//! Error types for the bill inbox.
//!
//! Collaborator errors (`MailboxError`, `NotifyError`, `LlmError`) stay
//! separate; `PipelineError` is what ends a run.

/// Bad or missing environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the model call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Mailbox collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Mailbox login failed for {username}")]
    AuthFailed { username: String },

    #[error("IMAP command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Mailbox operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Notification sink errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification request to {sink} failed: {reason}")]
    RequestFailed { sink: String, reason: String },

    #[error("Notification rejected by {sink} with status {status}")]
    Rejected { sink: String, status: u16 },
}

/// Errors that abort a single pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Attachment {file_name} is not a readable PDF: {reason}")]
    DocumentFormat { file_name: String, reason: String },

    #[error("Extraction service failed: {0}")]
    ExtractionService(#[from] LlmError),

    #[error("Malformed extraction response: {0}")]
    MalformedResponse(String),

    #[error("Extraction returned {actual} record(s) for {expected} document(s)")]
    CardinalityMismatch { expected: usize, actual: usize },

    #[error("Mailbox failed: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Run cancelled during {stage}")]
    Cancelled { stage: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_mismatch_message_names_both_counts() {
        let err = PipelineError::CardinalityMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Extraction returned 2 record(s) for 3 document(s)"
        );
    }

    #[test]
    fn llm_error_converts_into_extraction_service_error() {
        let err: PipelineError = LlmError::RequestFailed {
            provider: "anthropic".into(),
            reason: "connection reset".into(),
        }
        .into();
        assert!(matches!(err, PipelineError::ExtractionService(_)));
    }
}
