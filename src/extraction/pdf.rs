//! PDF text extraction using the pdf-extract crate.

use crate::error::PipelineError;
use crate::pipeline::types::Attachment;

/// Extract the text layer of a PDF, one page after another.
///
/// Pages are joined with a single newline, in page order.
pub fn extract_text(file_name: &str, pdf_bytes: &[u8]) -> Result<String, PipelineError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(pdf_bytes).map_err(|e| {
        PipelineError::DocumentFormat {
            file_name: file_name.to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(pages
        .iter()
        .map(|page| page.trim_end_matches('\n'))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Text extracted from one attachment, ready for prompting.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub file_name: String,
    pub text: String,
}

impl ExtractedDocument {
    /// Extract an attachment on the blocking pool.
    pub async fn from_attachment(attachment: Attachment) -> Result<Self, PipelineError> {
        let file_name = attachment.file_name.clone();
        let result = tokio::task::spawn_blocking(move || {
            extract_text(&attachment.file_name, &attachment.content)
        })
        .await
        .map_err(|e| PipelineError::DocumentFormat {
            file_name: file_name.clone(),
            reason: format!("extraction task panicked: {e}"),
        })?;

        Ok(Self {
            file_name,
            text: result?,
        })
    }
}
