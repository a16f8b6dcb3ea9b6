//! Single-request invocation of the extraction model.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::prompt::EXTRACTION_SYSTEM_PROMPT;
use crate::config::ExtractionConfig;
use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// What one extraction call sends to the model.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub model: String,
    pub prompt: String,
    pub max_output_tokens: u32,
}

/// Sends extraction prompts to the model, one request per batch.
pub struct BillExtractor {
    llm: Arc<dyn LlmProvider>,
    config: ExtractionConfig,
}

impl BillExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ExtractionConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Wrap a prompt in a request envelope for the configured model.
    pub fn request(&self, prompt: String) -> ExtractionRequest {
        ExtractionRequest {
            model: self.llm.model_name().to_string(),
            prompt,
            max_output_tokens: self.config.max_output_tokens,
        }
    }

    /// Send the request and return the model's raw text reply.
    ///
    /// No retries. Any transport or envelope failure is an
    /// `ExtractionService` error.
    pub async fn invoke(
        &self,
        request: ExtractionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        debug!(
            model = %request.model,
            prompt_chars = request.prompt.len(),
            max_output_tokens = request.max_output_tokens,
            "Invoking extraction model"
        );

        let completion = CompletionRequest::new(vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(request.prompt),
        ])
        .with_max_tokens(request.max_output_tokens)
        .with_temperature(self.config.temperature);

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(PipelineError::Cancelled { stage: "invoking" });
            }
            result = self.llm.complete(completion) => result?,
        };

        info!(
            model = %request.model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Extraction model replied"
        );

        Ok(response.content)
    }
}
