//! Bridges rig-core completion models to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message as RigMessage};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role,
};

/// Adapter wrapping any rig `CompletionModel`.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// Split our message list into rig's (preamble, prompt) shape.
///
/// System messages are joined into the preamble and user messages into the
/// prompt, each in request order.
fn split_messages(messages: &[ChatMessage]) -> Result<(Option<String>, String), String> {
    let joined = |role: Role| {
        messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let prompt = joined(Role::User);
    if prompt.is_empty() {
        return Err("request has no user message".to_string());
    }

    let preamble = joined(Role::System);
    let preamble = (!preamble.is_empty()).then_some(preamble);

    Ok((preamble, prompt))
}

fn token_count(count: u64) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, prompt) =
            split_messages(&request.messages).map_err(|reason| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason,
            })?;

        let mut builder = self.model.completion_request(RigMessage::user(prompt));
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let texts: Vec<String> = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "response contained no text content".to_string(),
            });
        }

        Ok(CompletionResponse {
            content: texts.join(""),
            input_tokens: token_count(response.usage.input_tokens),
            output_tokens: token_count(response.usage.output_tokens),
        })
    }
}
