//! Model access for bill extraction.
//!
//! Anthropic and OpenAI are both reached through rig-core; [`RigAdapter`]
//! puts either behind the crate's own [`LlmProvider`] trait so the pipeline
//! and its tests never see rig types.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

/// Model vendors the extractor can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn name(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "BILL_LLM_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected anthropic or openai)"),
            }),
        }
    }
}

/// Which model to call, and with what key.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Default model used when `BILL_LLM_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

impl LlmConfig {
    /// `BILL_LLM_BACKEND` (default anthropic), the vendor's API key variable,
    /// and `BILL_LLM_MODEL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: LlmBackend = std::env::var("BILL_LLM_BACKEND")
            .unwrap_or_else(|_| "anthropic".to_string())
            .parse()?;

        let key_var = match backend {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = crate::config::env_required(key_var)?;

        let model = std::env::var("BILL_LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            model,
        })
    }
}

/// Build the extraction model client for the configured backend.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::{anthropic, openai};

    let api_key = config.api_key.expose_secret();
    let provider: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::Anthropic => {
            let client: rig::client::Client<anthropic::client::AnthropicExt> =
                anthropic::Client::new(api_key).map_err(|e| client_error(config.backend, e))?;
            Arc::new(RigAdapter::new(
                client.completion_model(&config.model),
                &config.model,
            ))
        }
        LlmBackend::OpenAi => {
            let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                openai::Client::new(api_key).map_err(|e| client_error(config.backend, e))?;
            Arc::new(RigAdapter::new(
                client.completion_model(&config.model),
                &config.model,
            ))
        }
    };

    tracing::info!(backend = config.backend.name(), model = %config.model, "Extraction model ready");
    Ok(provider)
}

fn client_error(backend: LlmBackend, e: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: backend.name().to_string(),
        reason: format!("failed to build client: {e}"),
    }
}
