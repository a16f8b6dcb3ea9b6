//! Configuration types, built from environment variables.

use std::str::FromStr;

use crate::channels::discord::DiscordConfig;
use crate::channels::email::MailboxConfig;
use crate::error::ConfigError;
use crate::llm::LlmConfig;

/// Read a required variable.
pub(crate) fn env_required(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

/// Read an optional variable, parsing it when present.
pub(crate) fn env_parse_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

/// Model invocation settings for the extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Upper bound on the reply size, in tokens.
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Drop unreadable attachments instead of aborting the run.
    pub skip_unreadable: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 5000,
            temperature: 0.0,
            skip_unreadable: false,
        }
    }
}

impl ExtractionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_output_tokens: env_parse_or("BILL_MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
            temperature: env_parse_or("BILL_TEMPERATURE", defaults.temperature)?,
            skip_unreadable: env_parse_or("BILL_SKIP_UNREADABLE", defaults.skip_unreadable)?,
        })
    }
}

/// HTTP trigger service settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Pending run triggers held before new ones are refused.
    pub queue_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            queue_capacity: 16,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let queue_capacity = env_parse_or("BILL_QUEUE_CAPACITY", defaults.queue_capacity)?;
        if queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BILL_QUEUE_CAPACITY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            port: env_parse_or("BILL_HTTP_PORT", defaults.port)?,
            queue_capacity,
        })
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mailbox: MailboxConfig,
    pub llm: LlmConfig,
    pub extraction: ExtractionConfig,
    pub discord: DiscordConfig,
    pub service: ServiceConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            mailbox: MailboxConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            extraction: ExtractionConfig::from_env()?,
            discord: DiscordConfig::from_env()?,
            service: ServiceConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_defaults() {
        let config = ExtractionConfig::default();
        assert_eq!(config.max_output_tokens, 5000);
        assert!(!config.skip_unreadable);
    }

    #[test]
    fn parse_or_uses_default_when_unset() {
        // SAFETY: unique variable name, not read by any other test.
        unsafe { std::env::remove_var("BILL_TEST_UNSET_PORT") };
        assert_eq!(env_parse_or("BILL_TEST_UNSET_PORT", 8080u16).unwrap(), 8080);
    }

    #[test]
    fn parse_or_rejects_garbage() {
        // SAFETY: unique variable name, not read by any other test.
        unsafe { std::env::set_var("BILL_TEST_BAD_PORT", "eighty") };
        let err = env_parse_or("BILL_TEST_BAD_PORT", 8080u16).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "BILL_TEST_BAD_PORT"));
    }

    #[test]
    fn required_treats_blank_as_missing() {
        // SAFETY: unique variable name, not read by any other test.
        unsafe { std::env::set_var("BILL_TEST_BLANK", "   ") };
        assert!(matches!(
            env_required("BILL_TEST_BLANK"),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }
}
