use secrecy::SecretString;
use thiserror::Error;

use crate::config::ProviderConfig;

/// Outcome of one secondary-model dispatch.
///
/// Transport failures are carried in this object, never thrown past the
/// adapter boundary. A 2xx response with empty or unparsable text is a
/// success with empty `text`; emptiness is the retry trigger, not an error.
#[derive(Debug, Clone, Default)]
pub struct DispatchResult {
    pub success: bool,
    pub text: String,
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn ok(text: String) -> Self {
        Self {
            success: true,
            text,
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            text: String::new(),
            error: Some(error),
        }
    }

    /// True when the result carries usable text for the merger.
    pub fn has_text(&self) -> bool {
        self.success && !self.text.trim().is_empty()
    }
}

/// API credential wrapped so it is only exposed at the HTTP boundary.
#[derive(Clone)]
pub struct ProviderSecret {
    pub api_key: SecretString,
}

impl From<&ProviderConfig> for ProviderSecret {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            api_key: SecretString::from(config.api_key.clone()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
