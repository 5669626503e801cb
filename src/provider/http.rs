//! HTTP implementation of the provider adapter.
//!
//! Two wire shapes are supported: the native single-shot generation call
//! (API key as query parameter) and an OpenAI-compatible
//! `chat/completions` endpoint (bearer credential). Both fold every
//! transport-level failure into the returned [`DispatchResult`]; callers
//! must not expect errors to escape `dispatch`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{ProviderConfig, WireFormat};

use super::{
    adapter::ProviderAdapter,
    types::{DispatchResult, ProviderError, ProviderResult, ProviderSecret},
};

#[derive(Debug, Deserialize, Default)]
struct NativeResponse {
    #[serde(default)]
    candidates: Vec<NativeCandidate>,
}

#[derive(Debug, Deserialize, Default)]
struct NativeCandidate {
    #[serde(default)]
    content: NativeContent,
}

#[derive(Debug, Deserialize, Default)]
struct NativeContent {
    #[serde(default)]
    parts: Vec<NativePart>,
}

#[derive(Debug, Deserialize, Default)]
struct NativePart {
    #[serde(default)]
    text: String,
}

impl NativeResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Default)]
struct NativeModelList {
    #[serde(default)]
    models: Vec<NativeModel>,
}

#[derive(Debug, Deserialize, Default)]
struct NativeModel {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatChoice {
    #[serde(default)]
    message: ChatMessage,
}

#[derive(Debug, Deserialize, Default)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct ChatModelList {
    #[serde(default)]
    data: Vec<ChatModel>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatModel {
    #[serde(default)]
    id: String,
}

pub struct HttpProviderAdapter {
    client: Client,
}

impl Default for HttpProviderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProviderAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn dispatch_native(
        &self,
        system_text: &str,
        user_text: &str,
        config: &ProviderConfig,
        secret: &ProviderSecret,
    ) -> ProviderResult<DispatchResult> {
        let url = native_generate_url(config, secret);
        let body = native_body(system_text, user_text, config);

        let response = self
            .client
            .post(&url)
            .timeout(config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::ApiError(e.to_string()))?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Ok(DispatchResult::failed(format!(
                "{} {}",
                status.as_u16(),
                body_text
            )));
        }

        let text = serde_json::from_str::<NativeResponse>(&body_text)
            .map(|r| r.text())
            .unwrap_or_default();
        Ok(DispatchResult::ok(text))
    }

    async fn dispatch_openai(
        &self,
        system_text: &str,
        user_text: &str,
        config: &ProviderConfig,
        secret: &ProviderSecret,
    ) -> ProviderResult<DispatchResult> {
        let url = openai_chat_url(config);
        let body = openai_body(system_text, user_text, config);

        let response = self
            .client
            .post(&url)
            .timeout(config.timeout)
            .bearer_auth(secret.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::ApiError(e.to_string()))?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Ok(DispatchResult::failed(format!(
                "{} {}",
                status.as_u16(),
                body_text
            )));
        }

        let text = serde_json::from_str::<ChatResponse>(&body_text)
            .map(|r| {
                r.choices
                    .first()
                    .map(|c| c.message.content.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        Ok(DispatchResult::ok(text))
    }
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    #[tracing::instrument(skip(self, system_text, user_text, config), fields(wire_format = %config.wire_format, model = %config.model))]
    async fn dispatch(
        &self,
        system_text: &str,
        user_text: &str,
        config: &ProviderConfig,
    ) -> DispatchResult {
        let secret = ProviderSecret::from(config);
        let outcome = match config.wire_format {
            WireFormat::Native => {
                self.dispatch_native(system_text, user_text, config, &secret)
                    .await
            }
            WireFormat::OpenaiCompatible => {
                self.dispatch_openai(system_text, user_text, config, &secret)
                    .await
            }
        };
        match outcome {
            Ok(result) => {
                debug!(success = result.success, "dispatch completed");
                result
            }
            Err(e) => {
                warn!("dispatch transport failure: {}", e);
                DispatchResult::failed(e.to_string())
            }
        }
    }

    async fn list_models(&self, config: &ProviderConfig) -> ProviderResult<Vec<String>> {
        let secret = ProviderSecret::from(config);
        match config.wire_format {
            WireFormat::Native => {
                let url = native_models_url(config, &secret);
                let list: NativeModelList = self
                    .client
                    .get(&url)
                    .timeout(config.timeout)
                    .send()
                    .await
                    .map_err(|e| ProviderError::ApiError(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| ProviderError::ApiError(e.to_string()))?;
                Ok(list.models.into_iter().map(|m| m.name).collect())
            }
            WireFormat::OpenaiCompatible => {
                let url = openai_models_url(config);
                let list: ChatModelList = self
                    .client
                    .get(&url)
                    .timeout(config.timeout)
                    .bearer_auth(secret.api_key.expose_secret())
                    .send()
                    .await
                    .map_err(|e| ProviderError::ApiError(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| ProviderError::ApiError(e.to_string()))?;
                Ok(list.data.into_iter().map(|m| m.id).collect())
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn base_url(config: &ProviderConfig) -> &str {
    config.base_url.trim_end_matches('/')
}

fn native_generate_url(config: &ProviderConfig, secret: &ProviderSecret) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent?key={}",
        base_url(config),
        config.model,
        secret.api_key.expose_secret()
    )
}

fn native_models_url(config: &ProviderConfig, secret: &ProviderSecret) -> String {
    format!(
        "{}/v1beta/models?key={}",
        base_url(config),
        secret.api_key.expose_secret()
    )
}

fn openai_chat_url(config: &ProviderConfig) -> String {
    format!("{}/chat/completions", base_url(config))
}

fn openai_models_url(config: &ProviderConfig) -> String {
    format!("{}/models", base_url(config))
}

/// Native wire format carries a single combined prompt.
fn native_body(system_text: &str, user_text: &str, config: &ProviderConfig) -> serde_json::Value {
    json!({
        "contents": [{
            "parts": [{
                "text": format!("{}\n\n{}", system_text, user_text)
            }]
        }],
        "generationConfig": {
            "temperature": config.temperature,
            "maxOutputTokens": config.max_tokens
        }
    })
}

/// OpenAI-compatible format keeps system and user messages separate.
fn openai_body(system_text: &str, user_text: &str, config: &ProviderConfig) -> serde_json::Value {
    json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": system_text },
            { "role": "user", "content": user_text }
        ],
        "temperature": config.temperature,
        "max_tokens": config.max_tokens
    })
}
