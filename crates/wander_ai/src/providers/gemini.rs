//! Google Gemini provider.
//!
//! Uses the OpenAI-compatible endpoint at
//! `generativelanguage.googleapis.com/v1beta/openai`. Serves both chat
//! answers and destination enrichment.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use wander_core::{Destination, WanderConfig};

use super::openai_compat::{ChatCompletionRequest, ChatCompletionResponse, WireMessage};
use super::{EnrichmentModel, ProviderError, RemoteChatModel};
use crate::prompt;
use crate::types::EnrichedFields;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const CHAT_MAX_TOKENS: u32 = 512;
const ENRICH_MAX_TOKENS: u32 = 1024;

/// Google Gemini API provider.
pub struct GeminiProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Pass an empty `api_key` to create a provider that always reports
    /// [`ProviderError::InvalidKey`].
    pub fn new(api_key: String, model: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: if api_key.is_empty() {
                None
            } else {
                Some(api_key)
            },
            model: model.into(),
            base_url: DEFAULT_BASE_URL.into(),
            client,
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &WanderConfig) -> Option<Self> {
        let key = config.gemini_api_key.clone().filter(|k| !k.is_empty())?;
        Some(Self::new(
            key,
            config.gemini_model.clone(),
            config.remote_timeout(),
        ))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn build_body(
        &self,
        system: Option<&str>,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = system {
            messages.push(WireMessage::system(sys));
        }
        messages.push(WireMessage::user(prompt));
        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
        }
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::InvalidKey)
    }

    async fn post_completions(&self, body: &ChatCompletionRequest) -> Result<String, ProviderError> {
        let key = self.require_key()?;
        let url = format!("{}/chat/completions", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::InvalidKey);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimit);
        }
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            return Err(ProviderError::Timeout);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::ModelUnavailable(self.model.clone()));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Other(format!(
                "Gemini API error {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("Failed to parse response: {e}")))?;

        parsed
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

#[async_trait]
impl RemoteChatModel for GeminiProvider {
    fn name(&self) -> &str {
        "Google Gemini"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = self.build_body(None, prompt, CHAT_MAX_TOKENS, 0.7);
        let text = self.post_completions(&body).await?;
        debug!(model = %self.model, chars = text.len(), "Gemini chat completed");
        Ok(text)
    }
}

#[async_trait]
impl EnrichmentModel for GeminiProvider {
    fn name(&self) -> &str {
        "Google Gemini"
    }

    async fn enrich(&self, destination: &Destination) -> Result<EnrichedFields, ProviderError> {
        let body = self.build_body(
            Some(prompt::ENRICHMENT_SYSTEM_PROMPT),
            &prompt::enrichment_prompt(destination),
            ENRICH_MAX_TOKENS,
            0.4,
        );
        let raw = self.post_completions(&body).await?;
        prompt::parse_enrichment(&raw)
    }
}
