//! On-device inference through a local llama.cpp `llama-server`.
//!
//! The server is started by the host platform with the model file; this
//! bridge only verifies the model is present, waits for `/health`, and then
//! talks to the OpenAI-compatible `/v1/chat/completions` endpoint.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use wander_core::WanderConfig;

use super::openai_compat::{ChatCompletionRequest, ChatCompletionResponse, WireMessage};
use super::{LocalInferenceBridge, ProviderError};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LlamaServerBridge {
    base_url: String,
    client: reqwest::Client,
    loaded: AtomicBool,
}

impl LlamaServerBridge {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &WanderConfig) -> Self {
        Self::new(config.local_server_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check_health(&self) -> Result<(), ProviderError> {
        let url = format!("{}/health", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::ModelUnavailable(format!(
                        "llama-server not running at {}",
                        self.base_url
                    ))
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            // 503 while the model is still loading.
            Err(ProviderError::ModelUnavailable(format!(
                "llama-server unhealthy: {}",
                resp.status()
            )))
        }
    }

    fn build_body(prompt: &str, max_tokens: u32) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "local".into(),
            messages: vec![
                WireMessage::system("You are a concise travel guide. Answer in one or two sentences."),
                WireMessage::user(prompt),
            ],
            stream: false,
            max_tokens: Some(max_tokens),
            temperature: Some(0.3),
        }
    }
}

#[async_trait]
impl LocalInferenceBridge for LlamaServerBridge {
    async fn initialize(&self, model_path: &Path) -> Result<(), ProviderError> {
        if !model_path.exists() {
            warn!(path = %model_path.display(), "Local model file not found");
            return Err(ProviderError::ModelUnavailable(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }
        self.check_health().await?;
        self.loaded.store(true, Ordering::SeqCst);
        info!(url = %self.base_url, model = %model_path.display(), "Local model ready");
        Ok(())
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError> {
        if !self.is_loaded() {
            return Err(ProviderError::NotLoaded);
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Self::build_body(prompt, max_tokens))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    // Server went away; require a fresh initialize.
                    self.loaded.store(false, Ordering::SeqCst);
                    ProviderError::ModelUnavailable(e.to_string())
                } else if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Other(format!(
                "llama-server error {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("Failed to parse response: {e}")))?;

        let text = parsed
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)?;
        debug!(chars = text.len(), "Local model generated");
        Ok(text)
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let b = LlamaServerBridge::new("http://127.0.0.1:8081/");
        assert_eq!(b.base_url(), "http://127.0.0.1:8081");
    }

    #[test]
    fn body_carries_token_budget() {
        let body = LlamaServerBridge::build_body("q", 120);
        assert_eq!(body.max_tokens, Some(120));
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[1].content, "q");
    }

    #[tokio::test]
    async fn generate_before_initialize_is_not_loaded() {
        let b = LlamaServerBridge::new("http://127.0.0.1:1");
        assert!(!b.is_loaded());
        assert!(matches!(
            b.generate("hi", 10).await,
            Err(ProviderError::NotLoaded)
        ));
    }

    #[tokio::test]
    async fn missing_model_file_fails_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let b = LlamaServerBridge::new("http://127.0.0.1:1");
        let err = b
            .initialize(&dir.path().join("missing.gguf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ModelUnavailable(_)));
        assert!(!b.is_loaded());
    }
}
