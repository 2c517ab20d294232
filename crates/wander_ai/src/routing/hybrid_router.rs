//! Hybrid Inference Router
//!
//! Answers a question about a destination. Online, the remote chat model gets
//! the full context. Offline (or when the remote call fails), the question is
//! classified, the relevant sentences are extracted, and the on-device model
//! gets a short prompt built from those sentences only. The router always
//! produces an answer.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wander_core::{ConnectivityProbe, Destination, WanderConfig, WanderError};

use super::context_extractor::extract_relevant_context;
use super::question_classifier::{QuestionCategory, classify_question, is_acknowledgment};
use super::sanitizer::{sanitize_local, sanitize_remote};
use crate::prompt;
use crate::providers::{LocalInferenceBridge, RemoteChatModel};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which path produced an [`Answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Acknowledgment,
    RemoteModel,
    LocalModel,
    ExtractedContext,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
    /// Set when the offline path classified the question.
    pub category: Option<QuestionCategory>,
}

impl Answer {
    fn new(text: impl Into<String>, source: AnswerSource) -> Self {
        Self {
            text: text.into(),
            source,
            category: None,
        }
    }

    fn with_category(mut self, category: QuestionCategory) -> Self {
        self.category = Some(category);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub remote_timeout: Duration,
    pub local_timeout: Duration,
    pub local_max_tokens: u32,
    pub max_context_sentences: usize,
    pub local_model_path: Option<PathBuf>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(20),
            local_timeout: Duration::from_secs(45),
            local_max_tokens: 120,
            max_context_sentences: 3,
            local_model_path: None,
        }
    }
}

impl RouterConfig {
    pub fn from_config(config: &WanderConfig) -> Self {
        Self {
            remote_timeout: config.remote_timeout(),
            local_timeout: config.local_timeout(),
            local_max_tokens: config.local_max_tokens,
            max_context_sentences: config.max_context_sentences,
            local_model_path: config.local_model_path.clone(),
        }
    }
}

const ACK_REPLY: &str = "You're welcome! Feel free to ask me anything else about this place.";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct HybridInferenceRouter {
    connectivity: Arc<ConnectivityProbe>,
    remote: Option<Arc<dyn RemoteChatModel>>,
    local: Option<Arc<dyn LocalInferenceBridge>>,
    /// One on-device generation at a time.
    local_gate: tokio::sync::Mutex<()>,
    /// Set once initialization fails; the model is not retried after that.
    local_init_failed: AtomicBool,
    config: RouterConfig,
}

impl HybridInferenceRouter {
    pub fn new(
        connectivity: Arc<ConnectivityProbe>,
        remote: Option<Arc<dyn RemoteChatModel>>,
        local: Option<Arc<dyn LocalInferenceBridge>>,
        config: RouterConfig,
    ) -> Self {
        Self {
            connectivity,
            remote,
            local,
            local_gate: tokio::sync::Mutex::new(()),
            local_init_failed: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Produce an answer for `question` about `dest`. Never fails.
    pub async fn answer(&self, question: &str, dest: &Destination) -> Answer {
        if is_acknowledgment(question) {
            debug!(entity_id = %dest.id, "Acknowledgment, skipping inference");
            return Answer::new(ACK_REPLY, AnswerSource::Acknowledgment);
        }

        if self.remote.is_some() && self.connectivity.is_online().await {
            match self.answer_remote(question, dest).await {
                Ok(text) => return Answer::new(text, AnswerSource::RemoteModel),
                Err(e) => {
                    warn!(entity_id = %dest.id, error = %e, "Remote answer failed, using offline path");
                }
            }
        }

        self.answer_offline(question, dest).await
    }

    /// Offline pipeline: classify, extract, prompt the local model, sanitize,
    /// then fall back to the extracted sentences or a fixed reply.
    pub async fn answer_offline(&self, question: &str, dest: &Destination) -> Answer {
        let category = classify_question(question);
        let context = extract_relevant_context(
            &dest.context_text(),
            category,
            question,
            self.config.max_context_sentences,
        );
        debug!(
            entity_id = %dest.id,
            %category,
            sentences = context.len(),
            "Question classified"
        );

        let place = if dest.name.is_empty() { "this place" } else { dest.name.as_str() };

        if !context.is_empty() {
            let local_prompt = prompt::local_chat_prompt(place, category, &context, question);
            match self.generate_local(&local_prompt).await {
                Ok(text) => {
                    return Answer::new(text, AnswerSource::LocalModel).with_category(category);
                }
                Err(e) => debug!(error = %e, "Local model produced no answer"),
            }
            return Answer::new(context.join(" "), AnswerSource::ExtractedContext)
                .with_category(category);
        }

        Answer::new(
            format!(
                "I'm not sure about that, but feel free to ask me something else about {place}!"
            ),
            AnswerSource::Fallback,
        )
        .with_category(category)
    }

    async fn answer_remote(&self, question: &str, dest: &Destination) -> Result<String, WanderError> {
        let Some(remote) = self.remote.as_ref() else {
            return Err(WanderError::unavailable("no remote chat model configured"));
        };
        let full_prompt = prompt::remote_chat_prompt(dest, question);

        let raw = tokio::time::timeout(self.config.remote_timeout, remote.complete(&full_prompt))
            .await
            .map_err(|_| WanderError::timeout("remote chat", self.config.remote_timeout))??;

        let text = sanitize_remote(&raw);
        if text.is_empty() {
            return Err(WanderError::InferenceUnavailable(
                "remote model returned an empty answer".into(),
            ));
        }
        info!(entity_id = %dest.id, provider = remote.name(), "Answered with remote model");
        Ok(text)
    }

    async fn generate_local(&self, local_prompt: &str) -> Result<String, WanderError> {
        let Some(local) = self.local.as_ref() else {
            return Err(WanderError::InferenceUnavailable(
                "no local model configured".into(),
            ));
        };
        let _gate = self.local_gate.lock().await;
        if !self.ensure_local_ready(local).await {
            return Err(WanderError::InferenceUnavailable(
                "local model failed to initialize".into(),
            ));
        }
        let raw = tokio::time::timeout(
            self.config.local_timeout,
            local.generate(local_prompt, self.config.local_max_tokens),
        )
        .await
        .map_err(|_| {
            warn!(
                timeout_ms = self.config.local_timeout.as_millis() as u64,
                "Local model timed out"
            );
            WanderError::timeout("local generate", self.config.local_timeout)
        })??;

        let text = sanitize_local(&raw);
        if text.is_empty() {
            return Err(WanderError::InferenceUnavailable(
                "local model returned an empty answer".into(),
            ));
        }
        Ok(text)
    }

    /// Load the local model if the bridge is not loaded, e.g. after its
    /// server went away. Called under the gate. An initialization failure is
    /// remembered and degrades every later offline answer to the
    /// extracted-context path.
    async fn ensure_local_ready(&self, local: &Arc<dyn LocalInferenceBridge>) -> bool {
        if local.is_loaded() {
            return true;
        }
        if self.local_init_failed.load(Ordering::Acquire) {
            return false;
        }
        let Some(path) = self.config.local_model_path.as_ref() else {
            warn!("No local model path configured");
            self.local_init_failed.store(true, Ordering::Release);
            return false;
        };
        match local.initialize(path).await {
            Ok(()) => {
                info!(path = %path.display(), "Local model loaded");
                true
            }
            Err(e) => {
                warn!(error = %e, "Local model initialization failed");
                self.local_init_failed.store(true, Ordering::Release);
                false
            }
        }
    }
}
