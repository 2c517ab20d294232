pub mod chat;
pub mod enrichment;
pub mod prompt;
pub mod providers;
pub mod routing;
pub mod types;

// Re-export core types at crate root for convenience.
pub use chat::ChatSession;
pub use enrichment::{EnrichmentGateway, EnrichmentOutcome, EnrichmentState, EnrichmentStatus};
pub use providers::gemini::GeminiProvider;
pub use providers::llama_server::LlamaServerBridge;
pub use providers::{EnrichmentModel, LocalInferenceBridge, ProviderError, RemoteChatModel};
pub use routing::{
    Answer, AnswerSource, HybridInferenceRouter, QuestionCategory, RouterConfig,
    classify_question, extract_relevant_context, is_acknowledgment, sanitize_local,
    sanitize_remote,
};
pub use types::*;
