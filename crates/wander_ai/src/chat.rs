//! In-memory conversation about one recognized destination.

use std::sync::Arc;

use wander_core::Destination;

use crate::routing::{Answer, HybridInferenceRouter};
use crate::types::ChatMessage;

/// Append-only chat scoped to a single destination. Dropped with the
/// conversation view; nothing is persisted.
pub struct ChatSession {
    destination: Destination,
    router: Arc<HybridInferenceRouter>,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Start a session with a greeting from the guide.
    pub fn new(destination: Destination, router: Arc<HybridInferenceRouter>) -> Self {
        let greeting = ChatMessage::assistant(format!(
            "Hi! I'm your guide for {}. Ask me about its history, festivals, timings or anything else.",
            destination.name
        ));
        Self {
            destination,
            router,
            messages: vec![greeting],
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Record the question, route it, and record the answer.
    pub async fn ask(&mut self, question: &str) -> Answer {
        self.messages.push(ChatMessage::user(question.trim()));
        let answer = self.router.answer(question, &self.destination).await;
        self.messages.push(ChatMessage::assistant(answer.text.clone()));
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{AnswerSource, RouterConfig};
    use async_trait::async_trait;
    use std::time::Duration;
    use wander_core::{ConnectivityProbe, Reachability, SimulatedConditions};

    struct Never;

    #[async_trait]
    impl Reachability for Never {
        async fn check(&self) -> bool {
            false
        }
    }

    fn session() -> ChatSession {
        let probe = ConnectivityProbe::new(
            Arc::new(Never),
            Duration::from_secs(1),
            Duration::from_secs(5),
        );
        probe.simulate(SimulatedConditions::offline());
        let router = HybridInferenceRouter::new(
            Arc::new(probe),
            None,
            None,
            RouterConfig::default(),
        );
        let dest = Destination::new("taj_mahal_001", "Taj Mahal")
            .with_description("The Taj Mahal is located in Agra. It was built by Shah Jahan.");
        ChatSession::new(dest, Arc::new(router))
    }

    #[test]
    fn starts_with_greeting() {
        let s = session();
        assert_eq!(s.messages().len(), 1);
        assert!(!s.messages()[0].is_user);
        assert!(s.messages()[0].text.contains("Taj Mahal"));
    }

    #[tokio::test]
    async fn ask_appends_question_and_answer_in_order() {
        let mut s = session();
        let answer = s.ask("Where is it located?").await;
        assert_eq!(answer.source, AnswerSource::ExtractedContext);
        assert_eq!(answer.text, "The Taj Mahal is located in Agra.");

        s.ask("thanks").await;
        let msgs = s.messages();
        assert_eq!(msgs.len(), 5);
        assert!(msgs[1].is_user);
        assert_eq!(msgs[1].text, "Where is it located?");
        assert!(!msgs[2].is_user);
        assert!(msgs[3].is_user);
        assert!(msgs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
