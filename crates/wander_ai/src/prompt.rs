//! Prompt construction and structured-output parsing.

use wander_core::Destination;

use crate::providers::ProviderError;
use crate::routing::QuestionCategory;
use crate::types::EnrichedFields;

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

pub const ENRICHMENT_SYSTEM_PROMPT: &str = "You are a knowledgeable travel historian. \
    Respond with a single JSON object and nothing else.";

/// Prompt asking the remote model for structured descriptive fields.
pub fn enrichment_prompt(dest: &Destination) -> String {
    let mut prompt = format!("Destination: {}\n", dest.name);
    if !dest.location.is_empty() {
        prompt.push_str(&format!("Location: {}\n", dest.location));
    }
    if !dest.category.is_empty() {
        prompt.push_str(&format!("Category: {}\n", dest.category));
    }
    let context = dest.context_text();
    if !context.is_empty() {
        prompt.push_str(&format!("Known information: {context}\n"));
    }
    prompt.push_str(
        "\nReturn JSON with exactly these keys:\n\
         {\"description\": string (2-3 sentences),\n \
         \"historicalInfo\": {\"briefDescription\": string, \"extendedDescription\": string, \
         \"keyEvents\": [string], \"relatedFigures\": [string]},\n \
         \"educationalInfo\": {\"facts\": [string], \"importance\": string, \
         \"culturalRelevance\": string, \"architecturalStyle\": string}}\n",
    );
    prompt
}

/// Parse a model reply into [`EnrichedFields`].
///
/// Tolerates markdown code fences and chatter around the JSON object.
pub fn parse_enrichment(raw: &str) -> Result<EnrichedFields, ProviderError> {
    let body = extract_json_object(raw).ok_or(ProviderError::EmptyResponse)?;
    let fields: EnrichedFields = serde_json::from_str(body)
        .map_err(|e| ProviderError::Other(format!("Malformed enrichment JSON: {e}")))?;
    if fields.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(fields)
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Prompt for the remote chat model: full context plus the question.
pub fn remote_chat_prompt(dest: &Destination, question: &str) -> String {
    let mut prompt = format!(
        "You are a friendly travel guide answering a visitor's question about {}.",
        dest.name
    );
    if !dest.location.is_empty() {
        prompt.push_str(&format!(" It is located in {}.", dest.location));
    }
    let context = dest.context_text();
    if !context.is_empty() {
        prompt.push_str(&format!("\n\nContext:\n{context}"));
    }
    prompt.push_str(&format!(
        "\n\nQuestion: {question}\n\nAnswer in plain text, in at most four sentences."
    ));
    prompt
}

/// Short, category-specific prompt for the on-device model. Embeds only the
/// extracted sentences, never the full description.
pub fn local_chat_prompt(
    place: &str,
    category: QuestionCategory,
    context: &[String],
    question: &str,
) -> String {
    let focus = match category {
        QuestionCategory::Location => "where it is and how to get there",
        QuestionCategory::History => "its history",
        QuestionCategory::Festivals => "festivals and events held there",
        QuestionCategory::Activities => "things visitors can do",
        QuestionCategory::VisitingInfo => "timings, tickets and the best time to visit",
        QuestionCategory::Significance => "why it is important",
        QuestionCategory::Facilities => "facilities available to visitors",
        QuestionCategory::Architecture => "its architecture",
        QuestionCategory::CrowdInfo => "how crowded it gets",
        QuestionCategory::General => "the place",
    };
    format!(
        "Facts about {place}: {}\nUsing only these facts, answer briefly about {focus}.\n\
         Question: {question}\nAnswer:",
        context.join(" ")
    )
}
