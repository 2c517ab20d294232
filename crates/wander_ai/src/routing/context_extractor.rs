//! Keyword-filtered sentence selection.
//!
//! Picks the few description sentences that matter for a question so the
//! on-device model sees a short, focused context instead of the whole text.

use super::question_classifier::QuestionCategory;

/// Words ignored when matching question terms against sentences.
const STOPWORDS: &[&str] = &[
    "about", "also", "anything", "are", "can", "could", "does", "from", "have", "here", "how",
    "into", "is", "it", "its", "know", "more", "much", "place", "should", "some", "tell", "than",
    "that", "the", "their", "there", "these", "this", "those", "visit", "was", "were", "what",
    "when", "where", "which", "while", "who", "why", "will", "with", "would", "you", "your",
];

const MIN_TERM_LEN: usize = 4;

/// Split free text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let terminal = matches!(c, '.' | '!' | '?');
        let boundary = match chars.peek() {
            None => true,
            Some(next) => next.is_whitespace(),
        };
        if terminal && boundary {
            push_sentence(&mut sentences, &current);
            current.clear();
        } else if c == '\n' {
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);
    sentences
}

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let s = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !s.is_empty() {
        out.push(s);
    }
}

/// Select at most `max_sentences` sentences of `description` relevant to
/// `category` and `question`, in their original order.
///
/// [`QuestionCategory::General`] takes the leading sentences. Other
/// categories keep only sentences matching a category keyword or a
/// significant question term; the result may be empty.
pub fn extract_relevant_context(
    description: &str,
    category: QuestionCategory,
    question: &str,
    max_sentences: usize,
) -> Vec<String> {
    if max_sentences == 0 {
        return Vec::new();
    }
    let sentences = split_sentences(description);
    if category == QuestionCategory::General {
        return sentences.into_iter().take(max_sentences).collect();
    }

    let terms = question_terms(question);
    let keywords = category.keywords();

    let mut scored: Vec<(usize, usize)> = sentences
        .iter()
        .enumerate()
        .filter_map(|(idx, sentence)| {
            let score = score_sentence(sentence, keywords, &terms);
            (score > 0).then_some((idx, score))
        })
        .collect();

    // Highest score first; stable so ties keep document order.
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(max_sentences);
    scored.sort_by_key(|(idx, _)| *idx);

    scored
        .into_iter()
        .map(|(idx, _)| sentences[idx].clone())
        .collect()
}

fn question_terms(question: &str) -> Vec<String> {
    let mut terms: Vec<String> = question
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= MIN_TERM_LEN && !STOPWORDS.contains(&w.as_str()))
        .collect();
    terms.dedup();
    terms
}

fn sentence_words(sentence: &str) -> Vec<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn score_sentence(sentence: &str, keywords: &[&str], terms: &[String]) -> usize {
    let lower = sentence.to_lowercase();
    let words = sentence_words(sentence);

    let keyword_hits = keywords
        .iter()
        .filter(|kw| {
            if kw.contains(' ') {
                lower.contains(*kw)
            } else {
                words.iter().any(|w| w.starts_with(*kw))
            }
        })
        .count();

    let term_hits = terms
        .iter()
        .filter(|term| {
            words.iter().any(|w| {
                w.chars().count() >= MIN_TERM_LEN
                    && (w.starts_with(term.as_str()) || term.starts_with(w.as_str()))
            })
        })
        .count();

    keyword_hits * 2 + term_hits
}
