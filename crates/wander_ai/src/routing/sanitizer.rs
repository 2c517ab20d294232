//! Output clean-up for model answers.
//!
//! Remote answers only get trimmed and stripped of control characters.
//! Small on-device models tend to emit markdown, literal escape sequences and
//! "Answer:" labels, so their output goes through the heavier
//! [`sanitize_local`].

use once_cell::sync::Lazy;
use regex::Regex;

static LIST_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]\s+|\d+[.)]\s+)").expect("list marker regex"));

static LEADING_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:answer|response|reply|assistant|a)\s*:\s*").expect("label regex")
});

const REPEATABLE_PUNCT: &[char] = &['.', '!', '?', ','];

/// Trim and drop control characters (newlines become spaces).
pub fn sanitize_remote(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Full clean-up of on-device model output.
///
/// Collapses escaped and real line breaks, strips markdown and leading list
/// markers, removes a leading "Answer:" style label and wrapping quotes,
/// collapses repeated punctuation and capitalizes the first letter.
pub fn sanitize_local(raw: &str) -> String {
    let unescaped = raw
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\\r", "\n")
        .replace("\\t", " ")
        .replace('\r', "\n");

    let segments: Vec<String> = unescaped
        .split('\n')
        .map(|line| {
            let line = LIST_MARKER_RE.replace(line, "");
            line.chars()
                .filter(|c| *c != '*' && *c != '#' && *c != '`')
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect();

    let last = segments.len().saturating_sub(1);
    let joined = segments
        .iter()
        .enumerate()
        .map(|(i, seg)| {
            if i < last && !seg.ends_with(['.', '!', '?', ':', ';', ',']) {
                format!("{seg}.")
            } else {
                seg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    let unlabeled = LEADING_LABEL_RE.replace(joined.trim(), "").into_owned();
    let unquoted = strip_wrapping_quotes(unlabeled.trim());
    let collapsed = collapse_repeated_punctuation(unquoted);
    let spaced = collapsed
        .split_whitespace()
        .filter(|c| !c.chars().all(|ch| ch.is_control()))
        .collect::<Vec<_>>()
        .join(" ");
    capitalize_first(&spaced)
}

fn strip_wrapping_quotes(s: &str) -> &str {
    const PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’')];
    let mut out = s;
    loop {
        let mut changed = false;
        for (open, close) in PAIRS {
            if out.chars().count() >= 2 && out.starts_with(*open) && out.ends_with(*close) {
                out = out[open.len_utf8()..out.len() - close.len_utf8()].trim();
                changed = true;
            }
        }
        if !changed {
            return out;
        }
    }
}

fn collapse_repeated_punctuation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if REPEATABLE_PUNCT.contains(&c) && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_label_markdown_and_escaped_newlines() {
        assert_eq!(
            sanitize_local("**Answer:** It is *old*\\n\\nVery old."),
            "It is old. Very old."
        );
    }

    #[test]
    fn real_newlines_and_list_markers() {
        let raw = "- built in 1632\n- made of marble\n\n";
        assert_eq!(sanitize_local(raw), "Built in 1632. made of marble");
    }

    #[test]
    fn wrapping_quotes_and_repeated_punctuation() {
        assert_eq!(
            sanitize_local("\"the fair is held in spring!!! Enjoy..\""),
            "The fair is held in spring! Enjoy."
        );
    }

    #[test]
    fn headings_are_flattened() {
        assert_eq!(sanitize_local("## History\nBuilt by Akbar."), "History. Built by Akbar.");
    }

    #[test]
    fn blank_output_stays_blank() {
        assert_eq!(sanitize_local("  \\n  ** "), "");
    }

    #[test]
    fn remote_answer_is_only_trimmed() {
        assert_eq!(
            sanitize_remote("  **Bold** stays.\u{0007}\n"),
            "**Bold** stays."
        );
    }
}
