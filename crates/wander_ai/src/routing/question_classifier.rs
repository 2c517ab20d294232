//! Question Classifier
//!
//! Maps a visitor's question to a fixed topic using ordered regex tables.
//! Used on the offline path to decide which parts of a destination's
//! description are worth handing to the small on-device model.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Topic of a question about a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Location,
    History,
    Festivals,
    Activities,
    VisitingInfo,
    Significance,
    Facilities,
    Architecture,
    CrowdInfo,
    General,
}

impl std::fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Location => "location",
            Self::History => "history",
            Self::Festivals => "festivals and events",
            Self::Activities => "activities",
            Self::VisitingInfo => "visiting information",
            Self::Significance => "significance",
            Self::Facilities => "facilities",
            Self::Architecture => "architecture",
            Self::CrowdInfo => "crowds",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

impl QuestionCategory {
    /// Words that mark a description sentence as relevant to this topic.
    /// Empty for [`QuestionCategory::General`], which takes leading sentences.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Location => &[
                "located", "location", "situated", "city", "state", "district", "bank", "river",
                "near", "km", "kilometre", "kilometer", "north", "south", "east", "west", "road",
                "station", "airport",
            ],
            Self::History => &[
                "built", "constructed", "century", "history", "historical", "ancient", "dynasty",
                "emperor", "king", "queen", "ruler", "empire", "founded", "commissioned", "war",
                "year", "era", "period", "origin",
            ],
            Self::Festivals => &[
                "festival", "festivals", "celebrat", "fair", "mela", "event", "diwali", "holi",
                "puja", "utsav", "procession", "ceremony", "ritual", "annual",
            ],
            Self::Activities => &[
                "visitors can", "activities", "activity", "explore", "walk", "boat", "trek",
                "hike", "tour", "shopping", "photograph", "sunset", "sunrise", "enjoy", "ride",
                "show", "light and sound",
            ],
            Self::VisitingInfo => &[
                "open", "opening", "closed", "hours", "timing", "timings", "ticket", "entry",
                "fee", "admission", "best time", "season", "winter", "summer", "monsoon", "morning",
                "evening", "friday",
            ],
            Self::Significance => &[
                "famous", "known", "significance", "significant", "important", "symbol", "unesco",
                "heritage", "wonder", "sacred", "holy", "pilgrimage", "iconic", "renowned",
                "revered",
            ],
            Self::Facilities => &[
                "parking", "restroom", "toilet", "washroom", "wheelchair", "accessible", "cafe",
                "canteen", "food", "restaurant", "locker", "cloakroom", "guide", "audio guide",
                "drinking water", "shop",
            ],
            Self::Architecture => &[
                "architecture", "architectural", "marble", "dome", "minaret", "carving", "carved",
                "style", "design", "stone", "sandstone", "pillar", "arch", "facade", "tower",
                "sculpture", "inlay", "courtyard",
            ],
            Self::CrowdInfo => &[
                "crowd", "crowded", "busy", "rush", "queue", "peak", "quiet", "footfall",
                "visitors", "tourists", "weekend",
            ],
            Self::General => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled regex patterns (Lazy statics)
// ---------------------------------------------------------------------------

/// Category detection patterns. ORDER MATTERS: specific topics come first so
/// that e.g. "what festivals..." is not swallowed by the generic "what" rule.
static CATEGORY_PATTERNS: Lazy<Vec<(QuestionCategory, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (
            QuestionCategory::Festivals,
            compile_patterns(&[
                r"(?i)festival|celebrat|\bfair\b|\bmela\b|\bevents?\b",
                r"(?i)diwali|holi|puja|utsav|ceremon|ritual|procession",
            ]),
        ),
        (
            QuestionCategory::CrowdInfo,
            compile_patterns(&[
                r"(?i)crowd|busy|rush|queue|\bpeak\b|footfall",
                r"(?i)how many (people|visitors|tourists)|is it (quiet|packed)",
            ]),
        ),
        (
            QuestionCategory::Facilities,
            compile_patterns(&[
                r"(?i)parking|restroom|toilet|washroom|wheelchair|accessib",
                r"(?i)\bfood\b|cafe|canteen|restaurant|locker|cloakroom|drinking water",
                r"(?i)facilit|amenit",
            ]),
        ),
        (
            QuestionCategory::VisitingInfo,
            compile_patterns(&[
                r"(?i)timing|opening|\bopen\b|closed|\bhours?\b|ticket|entry fee|\bfees?\b",
                r"(?i)admission|best time|when (should|to|can) i (visit|go)|how to (reach|get)",
                r"(?i)plan (a|my) visit|visiting",
            ]),
        ),
        (
            QuestionCategory::Architecture,
            compile_patterns(&[
                r"(?i)architect|design|\bdome|minaret|marble|carving|sculpt",
                r"(?i)\bstyle\b|built with|made of|structure|pillar",
            ]),
        ),
        (
            QuestionCategory::History,
            compile_patterns(&[
                r"(?i)histor|who built|when was it built|when was .* built|built by",
                r"(?i)ancient|century|dynasty|emperor|\bking\b|\bqueen\b|ruler|origin",
            ]),
        ),
        (
            QuestionCategory::Activities,
            compile_patterns(&[
                r"(?i)things to do|what (can|should) (i|we) do|activit",
                r"(?i)explore|boat|trek|hike|\btour\b|shopping|photograph|sunset|sunrise",
            ]),
        ),
        (
            QuestionCategory::Significance,
            compile_patterns(&[
                r"(?i)signific|important|famous|known for|why (is|was) it|special",
                r"(?i)unesco|heritage|sacred|holy|pilgrim|symbol",
            ]),
        ),
        (
            QuestionCategory::Location,
            compile_patterns(&[
                r"(?i)\bwhere\b|located|location|situated|which (city|state)",
                r"(?i)how far|distance|\bnear\b|nearby|address|directions",
            ]),
        ),
        (
            QuestionCategory::General,
            compile_patterns(&[r"(?i)\bwhat\b|\babout\b|tell me|describe|explain"]),
        ),
    ]
});

/// Short pleasantries that do not need a model call.
const ACKNOWLEDGMENTS: &[&str] = &[
    "ok",
    "okay",
    "k",
    "thanks",
    "thank",
    "thank you",
    "thank you so much",
    "thanks so much",
    "thank u",
    "thx",
    "ty",
    "got it",
    "cool",
    "great",
    "nice",
    "alright",
    "sure",
    "awesome",
    "perfect",
    "understood",
    "noted",
];

const MAX_ACKNOWLEDGMENT_LEN: usize = 24;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Classify a question. Falls back to [`QuestionCategory::General`].
pub fn classify_question(question: &str) -> QuestionCategory {
    for (category, patterns) in CATEGORY_PATTERNS.iter() {
        if patterns.iter().any(|re| re.is_match(question)) {
            return *category;
        }
    }
    QuestionCategory::General
}

/// Whether `message` is a short acknowledgment such as "ok" or "thanks!".
pub fn is_acknowledgment(message: &str) -> bool {
    let trimmed = message.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_ACKNOWLEDGMENT_LEN {
        return false;
    }
    let normalized: String = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    ACKNOWLEDGMENTS.contains(&normalized.as_str())
}

fn compile_patterns(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}
