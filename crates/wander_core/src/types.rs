use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Destinations
// ---------------------------------------------------------------------------

/// Where the current copy of a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Handed in by the caller (e.g. a list page that already loaded it).
    Preloaded,
    /// Read from the on-device store.
    #[default]
    Local,
    /// Fetched from the remote document store.
    Remote,
    /// Augmented with AI-generated fields.
    Enriched,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preloaded => "preloaded",
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Enriched => "enriched",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preloaded" => Some(Self::Preloaded),
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            "enriched" => Some(Self::Enriched),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Structured history of a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoricalInfo {
    pub brief_description: String,
    pub extended_description: String,
    pub key_events: Vec<String>,
    pub related_figures: Vec<String>,
}

impl HistoricalInfo {
    pub fn is_empty(&self) -> bool {
        self.brief_description.is_empty()
            && self.extended_description.is_empty()
            && self.key_events.is_empty()
            && self.related_figures.is_empty()
    }
}

/// Learning-oriented facts about a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EducationalInfo {
    pub facts: Vec<String>,
    pub importance: String,
    pub cultural_relevance: String,
    pub architectural_style: String,
}

impl EducationalInfo {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
            && self.importance.is_empty()
            && self.cultural_relevance.is_empty()
            && self.architectural_style.is_empty()
    }
}

/// A travel destination. Unique by `id`; stores upsert on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Destination {
    pub id: String,
    pub name: String,
    /// Free-form place hint ("Agra, Uttar Pradesh").
    pub location: String,
    pub category: String,
    pub coordinates: Option<Coordinates>,
    pub description: String,
    pub historical_info: Option<HistoricalInfo>,
    pub educational_info: Option<EducationalInfo>,
    pub image_url: Option<String>,
    pub image_urls: Vec<String>,
    #[serde(skip)]
    pub provenance: Provenance,
}

impl Destination {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Build a record from a remote document body. The document id wins over
    /// any `id` field embedded in the body.
    pub fn from_document(id: &str, fields: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut dest: Destination = serde_json::from_value(fields)?;
        dest.id = id.to_string();
        dest.provenance = Provenance::Remote;
        Ok(dest)
    }

    /// Body suitable for writing back to the remote document store.
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Text used as context for enrichment and chat.
    pub fn context_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !self.description.trim().is_empty() {
            parts.push(self.description.trim());
        }
        if let Some(ref h) = self.historical_info {
            if !h.brief_description.is_empty() {
                parts.push(h.brief_description.trim());
            }
            if !h.extended_description.is_empty() {
                parts.push(h.extended_description.trim());
            }
        }
        if let Some(ref e) = self.educational_info {
            if !e.importance.is_empty() {
                parts.push(e.importance.trim());
            }
            if !e.cultural_relevance.is_empty() {
                parts.push(e.cultural_relevance.trim());
            }
        }
        parts.join(" ")
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// A resolved image for an entity, cached until explicitly invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCacheEntry {
    pub entity_id: String,
    pub url: String,
    /// Name of the provider that produced the URL.
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

/// Result of the last reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub online: bool,
    pub checked_at: tokio::time::Instant,
    /// Set when the value came from a simulation override, not a real probe.
    pub simulated: bool,
}

impl ConnectivitySnapshot {
    pub fn is_fresh(&self, window: std::time::Duration) -> bool {
        self.checked_at.elapsed() <= window
    }
}
