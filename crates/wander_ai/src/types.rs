use serde::{Deserialize, Serialize};
use wander_core::{Destination, EducationalInfo, HistoricalInfo, Provenance};

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Fields produced by an enrichment call. Absent or blank fields leave the
/// destination untouched when merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EnrichedFields {
    pub description: Option<String>,
    pub historical_info: Option<HistoricalInfo>,
    pub educational_info: Option<EducationalInfo>,
}

impl EnrichedFields {
    pub fn is_empty(&self) -> bool {
        self.description
            .as_deref()
            .is_none_or(|d| d.trim().is_empty())
            && self.historical_info.as_ref().is_none_or(|h| h.is_empty())
            && self.educational_info.as_ref().is_none_or(|e| e.is_empty())
    }

    /// The enrichment-bearing fields of an already enriched record.
    pub fn from_destination(dest: &Destination) -> Self {
        Self {
            description: Some(dest.description.clone()),
            historical_info: dest.historical_info.clone(),
            educational_info: dest.educational_info.clone(),
        }
    }

    /// Merge into `dest` and tag it as enriched.
    pub fn apply_to(&self, dest: &mut Destination) {
        if let Some(ref d) = self.description {
            if !d.trim().is_empty() {
                dest.description = d.trim().to_string();
            }
        }
        if let Some(ref h) = self.historical_info {
            if !h.is_empty() {
                dest.historical_info = Some(h.clone());
            }
        }
        if let Some(ref e) = self.educational_info {
            if !e.is_empty() {
                dest.educational_info = Some(e.clone());
            }
        }
        dest.provenance = Provenance::Enriched;
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// One line of a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub is_user: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_count_as_empty() {
        let fields = EnrichedFields {
            description: Some("   ".into()),
            historical_info: Some(HistoricalInfo::default()),
            educational_info: None,
        };
        assert!(fields.is_empty());
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut dest = Destination::new("taj", "Taj Mahal")
            .with_description("Original.")
            .with_image_url("https://img.example/taj.jpg");
        let fields = EnrichedFields {
            description: None,
            historical_info: Some(HistoricalInfo {
                brief_description: "Commissioned in 1632.".into(),
                ..Default::default()
            }),
            educational_info: None,
        };
        fields.apply_to(&mut dest);

        assert_eq!(dest.description, "Original.");
        assert_eq!(dest.image_url.as_deref(), Some("https://img.example/taj.jpg"));
        assert_eq!(
            dest.historical_info.unwrap().brief_description,
            "Commissioned in 1632."
        );
        assert_eq!(dest.provenance, Provenance::Enriched);
    }

    #[test]
    fn fields_carry_over_from_enriched_record() {
        let mut enriched = Destination::new("taj", "Taj Mahal").with_description("Long form.");
        enriched.historical_info = Some(HistoricalInfo {
            brief_description: "Commissioned in 1632.".into(),
            ..Default::default()
        });

        let mut plain = Destination::new("taj", "Taj Mahal").with_description("Short.");
        EnrichedFields::from_destination(&enriched).apply_to(&mut plain);

        assert_eq!(plain.description, "Long form.");
        assert!(plain.historical_info.is_some());
        assert_eq!(plain.provenance, Provenance::Enriched);
    }
}
