//! Core data models used throughout the rune engine.
//!
//! A [`Rune`] is the unit of work and persistence: one pipeline run over one
//! input file produces one rune. Its semantic payload is the
//! [`NineFieldRecord`], which is always fully shaped; unknown or failed
//! fields are empty strings or empty lists, never absent keys.
//!
//! Serialized keys follow the camelCase schema (`imageDescription`,
//! `promptSeed`, ...). Deserialization also accepts the legacy spellings
//! emitted by older prompt templates (`imageDesc`, `prompt`, `_fallback`,
//! `nine_turns`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Configured embedding dimension when nothing else is known.
pub const DEFAULT_DIMENSION: usize = 768;
/// Embedding model recorded in `turns.8_structure` by default.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
/// Category assigned when neither the model nor the user supplies one.
pub const DEFAULT_CATEGORY: &str = "uncategorized";
/// Display name for runes created without one.
pub const DEFAULT_RUNE_NAME: &str = "untitled rune";
pub const DEFAULT_EVOLUTION_VERSION: &str = "1.0";
pub const DEFAULT_UPDATE_RULE: &str = "regenerate when the rune's semantics change";
pub const DEFAULT_CONTEXT_SOURCE: &str = "modal fusion";
pub const RECORD_VERSION: &str = "1.0";

/// The kind of raw content extracted from an input file.
///
/// Declaration order is the canonical order (text, image, audio, video)
/// used when modality sets are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
}

impl Modality {
    /// Classify a MIME type by its prefix. Anything outside
    /// `text/*`, `image/*`, `audio/*`, `video/*` is unclassified.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(Modality::Image)
        } else if mime.starts_with("audio/") {
            Some(Modality::Audio)
        } else if mime.starts_with("video/") {
            Some(Modality::Video)
        } else if mime.starts_with("text/") {
            Some(Modality::Text)
        } else {
            None
        }
    }
}

/// Symbolic meaning of the rune.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Core {
    pub intent: String,
    pub essence: String,
    pub purpose: String,
}

/// Raw modal artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Content {
    pub text: String,
    #[serde(alias = "imageDesc")]
    pub image_description: String,
    #[serde(alias = "audioText")]
    pub audio_transcript: String,
    pub video_summary: String,
    /// Still frame of a video input, as a `data:image/jpeg;base64,...` URL.
    #[serde(alias = "videoFrame")]
    pub video_frame_image: String,
}

impl Content {
    /// Modalities that actually produced non-empty content.
    ///
    /// A video still frame counts as image content even when its caption
    /// is missing.
    pub fn modalities(&self) -> BTreeSet<Modality> {
        let mut set = BTreeSet::new();
        if !self.text.trim().is_empty() {
            set.insert(Modality::Text);
        }
        if !self.image_description.trim().is_empty() || !self.video_frame_image.trim().is_empty()
        {
            set.insert(Modality::Image);
        }
        if !self.audio_transcript.trim().is_empty() {
            set.insert(Modality::Audio);
        }
        if !self.video_summary.trim().is_empty() {
            set.insert(Modality::Video);
        }
        set
    }

    /// Fill every blank field from `other`, leaving non-empty fields alone.
    pub fn fill_blanks_from(&mut self, other: &Content) {
        fill_blank(&mut self.text, &other.text);
        fill_blank(&mut self.image_description, &other.image_description);
        fill_blank(&mut self.audio_transcript, &other.audio_transcript);
        fill_blank(&mut self.video_summary, &other.video_summary);
        fill_blank(&mut self.video_frame_image, &other.video_frame_image);
    }

    /// The four captioned/textual artifacts joined by newlines, skipping
    /// empty ones. The still frame is binary and never included.
    pub fn combined_text(&self) -> String {
        [
            self.text.as_str(),
            self.image_description.as_str(),
            self.audio_transcript.as_str(),
            self.video_summary.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
    }
}

fn fill_blank(target: &mut String, source: &str) {
    if target.trim().is_empty() && !source.trim().is_empty() {
        *target = source.to_string();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Metadata {
    pub language: String,
    pub emotion: String,
    pub keywords: Vec<String>,
    pub summary: String,
    #[serde(alias = "prompt")]
    pub prompt_seed: String,
    #[serde(alias = "_fallback")]
    pub fallback_flag: bool,
}

/// Slot 8: how the rune maps onto modalities and vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StructureTurn {
    pub modalities: BTreeSet<Modality>,
    #[serde(alias = "embedding_type")]
    pub embedding_model: String,
    pub dimension: usize,
}

impl Default for StructureTurn {
    fn default() -> Self {
        Self {
            modalities: BTreeSet::new(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
        }
    }
}

/// Slot 9: versioning and self-update rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvolutionTurn {
    pub version: String,
    #[serde(alias = "update_logic")]
    pub update_rule: String,
}

impl Default for EvolutionTurn {
    fn default() -> Self {
        Self {
            version: DEFAULT_EVOLUTION_VERSION.to_string(),
            update_rule: DEFAULT_UPDATE_RULE.to_string(),
        }
    }
}

/// The nine semantic turns, from origin to evolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NineTurns {
    #[serde(rename = "1_origin")]
    pub origin: String,
    #[serde(rename = "2_form")]
    pub form: String,
    #[serde(rename = "3_name")]
    pub name: String,
    #[serde(rename = "4_meaning")]
    pub meaning: String,
    #[serde(rename = "5_function")]
    pub function: String,
    #[serde(rename = "6_action")]
    pub action: String,
    #[serde(rename = "7_tone")]
    pub tone: String,
    #[serde(rename = "8_structure")]
    pub structure: StructureTurn,
    #[serde(rename = "9_evolution")]
    pub evolution: EvolutionTurn,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuneContext {
    pub source: String,
    pub references: Vec<String>,
    pub relations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    pub parsed: bool,
    pub processed: bool,
    pub validated: bool,
}

/// The fixed semantic schema every rune conforms to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NineFieldRecord {
    pub core: Core,
    pub content: Content,
    pub metadata: Metadata,
    #[serde(alias = "nine_turns")]
    pub turns: NineTurns,
    pub context: RuneContext,
    pub status: Status,
}

/// The persisted record produced by one pipeline run over one input file.
///
/// `id` is assigned at creation and never changes. `vector` is either empty
/// (no embedding obtained) or exactly the embedding dimension long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rune {
    id: String,
    pub name: String,
    pub category: String,
    pub nine_fields: NineFieldRecord,
    pub vector: Vec<f64>,
    pub fallback: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub version: String,
}

impl Rune {
    /// Allocate an empty rune with a fresh identifier.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: format!("rune_{}", Uuid::new_v4().simple()),
            name: if name.trim().is_empty() {
                DEFAULT_RUNE_NAME.to_string()
            } else {
                name
            },
            category: DEFAULT_CATEGORY.to_string(),
            nine_fields: NineFieldRecord::default(),
            vector: Vec::new(),
            fallback: false,
            created_at: now,
            modified_at: now,
            version: RECORD_VERSION.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Bump the modification timestamp after an in-place mutation.
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_from_mime_prefix() {
        assert_eq!(Modality::from_mime("image/png"), Some(Modality::Image));
        assert_eq!(Modality::from_mime("audio/wav"), Some(Modality::Audio));
        assert_eq!(Modality::from_mime("video/mp4"), Some(Modality::Video));
        assert_eq!(Modality::from_mime("text/plain"), Some(Modality::Text));
        assert_eq!(Modality::from_mime("Text/Markdown"), Some(Modality::Text));
        assert_eq!(Modality::from_mime("application/pdf"), None);
        assert_eq!(Modality::from_mime(""), None);
    }

    #[test]
    fn new_rune_is_empty_and_fully_shaped() {
        let rune = Rune::new("sunrise.png");
        assert!(rune.id().starts_with("rune_"));
        assert_eq!(rune.name, "sunrise.png");
        assert_eq!(rune.category, DEFAULT_CATEGORY);
        assert!(rune.vector.is_empty());
        assert!(!rune.fallback);

        let json = serde_json::to_value(&rune).unwrap();
        let fields = &json["nineFields"];
        for key in ["core", "content", "metadata", "turns", "context", "status"] {
            assert!(fields.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(fields["turns"]["8_structure"]["dimension"], 768);
        assert_eq!(fields["content"]["imageDescription"], "");
    }

    #[test]
    fn blank_name_gets_default() {
        assert_eq!(Rune::new("  ").name, DEFAULT_RUNE_NAME);
    }

    #[test]
    fn content_modalities_only_count_non_empty_fields() {
        let content = Content {
            text: "hello".into(),
            video_frame_image: "data:image/jpeg;base64,AAAA".into(),
            audio_transcript: "   ".into(),
            ..Default::default()
        };
        let set: Vec<_> = content.modalities().into_iter().collect();
        assert_eq!(set, vec![Modality::Text, Modality::Image]);
    }

    #[test]
    fn legacy_keys_are_accepted() {
        let json = serde_json::json!({
            "content": { "imageDesc": "a cat", "audioText": "meow" },
            "metadata": { "prompt": "cats", "_fallback": true },
            "nine_turns": {
                "8_structure": { "embedding_type": "m", "dimension": 3, "modalities": ["image"] },
                "9_evolution": { "update_logic": "never" }
            }
        });
        let record: NineFieldRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.content.image_description, "a cat");
        assert_eq!(record.content.audio_transcript, "meow");
        assert_eq!(record.metadata.prompt_seed, "cats");
        assert!(record.metadata.fallback_flag);
        assert_eq!(record.turns.structure.embedding_model, "m");
        assert_eq!(record.turns.evolution.update_rule, "never");
        assert_eq!(record.turns.evolution.version, DEFAULT_EVOLUTION_VERSION);
    }

    #[test]
    fn fill_blanks_keeps_existing_values() {
        let mut content = Content {
            text: "kept".into(),
            ..Default::default()
        };
        let other = Content {
            text: "ignored".into(),
            audio_transcript: "filled".into(),
            ..Default::default()
        };
        content.fill_blanks_from(&other);
        assert_eq!(content.text, "kept");
        assert_eq!(content.audio_transcript, "filled");
    }
}
