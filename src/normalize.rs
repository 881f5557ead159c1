//! Schema normalization of model output into a [`NineFieldRecord`].
//!
//! [`SchemaNormalizer::normalize`] is total: whatever the composite call
//! returned, the result is a fully shaped record.
//!
//! # Structured path
//!
//! Every field is read from the model's JSON object when present, non-empty
//! and of the right type; otherwise it is backfilled from the bundle
//! gathered before the call, and otherwise from the schema default. The one
//! exception is `content.text`: the extracted source text always wins over
//! whatever the model echoes back.
//!
//! # Heuristic path
//!
//! Without a structured object the record is synthesized from the bundle's
//! combined text with the rules in [`crate::text`], and marked with
//! `metadata.fallbackFlag = true` and `status.validated = false`.
//!
//! Both paths set `turns.3_name` to the bundle name when nothing else
//! supplies one and compute `turns.8_structure.modalities` from the content
//! that is actually non-empty.

use serde_json::{Map, Value};
use tracing::debug;

use crate::gateway::{Bundle, Understanding};
use crate::models::{
    Content, Core, EvolutionTurn, Metadata, NineFieldRecord, NineTurns, RuneContext, Status,
    StructureTurn, DEFAULT_CATEGORY, DEFAULT_CONTEXT_SOURCE, DEFAULT_EVOLUTION_VERSION,
    DEFAULT_RUNE_NAME, DEFAULT_UPDATE_RULE,
};
use crate::text::{
    detect_language, extract_keywords, simple_understanding, truncate_chars, EMOTION_NEUTRAL,
    FALLBACK_KEYWORDS,
};

const PROMPT_SEED_CHARS: usize = 200;
const FALLBACK_SUMMARY_CHARS: usize = 180;
const FALLBACK_PROMPT_SEED_CHARS: usize = 120;
const FALLBACK_FORM: &str = "symbol";
const FALLBACK_MEANING: &str = "multimodal semantic synthesis";
const FALLBACK_FUNCTION: &str = "evoke and record meaning";
const FALLBACK_ACTION: &str = "triggered when related themes are entered";

/// Normalizer output: the record plus the rune-level name and category.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub name: String,
    pub category: String,
    pub record: NineFieldRecord,
}

impl Normalized {
    /// Flat JSON form (`name`, `category` next to the record's keys), the
    /// same shape the composite call is asked to produce.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(&self.record)?;
        if let Value::Object(map) = &mut value {
            map.insert("name".to_string(), Value::String(self.name.clone()));
            map.insert("category".to_string(), Value::String(self.category.clone()));
        }
        Ok(value)
    }
}

pub struct SchemaNormalizer {
    embedding_model: String,
    dims: usize,
}

impl SchemaNormalizer {
    pub fn new(embedding_model: impl Into<String>, dims: usize) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            dims,
        }
    }

    pub fn normalize(&self, understanding: &Understanding, bundle: &Bundle) -> Normalized {
        match understanding.value().and_then(Value::as_object) {
            Some(raw) => {
                debug!(
                    recovered = matches!(understanding, Understanding::RecoveredStructured(_)),
                    "normalizing structured understanding"
                );
                self.from_structured(raw, bundle)
            }
            None => {
                if let Understanding::Unstructured { reason } = understanding {
                    debug!(%reason, "normalizing from heuristics");
                }
                self.from_heuristics(bundle)
            }
        }
    }

    fn from_structured(&self, raw: &Map<String, Value>, bundle: &Bundle) -> Normalized {
        let empty = Map::new();
        let raw_core = obj_field(raw, &["core"]).unwrap_or(&empty);
        let raw_content = obj_field(raw, &["content"]).unwrap_or(&empty);
        let raw_meta = obj_field(raw, &["metadata"]).unwrap_or(&empty);
        let raw_turns = obj_field(raw, &["turns", "nine_turns", "nineTurns"]).unwrap_or(&empty);
        let raw_context = obj_field(raw, &["context"]).unwrap_or(&empty);

        let core = Core {
            intent: str_field(raw_core, &["intent"]).unwrap_or_default(),
            essence: str_field(raw_core, &["essence"]).unwrap_or_default(),
            purpose: str_field(raw_core, &["purpose"]).unwrap_or_default(),
        };

        let local = &bundle.content;
        let content = Content {
            text: if local.text.trim().is_empty() {
                str_field(raw_content, &["text"]).unwrap_or_default()
            } else {
                local.text.clone()
            },
            image_description: str_field(
                raw_content,
                &["imageDescription", "image_description", "imageDesc"],
            )
            .unwrap_or_else(|| local.image_description.clone()),
            audio_transcript: str_field(
                raw_content,
                &["audioTranscript", "audio_transcript", "audioText"],
            )
            .unwrap_or_else(|| local.audio_transcript.clone()),
            video_summary: str_field(raw_content, &["videoSummary", "video_summary"])
                .unwrap_or_else(|| local.video_summary.clone()),
            video_frame_image: str_field(
                raw_content,
                &["videoFrameImage", "video_frame_image", "videoFrame"],
            )
            .unwrap_or_else(|| local.video_frame_image.clone()),
        };

        let summary = str_field(raw_meta, &["summary"]).unwrap_or_default();
        let keywords = list_field(raw_meta, &["keywords"])
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| {
                let source = if summary.trim().is_empty() {
                    content.text.as_str()
                } else {
                    summary.as_str()
                };
                extract_keywords(source, FALLBACK_KEYWORDS)
            });
        let metadata = Metadata {
            language: str_field(raw_meta, &["language"])
                .unwrap_or_else(|| detect_language(&content.combined_text()).to_string()),
            emotion: str_field(raw_meta, &["emotion"])
                .unwrap_or_else(|| EMOTION_NEUTRAL.to_string()),
            keywords,
            prompt_seed: str_field(raw_meta, &["promptSeed", "prompt_seed", "prompt"])
                .unwrap_or_else(|| truncate_chars(&summary, PROMPT_SEED_CHARS)),
            fallback_flag: bool_field(raw_meta, &["fallbackFlag", "fallback_flag", "_fallback"])
                .unwrap_or(false),
            summary,
        };

        let turns = self.structured_turns(raw_turns, &content, bundle);

        let context = RuneContext {
            source: str_field(raw_context, &["source"])
                .unwrap_or_else(|| DEFAULT_CONTEXT_SOURCE.to_string()),
            references: list_field(raw_context, &["references"]).unwrap_or_default(),
            relations: list_field(raw_context, &["relations"]).unwrap_or_default(),
        };

        let status = match obj_field(raw, &["status"]) {
            Some(s) => Status {
                parsed: bool_field(s, &["parsed"]).unwrap_or(true),
                processed: bool_field(s, &["processed"]).unwrap_or(true),
                validated: bool_field(s, &["validated"]).unwrap_or(true),
            },
            None => Status {
                parsed: true,
                processed: true,
                validated: true,
            },
        };

        Normalized {
            name: str_field(raw, &["name", "rune_name", "runeName"])
                .unwrap_or_else(|| display_name(bundle)),
            category: str_field(raw, &["category"])
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            record: NineFieldRecord {
                core,
                content,
                metadata,
                turns,
                context,
                status,
            },
        }
    }

    fn structured_turns(
        &self,
        raw: &Map<String, Value>,
        content: &Content,
        bundle: &Bundle,
    ) -> NineTurns {
        let turn = |key: &str| str_field(raw, &[key]).unwrap_or_default();

        let empty = Map::new();
        let raw_structure = obj_field(raw, &["8_structure"]).unwrap_or(&empty);
        let raw_evolution = obj_field(raw, &["9_evolution"]).unwrap_or(&empty);

        NineTurns {
            origin: turn("1_origin"),
            form: turn("2_form"),
            name: str_field(raw, &["3_name"]).unwrap_or_else(|| bundle.name.clone()),
            meaning: turn("4_meaning"),
            function: turn("5_function"),
            action: turn("6_action"),
            tone: turn("7_tone"),
            structure: StructureTurn {
                modalities: content.modalities(),
                embedding_model: str_field(
                    raw_structure,
                    &["embeddingModel", "embedding_model", "embedding_type"],
                )
                .unwrap_or_else(|| self.embedding_model.clone()),
                dimension: raw_structure
                    .get("dimension")
                    .and_then(Value::as_u64)
                    .filter(|d| *d > 0)
                    .map(|d| d as usize)
                    .unwrap_or(self.dims),
            },
            evolution: EvolutionTurn {
                version: str_field(raw_evolution, &["version"])
                    .unwrap_or_else(|| DEFAULT_EVOLUTION_VERSION.to_string()),
                update_rule: str_field(
                    raw_evolution,
                    &["updateRule", "update_rule", "update_logic"],
                )
                .unwrap_or_else(|| DEFAULT_UPDATE_RULE.to_string()),
            },
        }
    }

    fn from_heuristics(&self, bundle: &Bundle) -> Normalized {
        let combined = bundle.combined_text();
        let basic = simple_understanding(&combined);
        let keywords = extract_keywords(&combined, FALLBACK_KEYWORDS);
        let content = bundle.content.clone();

        let turns = NineTurns {
            origin: basic.intent.clone(),
            form: keywords
                .first()
                .cloned()
                .unwrap_or_else(|| FALLBACK_FORM.to_string()),
            name: bundle.name.clone(),
            meaning: FALLBACK_MEANING.to_string(),
            function: FALLBACK_FUNCTION.to_string(),
            action: FALLBACK_ACTION.to_string(),
            tone: basic.emotion.clone(),
            structure: StructureTurn {
                modalities: content.modalities(),
                embedding_model: self.embedding_model.clone(),
                dimension: self.dims,
            },
            evolution: EvolutionTurn::default(),
        };

        let metadata = Metadata {
            language: detect_language(&combined).to_string(),
            emotion: basic.emotion,
            keywords,
            summary: truncate_chars(&combined, FALLBACK_SUMMARY_CHARS),
            prompt_seed: truncate_chars(&combined, FALLBACK_PROMPT_SEED_CHARS),
            fallback_flag: true,
        };

        Normalized {
            name: display_name(bundle),
            category: DEFAULT_CATEGORY.to_string(),
            record: NineFieldRecord {
                core: Core {
                    intent: basic.intent,
                    essence: basic.essence,
                    purpose: basic.purpose,
                },
                content,
                metadata,
                turns,
                context: RuneContext {
                    source: DEFAULT_CONTEXT_SOURCE.to_string(),
                    ..Default::default()
                },
                status: Status {
                    parsed: true,
                    processed: true,
                    validated: false,
                },
            },
        }
    }
}

fn display_name(bundle: &Bundle) -> String {
    if bundle.name.trim().is_empty() {
        DEFAULT_RUNE_NAME.to_string()
    } else {
        bundle.name.clone()
    }
}

fn obj_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Map<String, Value>> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_object))
}

/// First non-blank string under any of `keys`. Other JSON types count as
/// absent.
fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        obj.get(*k)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

/// Booleans, also accepting `"true"` / `"false"` strings.
fn bool_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// String lists, also accepting a comma-separated string.
fn list_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<Vec<String>> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Some(Value::String(s)) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Modality;
    use serde_json::json;

    fn normalizer() -> SchemaNormalizer {
        SchemaNormalizer::new("text-embedding-004", 768)
    }

    fn text_bundle(text: &str) -> Bundle {
        Bundle::new(
            "note.txt",
            Content {
                text: text.to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn unstructured_input_uses_heuristics() {
        let n = normalizer().normalize(
            &Understanding::unstructured("timeout"),
            &text_bundle("I love this algorithm. The algorithm is great."),
        );
        let r = &n.record;
        assert!(r.metadata.fallback_flag);
        assert!(!r.status.validated);
        assert_eq!(r.metadata.emotion, "positive");
        assert_eq!(r.core.essence, "technical content");
        assert_eq!(r.metadata.language, "English");
        assert_eq!(r.metadata.keywords[0], "algorithm");
        assert_eq!(r.turns.form, "algorithm");
        assert_eq!(r.turns.origin, r.core.intent);
        assert_eq!(r.turns.tone, "positive");
        assert_eq!(r.turns.name, "note.txt");
        assert_eq!(n.name, "note.txt");
        assert_eq!(n.category, DEFAULT_CATEGORY);
        assert_eq!(r.context.source, DEFAULT_CONTEXT_SOURCE);
    }

    #[test]
    fn heuristic_summary_and_seed_are_bounded() {
        let text = "word ".repeat(100);
        let n = normalizer().normalize(&Understanding::unstructured(""), &text_bundle(&text));
        assert_eq!(n.record.metadata.summary.chars().count(), 180);
        assert_eq!(n.record.metadata.prompt_seed.chars().count(), 120);
    }

    #[test]
    fn empty_bundle_still_fully_shaped() {
        let n = normalizer().normalize(&Understanding::unstructured(""), &Bundle::default());
        assert_eq!(n.name, DEFAULT_RUNE_NAME);
        assert_eq!(n.record.turns.form, FALLBACK_FORM);
        assert!(n.record.metadata.keywords.is_empty());
        assert!(n.record.turns.structure.modalities.is_empty());
        assert_eq!(n.record.turns.structure.dimension, 768);
    }

    #[test]
    fn empty_object_backfills_everything() {
        let n = normalizer().normalize(
            &Understanding::Structured(json!({})),
            &text_bundle("Hello world"),
        );
        let r = &n.record;
        assert_eq!(r.content.text, "Hello world");
        assert_eq!(r.metadata.language, "English");
        assert_eq!(r.metadata.emotion, "neutral");
        assert_eq!(r.metadata.keywords, vec!["hello", "world"]);
        assert_eq!(r.turns.name, "note.txt");
        assert!(r.status.parsed && r.status.processed && r.status.validated);
        assert!(!r.metadata.fallback_flag);
        assert_eq!(n.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn model_values_win_except_source_text() {
        let raw = json!({
            "name": "Dawn",
            "content": { "text": "truncated...", "imageDescription": "a sunrise" },
            "metadata": { "keywords": "sun, dawn , ", "emotion": "hopeful" },
        });
        let bundle = Bundle::new(
            "dawn.png",
            Content {
                text: "full source text".into(),
                image_description: "local caption".into(),
                ..Default::default()
            },
        );
        let n = normalizer().normalize(&Understanding::RecoveredStructured(raw), &bundle);
        assert_eq!(n.name, "Dawn");
        assert_eq!(n.record.content.text, "full source text");
        assert_eq!(n.record.content.image_description, "a sunrise");
        assert_eq!(n.record.metadata.keywords, vec!["sun", "dawn"]);
        assert_eq!(n.record.metadata.emotion, "hopeful");
    }

    #[test]
    fn wrong_types_are_treated_as_absent() {
        let raw = json!({
            "name": 42,
            "core": "not an object",
            "metadata": { "language": ["x"], "summary": null, "fallbackFlag": "yes" },
            "turns": { "8_structure": { "dimension": -3 } },
            "status": { "validated": "false" },
        });
        let n = normalizer().normalize(&Understanding::Structured(raw), &text_bundle("你好"));
        assert_eq!(n.name, "note.txt");
        assert_eq!(n.record.core, Core::default());
        assert_eq!(n.record.metadata.language, "Chinese");
        assert!(!n.record.metadata.fallback_flag);
        assert_eq!(n.record.turns.structure.dimension, 768);
        assert!(!n.record.status.validated);
        assert!(n.record.status.parsed);
    }

    #[test]
    fn legacy_keys_are_read() {
        let raw = json!({
            "rune_name": "Old",
            "nine_turns": {
                "1_origin": "o",
                "9_evolution": { "update_logic": "manual" }
            },
            "metadata": { "prompt": "seed", "_fallback": true },
            "content": { "imageDesc": "legacy caption" }
        });
        let n = normalizer().normalize(&Understanding::Structured(raw), &Bundle::default());
        assert_eq!(n.name, "Old");
        assert_eq!(n.record.turns.origin, "o");
        assert_eq!(n.record.turns.evolution.update_rule, "manual");
        assert_eq!(n.record.metadata.prompt_seed, "seed");
        assert!(n.record.metadata.fallback_flag);
        assert_eq!(n.record.content.image_description, "legacy caption");
    }

    #[test]
    fn modalities_follow_actual_content() {
        let raw = json!({
            "turns": { "8_structure": { "modalities": ["text", "audio", "video"] } }
        });
        let bundle = Bundle::new(
            "clip.mp4",
            Content {
                video_frame_image: "data:image/jpeg;base64,AA==".into(),
                ..Default::default()
            },
        );
        let n = normalizer().normalize(&Understanding::Structured(raw), &bundle);
        let modalities: Vec<_> = n.record.turns.structure.modalities.into_iter().collect();
        assert_eq!(modalities, vec![Modality::Image]);
    }

    #[test]
    fn normalization_is_idempotent() {
        let normalizer = normalizer();
        let bundle = text_bundle("Rust makes systems programming safe and fun.");

        for first in [
            normalizer.normalize(&Understanding::unstructured(""), &bundle),
            normalizer.normalize(
                &Understanding::Structured(json!({"core": {"intent": "teach"}})),
                &bundle,
            ),
        ] {
            let again = normalizer.normalize(
                &Understanding::Structured(first.to_value().unwrap()),
                &bundle,
            );
            assert_eq!(again, first);
        }
    }
}
