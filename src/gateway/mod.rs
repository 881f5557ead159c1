//! Understanding gateway abstraction and implementations.
//!
//! Defines the [`UnderstandingGateway`] trait, the only way the pipeline
//! talks to generative models, and its two implementations:
//! - **[`RemoteGateway`]** calls the proxy HTTP surface (`/generate`,
//!   `/embeddings`, `/vision`, `/audio/transcriptions`).
//! - **[`HeuristicGateway`]** never touches the network; every call
//!   degrades so the pipeline falls back to local heuristics.
//!
//! Also provides the response parsing shared by both sides of the proxy:
//! - [`parse_understanding`] turns model output into an [`Understanding`]
//! - [`extract_response_text`] reads OpenAI- or Gemini-shaped bodies
//! - [`parse_embedding`] and [`parse_transcription`]
//!
//! # Provider Selection
//!
//! Use [`create_gateway`] to instantiate the gateway named by
//! `gateway.provider` in the configuration.

mod heuristic;
mod remote;

pub use heuristic::HeuristicGateway;
pub use remote::RemoteGateway;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::media::InputFile;
use crate::models::Content;
use crate::text::truncate_chars;

/// Caption prompt for still images.
pub const IMAGE_CAPTION_PROMPT: &str =
    "Describe the main content of this image in no more than 50 words.";
/// Caption prompt for the representative frame of a video.
pub const VIDEO_CAPTION_PROMPT: &str =
    "Describe the scene and mood represented by the first frame of this video in no more than 50 words.";

/// Modal artifacts gathered before the composite call, plus a display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    pub name: String,
    pub content: Content,
}

impl Bundle {
    pub fn new(name: impl Into<String>, content: Content) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    /// Text, image description, audio transcript and video summary joined
    /// by newlines.
    pub fn combined_text(&self) -> String {
        self.content.combined_text()
    }
}

/// An image captioning request. `data_url` may also be a remote URL.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub data_url: String,
    pub prompt: Option<String>,
}

impl ImageRequest {
    pub fn prompt_or_default(&self) -> &str {
        self.prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(IMAGE_CAPTION_PROMPT)
    }
}

/// Optional transcription parameters forwarded to the provider.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub language: Option<String>,
}

/// Result of the composite interpretation call.
///
/// Model output is either a JSON object as a whole, a JSON object embedded
/// in surrounding prose, or nothing usable.
#[derive(Debug, Clone, PartialEq)]
pub enum Understanding {
    /// The whole response parsed as a JSON object.
    Structured(Value),
    /// A JSON object was recovered from the outermost brace pair.
    RecoveredStructured(Value),
    /// No structured result; `reason` says why.
    Unstructured { reason: String },
}

impl Understanding {
    /// The structured object, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Understanding::Structured(v) | Understanding::RecoveredStructured(v) => Some(v),
            Understanding::Unstructured { .. } => None,
        }
    }

    pub fn is_structured(&self) -> bool {
        self.value().is_some()
    }

    pub fn unstructured(reason: impl Into<String>) -> Self {
        Understanding::Unstructured {
            reason: reason.into(),
        }
    }
}

/// Generative-model capabilities the pipeline depends on.
///
/// `embed_text`, `caption_image` and `transcribe_audio` report failures as
/// errors; callers turn them into empty results and raise the fallback
/// flag. `interpret_bundle` never fails outward.
#[async_trait]
pub trait UnderstandingGateway: Send + Sync {
    /// Short identifier for logs (e.g. `"remote"`).
    fn name(&self) -> &str;

    /// Embed one text. Blank input returns an empty vector without any
    /// network call.
    async fn embed_text(&self, text: &str) -> Result<Vec<f64>>;

    async fn caption_image(&self, request: ImageRequest) -> Result<String>;

    async fn transcribe_audio(&self, file: &InputFile, options: TranscribeOptions)
        -> Result<String>;

    async fn interpret_bundle(&self, bundle: &Bundle) -> Understanding;
}

/// Create the gateway selected by `config.provider`.
pub fn create_gateway(config: &GatewayConfig) -> anyhow::Result<Arc<dyn UnderstandingGateway>> {
    match config.provider.as_str() {
        "remote" => Ok(Arc::new(RemoteGateway::new(config)?)),
        "heuristic" => Ok(Arc::new(HeuristicGateway)),
        other => bail!("Unknown gateway provider: {}", other),
    }
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````).
pub fn strip_code_fence(text: &str) -> String {
    let raw = text.trim();
    if !(raw.starts_with("```") && raw.ends_with("```")) || raw.len() < 6 {
        return raw.to_string();
    }
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() < 2 {
        return raw.trim_matches('`').trim().to_string();
    }
    // first line carries the optional language tag
    lines[1..lines.len() - 1].join("\n").trim().to_string()
}

/// Classify raw model output into an [`Understanding`].
pub fn parse_understanding(text: &str) -> Understanding {
    let raw = strip_code_fence(text);
    if raw.is_empty() {
        return Understanding::unstructured("empty model output");
    }

    if let Ok(value) = serde_json::from_str::<Value>(&raw) {
        if value.is_object() {
            return Understanding::Structured(value);
        }
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<Value>(&raw[start..=end]) {
                if value.is_object() {
                    return Understanding::RecoveredStructured(value);
                }
            }
        }
    }

    Understanding::unstructured("model output contains no JSON object")
}

/// Pull the generated text out of a chat completion body.
///
/// Accepts `choices[0].message.content` (string or list of text parts) and
/// `candidates[0].content.parts[*].text` (joined by newlines). Returns an
/// empty string when neither shape is present.
pub fn extract_response_text(json: &Value) -> String {
    if let Some(content) = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
    {
        match content {
            Value::String(s) if !s.trim().is_empty() => return s.trim().to_string(),
            Value::Array(parts) => {
                let joined = join_part_texts(parts);
                if !joined.is_empty() {
                    return joined;
                }
            }
            _ => {}
        }
    }

    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| join_part_texts(parts))
        .unwrap_or_default()
}

fn join_part_texts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parse an embedding body: `embedding.values` or `data[0].embedding`.
pub fn parse_embedding(json: &Value) -> Vec<f64> {
    let values = json
        .get("embedding")
        .and_then(|e| e.get("values"))
        .and_then(|v| v.as_array())
        .or_else(|| {
            json.get("data")
                .and_then(|d| d.get(0))
                .and_then(|d| d.get("embedding"))
                .and_then(|e| e.as_array())
        });

    values
        .map(|arr| arr.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect())
        .unwrap_or_default()
}

/// Parse a transcription body: generated text, else `text`, else
/// `segments[*].text` joined by spaces.
pub fn parse_transcription(json: &Value) -> String {
    let text = extract_response_text(json);
    if !text.is_empty() {
        return text;
    }
    if let Some(text) = json.get("text").and_then(|t| t.as_str()) {
        if !text.trim().is_empty() {
            return text.trim().to_string();
        }
    }
    json.get("segments")
        .and_then(|s| s.as_array())
        .map(|segments| {
            segments
                .iter()
                .filter_map(|s| s.get("text").and_then(|t| t.as_str()))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

/// Chat messages for the composite interpretation call.
pub fn composite_messages(bundle: &Bundle, char_limit: usize) -> Value {
    let combined = truncate_chars(&bundle.combined_text(), char_limit);
    let example = serde_json::to_string_pretty(&composite_example())
        .unwrap_or_else(|_| "{}".to_string());

    let user = format!(
        "Analyze the following multimodal content and produce the nine-field rune structure.\n\n\
         Name: {}\n\
         Content:\n{}\n\n\
         Return a single JSON object shaped exactly like this example:\n{}",
        bundle.name, combined, example
    );

    json!([
        {
            "role": "system",
            "content": "You are a rune semantic analyst. Respond with strict JSON only: no prose, no code fences."
        },
        { "role": "user", "content": user }
    ])
}

fn composite_example() -> Value {
    json!({
        "name": "short rune name",
        "category": "category",
        "core": { "intent": "", "essence": "", "purpose": "" },
        "content": {
            "text": "",
            "imageDescription": "",
            "audioTranscript": "",
            "videoSummary": ""
        },
        "metadata": {
            "language": "",
            "emotion": "",
            "keywords": ["keyword"],
            "summary": "",
            "promptSeed": ""
        },
        "turns": {
            "1_origin": "",
            "2_form": "",
            "3_name": "",
            "4_meaning": "",
            "5_function": "",
            "6_action": "",
            "7_tone": "",
            "8_structure": { "modalities": ["text"] },
            "9_evolution": { "version": "1.0", "updateRule": "" }
        },
        "context": { "source": "", "references": [], "relations": [] },
        "status": { "parsed": true, "processed": true, "validated": true }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_language_tag() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  plain  "), "plain");
    }

    #[test]
    fn parse_well_formed_object() {
        let u = parse_understanding(r#"{"name": "dawn"}"#);
        assert!(matches!(u, Understanding::Structured(_)));
        assert_eq!(u.value().unwrap()["name"], "dawn");
    }

    #[test]
    fn parse_fenced_object_is_structured() {
        let u = parse_understanding("```json\n{\"name\": \"dawn\"}\n```");
        assert!(matches!(u, Understanding::Structured(_)));
    }

    #[test]
    fn parse_object_inside_prose_is_recovered() {
        let u = parse_understanding("Sure! Here it is: {\"name\": {\"x\": 1}} Hope that helps.");
        match u {
            Understanding::RecoveredStructured(v) => assert_eq!(v["name"]["x"], 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_without_object_is_unstructured() {
        assert!(!parse_understanding("no json here").is_structured());
        assert!(!parse_understanding("[1, 2, 3]").is_structured());
        assert!(!parse_understanding("").is_structured());
        assert!(!parse_understanding("} backwards {").is_structured());
    }

    #[test]
    fn response_text_from_openai_and_gemini_shapes() {
        let openai = json!({"choices": [{"message": {"content": " hi "}}]});
        assert_eq!(extract_response_text(&openai), "hi");

        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}]});
        assert_eq!(extract_response_text(&gemini), "a\nb");

        assert_eq!(extract_response_text(&json!({"error": "x"})), "");
    }

    #[test]
    fn embedding_shapes() {
        let gemini = json!({"embedding": {"values": [0.5, 1.0]}});
        assert_eq!(parse_embedding(&gemini), vec![0.5, 1.0]);
        let openai = json!({"data": [{"embedding": [1, 2, 3]}]});
        assert_eq!(parse_embedding(&openai), vec![1.0, 2.0, 3.0]);
        assert!(parse_embedding(&json!({})).is_empty());
    }

    #[test]
    fn transcription_shapes() {
        assert_eq!(parse_transcription(&json!({"text": "hello"})), "hello");
        let segs = json!({"segments": [{"text": " one "}, {"text": "two"}]});
        assert_eq!(parse_transcription(&segs), "one two");
        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "spoken"}]}}]});
        assert_eq!(parse_transcription(&gemini), "spoken");
    }

    #[test]
    fn composite_prompt_truncates_combined_text() {
        let bundle = Bundle::new(
            "long",
            Content {
                text: "x".repeat(5000),
                ..Default::default()
            },
        );
        let messages = composite_messages(&bundle, 100);
        let user = messages[1]["content"].as_str().unwrap();
        assert!(user.contains(&"x".repeat(100)));
        assert!(!user.contains(&"x".repeat(101)));
        assert_eq!(messages[0]["role"], "system");
    }

    #[test]
    fn image_request_prompt_default() {
        let req = ImageRequest {
            data_url: "data:image/png;base64,AA==".into(),
            prompt: Some("  ".into()),
        };
        assert_eq!(req.prompt_or_default(), IMAGE_CAPTION_PROMPT);
    }
}
