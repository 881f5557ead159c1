//! Same-origin proxy in front of the model provider.
//!
//! Forwards the four calls the remote gateway makes to the provider's
//! `generateContent` / `embedContent` endpoints, attaching the API key from
//! the process environment. Provider responses (status and JSON body) are
//! returned verbatim.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/gemini/generate` | Chat-style generation (`contents` or OpenAI-style `messages`) |
//! | `POST` | `/api/gemini/vision` | Image captioning, same body as `generate` |
//! | `POST` | `/api/gemini/embeddings` | Text embedding (`text` or `content.parts`) |
//! | `POST` | `/api/gemini/audio/transcriptions` | Multipart upload: `file`, optional `model`, `prompt`, `language` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Local failures answer `500 {"error": "<message>"}`; malformed requests
//! answer `400 {"error": "<message>"}`. Provider errors pass through with
//! the provider's own status and body.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::ProxyConfig;
use crate::media::{decode_data_url, mime_from_extension, MIME_OCTET_STREAM};

const DEFAULT_TRANSCRIBE_PROMPT: &str =
    "Transcribe this audio verbatim. Return only the transcript text.";

/// Shared state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<ProxyConfig>,
    client: reqwest::Client,
    /// Empty when no key is configured; the provider then rejects calls.
    api_key: Arc<String>,
}

/// Start the proxy on `[proxy].bind`. Runs until the process exits.
pub async fn run_proxy(config: &ProxyConfig) -> anyhow::Result<()> {
    let api_key = config.api_key();
    if api_key.is_none() {
        warn!(
            env = %config.api_key_env,
            "provider API key not set, upstream calls will fail authentication"
        );
    }

    let app = router(config, api_key)?;
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!(bind = %config.bind, upstream = %config.provider_url, "proxy listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the proxy router. `api_key` is sent as `x-goog-api-key`.
pub fn router(config: &ProxyConfig, api_key: Option<String>) -> anyhow::Result<Router> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let state = AppState {
        config: Arc::new(config.clone()),
        client,
        api_key: Arc::new(api_key.unwrap_or_default()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route("/api/gemini/generate", post(handle_generate))
        .route("/api/gemini/vision", post(handle_generate))
        .route("/api/gemini/embeddings", post(handle_embeddings))
        .route("/api/gemini/audio/transcriptions", post(handle_transcription))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state))
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "proxy request"
    );
    response
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Local error, rendered as `{"error": "..."}`.
#[derive(Debug)]
struct ProxyError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ProxyError {
    ProxyError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

/// Parse a request body as a JSON object, whatever its content type.
fn parse_json_body(bytes: &[u8]) -> Result<Value, ProxyError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(body) if body.is_object() => Ok(body),
        Ok(_) => Err(bad_request("request body must be a JSON object")),
        Err(e) => Err(bad_request(format!("invalid JSON body: {}", e))),
    }
}

fn internal(message: impl Into<String>) -> ProxyError {
    ProxyError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

// ============ Upstream ============

impl AppState {
    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.provider_url.trim_end_matches('/'),
            model.trim_start_matches("models/"),
            method
        )
    }

    /// POST `body` upstream and relay the provider's status and body.
    async fn forward(&self, url: &str, body: &Value) -> Result<Response, ProxyError> {
        let upstream = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| internal(format!("upstream request failed: {}", e)))?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| internal(format!("upstream body read failed: {}", e)))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), url, "provider returned an error");
        }
        Ok((status, [(header::CONTENT_TYPE, content_type)], bytes).into_response())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /generate, /vision ============

async fn handle_generate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let body = parse_json_body(&body)?;
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&state.config.default_model)
        .to_string();

    let contents = if let Some(contents) = body.get("contents").filter(|c| !c.is_null()) {
        contents.clone()
    } else if let Some(messages) = body.get("messages").and_then(Value::as_array) {
        messages_to_contents(&state.client, messages).await?
    } else {
        return Err(bad_request("request must carry `contents` or `messages`"));
    };

    let mut upstream = json!({ "contents": contents });
    if let Some(config) = body.get("generationConfig") {
        upstream["generationConfig"] = config.clone();
    }

    let url = state.model_url(&model, "generateContent");
    state.forward(&url, &upstream).await
}

/// Convert OpenAI-style messages into a single Gemini `contents` entry.
///
/// String contents and `text` parts become text parts; `image_url` parts
/// (data URLs or remote URLs) and `image_base64` parts become inline data.
async fn messages_to_contents(
    client: &reqwest::Client,
    messages: &[Value],
) -> Result<Value, ProxyError> {
    let mut parts: Vec<Value> = Vec::new();

    for message in messages {
        match message.get("content") {
            Some(Value::String(text)) => {
                if !text.trim().is_empty() {
                    parts.push(json!({ "text": text }));
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(part) = convert_part(client, item).await? {
                        parts.push(part);
                    }
                }
            }
            _ => {}
        }
    }

    if parts.is_empty() {
        return Err(bad_request("messages carry no usable content"));
    }
    Ok(json!([{ "role": "user", "parts": parts }]))
}

async fn convert_part(client: &reqwest::Client, item: &Value) -> Result<Option<Value>, ProxyError> {
    let kind = item.get("type").and_then(Value::as_str).unwrap_or("text");
    match kind {
        "text" => Ok(item
            .get("text")
            .and_then(Value::as_str)
            .map(|text| json!({ "text": text }))),
        "image_url" => {
            let url = item
                .get("image_url")
                .and_then(|u| u.get("url").and_then(Value::as_str).or_else(|| u.as_str()))
                .ok_or_else(|| bad_request("image_url part without url"))?;
            let (mime, data) = load_image(client, url).await?;
            Ok(Some(inline_data(&mime, &data)))
        }
        "image_base64" => {
            let source = item.get("image_base64").unwrap_or(item);
            let data = source
                .get("base64")
                .and_then(Value::as_str)
                .ok_or_else(|| bad_request("image_base64 part without base64"))?;
            let mime = source
                .get("mime")
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            Ok(Some(json!({
                "inline_data": { "mime_type": mime, "data": data }
            })))
        }
        _ => Ok(None),
    }
}

/// Resolve an image URL into (MIME type, base64 payload).
async fn load_image(client: &reqwest::Client, url: &str) -> Result<(String, String), ProxyError> {
    if url.starts_with("data:") {
        let (mime, bytes) =
            decode_data_url(url).ok_or_else(|| bad_request("malformed data URL"))?;
        return Ok((mime, STANDARD.encode(bytes)));
    }

    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| internal(format!("failed to fetch image {}: {}", url, e)))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| internal(format!("failed to read image {}: {}", url, e)))?;

    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    let mime = match mime_from_extension(ext) {
        MIME_OCTET_STREAM => "image/jpeg",
        m => m,
    };
    Ok((mime.to_string(), STANDARD.encode(&bytes)))
}

fn inline_data(mime: &str, data: &str) -> Value {
    json!({ "inline_data": { "mime_type": mime, "data": data } })
}

// ============ POST /embeddings ============

async fn handle_embeddings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let body = parse_json_body(&body)?;
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&state.config.embedding_model)
        .to_string();

    let content = if let Some(text) = body.get("text").and_then(Value::as_str) {
        json!({ "parts": [{ "text": text }] })
    } else if let Some(content) = body.get("content").filter(|c| c.get("parts").is_some()) {
        content.clone()
    } else {
        return Err(bad_request("request must carry `text` or `content.parts`"));
    };

    let upstream = json!({
        "model": format!("models/{}", model.trim_start_matches("models/")),
        "content": content,
    });
    let url = state.model_url(&model, "embedContent");
    state.forward(&url, &upstream).await
}

// ============ POST /audio/transcriptions ============

async fn handle_transcription(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ProxyError> {
    let mut audio: Option<(String, Vec<u8>)> = None;
    let mut model: Option<String> = None;
    let mut prompt: Option<String> = None;
    let mut language: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let mime = field
                    .content_type()
                    .map(str::to_string)
                    .or_else(|| {
                        field
                            .file_name()
                            .and_then(|f| f.rsplit_once('.'))
                            .map(|(_, ext)| mime_from_extension(ext).to_string())
                    })
                    .unwrap_or_else(|| "audio/wav".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
                audio = Some((mime, bytes.to_vec()));
            }
            "model" | "prompt" | "language" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid field {}: {}", name, e)))?;
                let value = Some(value).filter(|v| !v.trim().is_empty());
                match name.as_str() {
                    "model" => model = value,
                    "prompt" => prompt = value,
                    _ => language = value,
                }
            }
            _ => {}
        }
    }

    let (mime, bytes) = audio.ok_or_else(|| bad_request("missing `file` field"))?;
    if bytes.is_empty() {
        return Err(bad_request("uploaded file is empty"));
    }

    let mut instruction = prompt.unwrap_or_else(|| DEFAULT_TRANSCRIBE_PROMPT.to_string());
    if let Some(language) = language {
        instruction.push_str(&format!(" The spoken language is {}.", language));
    }

    let upstream = json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": instruction },
                inline_data(&mime, &STANDARD.encode(&bytes)),
            ],
        }],
    });
    let model = model.unwrap_or_else(|| state.config.default_model.clone());
    let url = state.model_url(&model, "generateContent");
    state.forward(&url, &upstream).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_body_is_a_bad_request() {
        let err = parse_json_body(b"not json").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.starts_with("invalid JSON body"));

        let err = parse_json_body(b"[1, 2]").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let body = parse_json_body(br#"{"text":"hi"}"#).unwrap();
        assert_eq!(body["text"], "hi");
    }

    #[tokio::test]
    async fn text_and_data_url_messages_convert() {
        let client = reqwest::Client::new();
        let messages = vec![
            json!({ "role": "system", "content": "Be brief." }),
            json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": "What is this?" },
                    { "type": "image_url", "image_url": { "url": "data:image/png;base64,AQID" } },
                    { "type": "image_base64", "base64": "BAUG", "mime": "image/webp" }
                ]
            }),
        ];
        let contents = messages_to_contents(&client, &messages).await.unwrap();
        let parts = contents[0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0]["text"], "Be brief.");
        assert_eq!(parts[1]["text"], "What is this?");
        assert_eq!(parts[2]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[2]["inline_data"]["data"], "AQID");
        assert_eq!(parts[3]["inline_data"]["mime_type"], "image/webp");
    }

    #[tokio::test]
    async fn empty_messages_are_rejected() {
        let client = reqwest::Client::new();
        let err = messages_to_contents(&client, &[json!({ "role": "user", "content": "  " })])
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn model_url_strips_prefix() {
        let state = AppState {
            config: Arc::new(ProxyConfig::default()),
            client: reqwest::Client::new(),
            api_key: Arc::new(String::new()),
        };
        assert_eq!(
            state.model_url("models/text-embedding-004", "embedContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent"
        );
    }
}
