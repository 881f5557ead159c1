//! Gateway backed by the same-origin proxy HTTP surface.

use async_trait::async_trait;
use reqwest::multipart;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    composite_messages, extract_response_text, parse_embedding, parse_transcription,
    parse_understanding, Bundle, ImageRequest, TranscribeOptions, Understanding,
    UnderstandingGateway,
};
use crate::config::GatewayConfig;
use crate::error::{Result, RuneError};
use crate::media::InputFile;

/// Gateway that calls `{base_url}/generate`, `/embeddings`, `/vision` and
/// `/audio/transcriptions`.
///
/// Only the composite call is retried: once, after a fixed backoff.
pub struct RemoteGateway {
    client: reqwest::Client,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    retry_backoff: Duration,
    prompt_char_limit: usize,
}

impl RemoteGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            prompt_char_limit: config.prompt_char_limit,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        read_json(response).await
    }

    async fn generate_once(&self, bundle: &Bundle) -> Result<String> {
        let body = json!({
            "model": self.chat_model,
            "messages": composite_messages(bundle, self.prompt_char_limit),
        });
        let json = self.post_json("generate", &body).await?;
        Ok(extract_response_text(&json))
    }
}

/// Map a response to JSON, treating non-2xx and malformed bodies as
/// provider errors.
async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(RuneError::Provider {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|e| RuneError::Provider {
        status: status.as_u16(),
        body: format!("malformed JSON ({}): {}", e, text),
    })
}

#[async_trait]
impl UnderstandingGateway for RemoteGateway {
    fn name(&self) -> &str {
        "remote"
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f64>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.embedding_model,
            "content": { "parts": [{ "text": text }] },
        });
        let json = self.post_json("embeddings", &body).await?;
        let vector = parse_embedding(&json);
        if vector.is_empty() {
            return Err(RuneError::Parse(
                "embedding response carries no vector".to_string(),
            ));
        }
        Ok(vector)
    }

    async fn caption_image(&self, request: ImageRequest) -> Result<String> {
        let body = json!({
            "model": self.chat_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": request.prompt_or_default() },
                    { "type": "image_url", "image_url": { "url": request.data_url } },
                ],
            }],
        });
        let json = self.post_json("vision", &body).await?;
        let caption = extract_response_text(&json);
        if caption.is_empty() {
            return Err(RuneError::Parse("vision response carries no text".to_string()));
        }
        Ok(caption)
    }

    async fn transcribe_audio(
        &self,
        file: &InputFile,
        options: TranscribeOptions,
    ) -> Result<String> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime)?;
        let mut form = multipart::Form::new().part("file", part);
        if let Some(model) = options.model {
            form = form.text("model", model);
        }
        if let Some(prompt) = options.prompt {
            form = form.text("prompt", prompt);
        }
        if let Some(language) = options.language {
            form = form.text("language", language);
        }

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .multipart(form)
            .send()
            .await?;
        let json = read_json(response).await?;
        let transcript = parse_transcription(&json);
        if transcript.is_empty() {
            return Err(RuneError::Parse(
                "transcription response carries no text".to_string(),
            ));
        }
        Ok(transcript)
    }

    async fn interpret_bundle(&self, bundle: &Bundle) -> Understanding {
        let mut last_err = None;

        for attempt in 0..2 {
            if attempt > 0 {
                tokio::time::sleep(self.retry_backoff).await;
            }
            match self.generate_once(bundle).await {
                Ok(text) => {
                    let understanding = parse_understanding(&text);
                    debug!(
                        attempt,
                        structured = understanding.is_structured(),
                        "composite call returned"
                    );
                    return understanding;
                }
                Err(e) => {
                    warn!(attempt, kind = e.kind(), error = %e, "composite call failed");
                    last_err = Some(e);
                }
            }
        }

        Understanding::unstructured(
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "composite call failed".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = GatewayConfig {
            base_url: "http://localhost:3001/api/gemini/".to_string(),
            ..GatewayConfig::default()
        };
        let gateway = RemoteGateway::new(&config).unwrap();
        assert_eq!(
            gateway.url("embeddings"),
            "http://localhost:3001/api/gemini/embeddings"
        );
    }

    #[tokio::test]
    async fn blank_text_skips_network() {
        // unroutable base url: any request would fail
        let config = GatewayConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..GatewayConfig::default()
        };
        let gateway = RemoteGateway::new(&config).unwrap();
        assert!(gateway.embed_text("   ").await.unwrap().is_empty());
    }
}
