//! Offline gateway: every capability degrades.

use async_trait::async_trait;

use super::{Bundle, ImageRequest, TranscribeOptions, Understanding, UnderstandingGateway};
use crate::error::{Result, RuneError};
use crate::media::InputFile;

/// Gateway used when no model provider is configured.
///
/// Captions, transcripts and embeddings fail with
/// [`RuneError::Unavailable`], and the composite call is always
/// unstructured, so the normalizer builds the record from local heuristics
/// and the fuser emits the placeholder vector.
pub struct HeuristicGateway;

#[async_trait]
impl UnderstandingGateway for HeuristicGateway {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f64>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Err(RuneError::Unavailable(
            "heuristic gateway has no embedding model".to_string(),
        ))
    }

    async fn caption_image(&self, _request: ImageRequest) -> Result<String> {
        Err(RuneError::Unavailable(
            "heuristic gateway cannot caption images".to_string(),
        ))
    }

    async fn transcribe_audio(
        &self,
        _file: &InputFile,
        _options: TranscribeOptions,
    ) -> Result<String> {
        Err(RuneError::Unavailable(
            "heuristic gateway cannot transcribe audio".to_string(),
        ))
    }

    async fn interpret_bundle(&self, _bundle: &Bundle) -> Understanding {
        Understanding::unstructured("heuristic gateway")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_call_degrades() {
        let gw = HeuristicGateway;
        assert!(gw.embed_text("").await.unwrap().is_empty());
        assert!(matches!(
            gw.embed_text("hello").await,
            Err(RuneError::Unavailable(_))
        ));
        let req = ImageRequest {
            data_url: String::new(),
            prompt: None,
        };
        assert!(gw.caption_image(req).await.is_err());
        assert!(!gw.interpret_bundle(&Bundle::default()).await.is_structured());
    }
}
