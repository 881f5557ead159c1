//! Per-modality extraction.
//!
//! The [`ModalityExtractor`] classifies an [`InputFile`] by MIME prefix and
//! asks the gateway for one understanding result per modality: a caption
//! for images, a transcript for audio, a caption of a still frame for
//! video. Text is decoded locally. Extraction never fails: every error
//! inside a branch is logged and turned into an empty field plus the
//! `degraded` flag.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::frame::{FrameExtractor, StillFrame};
use crate::gateway::{ImageRequest, TranscribeOptions, UnderstandingGateway, VIDEO_CAPTION_PROMPT};
use crate::media::InputFile;
use crate::models::{Content, Modality};
use crate::text::detect_language;

/// Best-effort result of extracting one input file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// `None` for unclassified MIME types.
    pub kind: Option<Modality>,
    pub content: Content,
    /// Detected language, text inputs only.
    pub language: Option<String>,
    /// Base64 payload of image and audio inputs.
    pub media_base64: Option<String>,
    pub still_frame: Option<StillFrame>,
    /// True when any step of the branch failed.
    pub degraded: bool,
}

pub struct ModalityExtractor {
    gateway: Arc<dyn UnderstandingGateway>,
    frames: Box<dyn FrameExtractor>,
}

impl ModalityExtractor {
    pub fn new(gateway: Arc<dyn UnderstandingGateway>, frames: Box<dyn FrameExtractor>) -> Self {
        Self { gateway, frames }
    }

    pub async fn extract(&self, file: &InputFile) -> Extraction {
        let kind = file.modality();
        let mut out = Extraction {
            kind,
            ..Default::default()
        };

        match kind {
            Some(Modality::Text) => {
                let text = file.text();
                out.language = Some(detect_language(&text).to_string());
                out.content.text = text;
            }
            Some(Modality::Image) => {
                out.media_base64 = Some(file.to_base64());
                let request = ImageRequest {
                    data_url: file.to_data_url(),
                    prompt: None,
                };
                match self.gateway.caption_image(request).await {
                    Ok(caption) => out.content.image_description = caption,
                    Err(e) => {
                        warn!(file = %file.name, kind = e.kind(), error = %e, "image caption failed");
                        out.degraded = true;
                    }
                }
            }
            Some(Modality::Audio) => {
                out.media_base64 = Some(file.to_base64());
                match self
                    .gateway
                    .transcribe_audio(file, TranscribeOptions::default())
                    .await
                {
                    Ok(transcript) => out.content.audio_transcript = transcript,
                    Err(e) => {
                        warn!(file = %file.name, kind = e.kind(), error = %e, "audio transcription failed");
                        out.degraded = true;
                    }
                }
            }
            Some(Modality::Video) => self.extract_video(file, &mut out).await,
            None => {
                debug!(file = %file.name, mime = %file.mime, "unclassified input, nothing to extract");
            }
        }

        out
    }

    async fn extract_video(&self, file: &InputFile, out: &mut Extraction) {
        let frame = match self.frames.extract_frame(file).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    file = %file.name,
                    extractor = self.frames.name(),
                    kind = e.kind(),
                    error = %e,
                    "video frame extraction failed"
                );
                out.degraded = true;
                return;
            }
        };

        let data_url = frame.to_data_url();
        out.content.video_frame_image = data_url.clone();
        out.still_frame = Some(frame);

        let request = ImageRequest {
            data_url,
            prompt: Some(VIDEO_CAPTION_PROMPT.to_string()),
        };
        match self.gateway.caption_image(request).await {
            Ok(caption) => out.content.video_summary = caption,
            Err(e) => {
                warn!(file = %file.name, kind = e.kind(), error = %e, "video frame caption failed");
                out.degraded = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DisabledFrameExtractor;
    use crate::gateway::HeuristicGateway;

    fn offline() -> ModalityExtractor {
        ModalityExtractor::new(Arc::new(HeuristicGateway), Box::new(DisabledFrameExtractor))
    }

    #[tokio::test]
    async fn text_is_decoded_locally() {
        let file = InputFile::new("a.txt", "text/plain", b"Hello world".to_vec());
        let out = offline().extract(&file).await;
        assert_eq!(out.kind, Some(Modality::Text));
        assert_eq!(out.content.text, "Hello world");
        assert_eq!(out.language.as_deref(), Some("English"));
        assert!(!out.degraded);
    }

    #[tokio::test]
    async fn failed_caption_leaves_field_empty() {
        let file = InputFile::new("a.png", "image/png", vec![1, 2, 3]);
        let out = offline().extract(&file).await;
        assert_eq!(out.content.image_description, "");
        assert!(out.media_base64.is_some());
        assert!(out.degraded);
    }

    #[tokio::test]
    async fn failed_frame_skips_caption() {
        let file = InputFile::new("a.mp4", "video/mp4", vec![0; 8]);
        let out = offline().extract(&file).await;
        assert!(out.still_frame.is_none());
        assert_eq!(out.content.video_frame_image, "");
        assert!(out.degraded);
    }

    #[tokio::test]
    async fn unclassified_input_is_not_an_error() {
        let file = InputFile::new("a.pdf", "application/pdf", vec![0x25, 0x50]);
        let out = offline().extract(&file).await;
        assert_eq!(out.kind, None);
        assert_eq!(out.content, Content::default());
        assert!(!out.degraded);
    }
}
