//! Multimodal vector fusion.
//!
//! Up to five texts from a record (body text, image description, audio
//! transcript, video summary, metadata summary) are embedded one after the
//! other and averaged element-wise. Failed or empty embeddings are skipped.
//! When nothing succeeds the result is a placeholder vector of
//! [`PLACEHOLDER_VALUE`] with the configured dimension.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::gateway::UnderstandingGateway;
use crate::models::NineFieldRecord;

/// Element value of the placeholder vector.
pub const PLACEHOLDER_VALUE: f64 = 0.1;

/// Result of [`VectorFuser::fuse`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fused {
    pub vector: Vec<f64>,
    /// False when `vector` is the placeholder.
    pub used_any: bool,
    /// Number of embeddings that contributed to the mean.
    pub sources: usize,
}

pub struct VectorFuser {
    gateway: Arc<dyn UnderstandingGateway>,
    dims: usize,
}

impl VectorFuser {
    pub fn new(gateway: Arc<dyn UnderstandingGateway>, dims: usize) -> Self {
        Self { gateway, dims }
    }

    pub async fn fuse(&self, record: &NineFieldRecord) -> Fused {
        let mut vectors: Vec<Vec<f64>> = Vec::new();

        for (label, text) in fusion_sources(record) {
            match self.gateway.embed_text(text).await {
                Ok(v) if v.is_empty() => {
                    warn!(source = label, "embedding came back empty, skipping");
                }
                Ok(v) => {
                    // dimension is fixed by the first successful embedding
                    if let Some(first) = vectors.first() {
                        if first.len() != v.len() {
                            warn!(
                                source = label,
                                expected = first.len(),
                                got = v.len(),
                                "embedding dimension mismatch, skipping"
                            );
                            continue;
                        }
                    }
                    vectors.push(v);
                }
                Err(e) => {
                    warn!(source = label, kind = e.kind(), error = %e, "embedding failed, skipping");
                }
            }
        }

        match mean_vectors(&vectors) {
            Some(vector) => {
                debug!(sources = vectors.len(), dims = vector.len(), "fused embeddings");
                Fused {
                    vector,
                    used_any: true,
                    sources: vectors.len(),
                }
            }
            None => {
                warn!(dims = self.dims, "no embedding succeeded, using placeholder vector");
                Fused {
                    vector: placeholder_vector(self.dims),
                    used_any: false,
                    sources: 0,
                }
            }
        }
    }
}

/// Non-empty fusion sources in fixed order, labelled for logs.
pub fn fusion_sources(record: &NineFieldRecord) -> Vec<(&'static str, &str)> {
    [
        ("text", record.content.text.as_str()),
        ("image_description", record.content.image_description.as_str()),
        ("audio_transcript", record.content.audio_transcript.as_str()),
        ("video_summary", record.content.video_summary.as_str()),
        ("summary", record.metadata.summary.as_str()),
    ]
    .into_iter()
    .filter(|(_, text)| !text.trim().is_empty())
    .collect()
}

/// Element-wise arithmetic mean of equal-length vectors.
///
/// Returns `None` for an empty set or when lengths differ.
pub fn mean_vectors(vectors: &[Vec<f64>]) -> Option<Vec<f64>> {
    let first = vectors.first()?;
    let dims = first.len();
    if vectors.iter().any(|v| v.len() != dims) {
        return None;
    }

    let mut sum = vec![0.0f64; dims];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let n = vectors.len() as f64;
    Some(sum.into_iter().map(|s| s / n).collect())
}

pub fn placeholder_vector(dims: usize) -> Vec<f64> {
    vec![PLACEHOLDER_VALUE; dims]
}
