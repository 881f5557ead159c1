//! Pipeline orchestration.
//!
//! One [`RuneAssembler::generate`] call runs one input file through
//! extraction → understanding → normalization → fusion → persistence,
//! strictly in that order. Nothing in the pipeline aborts: every stage
//! degrades to empty or placeholder results, and the rune is always
//! returned in its best-effort state with the composite `fallback` flag.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::extract::ModalityExtractor;
use crate::frame::{create_frame_extractor, FrameExtractor};
use crate::fuse::VectorFuser;
use crate::gateway::{create_gateway, Bundle, UnderstandingGateway};
use crate::media::InputFile;
use crate::models::Rune;
use crate::normalize::SchemaNormalizer;
use crate::store::{PersistenceBackend, SaveOutcome};

/// Progress of one pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Created,
    ModalityExtracted,
    Understood,
    VectorFused,
    Persisted,
}

/// Caller overrides applied after understanding.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub name: Option<String>,
    pub category: Option<String>,
}

/// Which stages degraded during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Degradation {
    pub extraction: bool,
    pub understanding: bool,
    pub fusion: bool,
}

impl Degradation {
    pub fn any(&self) -> bool {
        self.extraction || self.understanding || self.fusion
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct Generated {
    pub rune: Rune,
    /// Last stage reached.
    pub stage: PipelineStage,
    pub degraded: Degradation,
    /// `None` when no persistence backend is attached.
    pub save: Option<SaveOutcome>,
}

pub struct RuneAssembler {
    gateway: Arc<dyn UnderstandingGateway>,
    extractor: ModalityExtractor,
    normalizer: SchemaNormalizer,
    fuser: VectorFuser,
    store: Option<Box<dyn PersistenceBackend>>,
}

impl RuneAssembler {
    pub fn new(
        gateway: Arc<dyn UnderstandingGateway>,
        frames: Box<dyn FrameExtractor>,
        normalizer: SchemaNormalizer,
        dims: usize,
    ) -> Self {
        Self {
            extractor: ModalityExtractor::new(gateway.clone(), frames),
            fuser: VectorFuser::new(gateway.clone(), dims),
            gateway,
            normalizer,
            store: None,
        }
    }

    /// Build an assembler from configuration. No persistence backend is
    /// attached; see [`RuneAssembler::with_store`].
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let gateway = create_gateway(&config.gateway)?;
        let frames = create_frame_extractor(&config.frames);
        let normalizer = SchemaNormalizer::new(
            config.gateway.embedding_model.clone(),
            config.gateway.dims,
        );
        Ok(Self::new(gateway, frames, normalizer, config.gateway.dims))
    }

    pub fn with_store(mut self, store: Box<dyn PersistenceBackend>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn generate(&self, file: &InputFile, options: &GenerateOptions) -> Generated {
        let mut degraded = Degradation::default();

        // Created
        let mut rune = Rune::new(options.name.clone().unwrap_or_else(|| file.name.clone()));
        info!(id = rune.id(), file = %file.name, mime = %file.mime, "rune pipeline started");

        // ModalityExtracted
        let extraction = self.extractor.extract(file).await;
        degraded.extraction = extraction.degraded;
        rune.nine_fields.content = extraction.content;
        if let Some(language) = extraction.language {
            rune.nine_fields.metadata.language = language;
        }

        // Understood
        let bundle = Bundle::new(rune.name.clone(), rune.nine_fields.content.clone());
        let understanding = self.gateway.interpret_bundle(&bundle).await;
        let normalized = self.normalizer.normalize(&understanding, &bundle);
        rune.name = normalized.name;
        rune.category = normalized.category;
        rune.nine_fields = normalized.record;
        rune.nine_fields.content.fill_blanks_from(&bundle.content);
        rune.nine_fields.turns.structure.modalities = rune.nine_fields.content.modalities();
        if let Some(name) = options.name.as_deref().filter(|n| !n.trim().is_empty()) {
            rune.name = name.to_string();
        }
        if let Some(category) = options.category.as_deref().filter(|c| !c.trim().is_empty()) {
            rune.category = category.to_string();
        }
        degraded.understanding = rune.nine_fields.metadata.fallback_flag;

        // VectorFused
        let fused = self.fuser.fuse(&rune.nine_fields).await;
        degraded.fusion = !fused.used_any;
        if fused.used_any {
            // the provider decides the real dimension
            rune.nine_fields.turns.structure.dimension = fused.vector.len();
        }
        debug!(
            id = rune.id(),
            sources = fused.sources,
            dims = fused.vector.len(),
            "vector fused"
        );
        rune.vector = fused.vector;
        rune.fallback = degraded.any();
        rune.touch();
        let mut stage = PipelineStage::VectorFused;

        // Persisted
        let save = match &self.store {
            Some(store) => {
                let outcome = store.save(&rune, std::slice::from_ref(file)).await;
                if outcome.success {
                    stage = PipelineStage::Persisted;
                } else {
                    warn!(
                        id = rune.id(),
                        backend = store.name(),
                        error = outcome.error.as_deref().unwrap_or(""),
                        "persistence failed, rune kept in memory"
                    );
                }
                Some(outcome)
            }
            None => None,
        };

        info!(
            id = rune.id(),
            name = %rune.name,
            fallback = rune.fallback,
            ?stage,
            "rune pipeline finished"
        );

        Generated {
            rune,
            stage,
            degraded,
            save,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DisabledFrameExtractor;
    use crate::gateway::HeuristicGateway;

    fn offline() -> RuneAssembler {
        RuneAssembler::new(
            Arc::new(HeuristicGateway),
            Box::new(DisabledFrameExtractor),
            SchemaNormalizer::new("text-embedding-004", 768),
            768,
        )
    }

    #[test]
    fn stages_are_ordered() {
        assert!(PipelineStage::Created < PipelineStage::ModalityExtracted);
        assert!(PipelineStage::VectorFused < PipelineStage::Persisted);
    }

    #[tokio::test]
    async fn offline_run_degrades_but_completes() {
        let file = InputFile::new("hello.txt", "text/plain", b"Hello world".to_vec());
        let out = offline().generate(&file, &GenerateOptions::default()).await;

        assert_eq!(out.stage, PipelineStage::VectorFused);
        assert!(out.save.is_none());
        assert!(!out.degraded.extraction);
        assert!(out.degraded.understanding);
        assert!(out.degraded.fusion);
        assert!(out.rune.fallback);
        assert_eq!(out.rune.nine_fields.content.text, "Hello world");
        assert_eq!(out.rune.nine_fields.metadata.language, "English");
        assert_eq!(out.rune.vector.len(), 768);
    }

    #[tokio::test]
    async fn caller_overrides_win() {
        let file = InputFile::new("hello.txt", "text/plain", b"Hello".to_vec());
        let options = GenerateOptions {
            name: Some("Greeting".into()),
            category: Some("notes".into()),
        };
        let out = offline().generate(&file, &options).await;
        assert_eq!(out.rune.name, "Greeting");
        assert_eq!(out.rune.category, "notes");
        assert_eq!(out.rune.nine_fields.turns.name, "Greeting");
    }
}
