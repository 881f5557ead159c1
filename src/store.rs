//! Rune persistence backends.
//!
//! A [`PersistenceBackend`] receives the finished rune and the original
//! input files and reports a [`SaveOutcome`]. It never mutates the rune.
//!
//! - [`FilesystemBackend`] writes `<root>/rune/<id>.json` and copies every
//!   input into `<root>/media/media_<id>_<i><ext>`.
//! - [`ExportBackend`] writes the same JSON document to a file, or to
//!   stdout when no path is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::WorkspaceConfig;
use crate::error::{Result, RuneError};
use crate::media::InputFile;
use crate::models::Rune;

const RUNE_DIR: &str = "rune";
const MEDIA_DIR: &str = "media";

/// Result of a save attempt. Failures are data, not errors, so the caller
/// can report them and retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveOutcome {
    pub fn saved(id: &str, path: Option<PathBuf>) -> Self {
        Self {
            success: true,
            id: Some(id.to_string()),
            path,
            error: None,
        }
    }

    pub fn failed(id: &str, err: &RuneError) -> Self {
        Self {
            success: false,
            id: Some(id.to_string()),
            path: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct PersistedRune<'a> {
    #[serde(flatten)]
    rune: &'a Rune,
    files: FileSummary,
}

#[derive(Serialize)]
struct FileSummary {
    count: usize,
    names: Vec<String>,
}

/// Pretty JSON document for a rune and its source files.
pub fn rune_document(rune: &Rune, files: &[InputFile]) -> Result<String> {
    let doc = PersistedRune {
        rune,
        files: FileSummary {
            count: files.len(),
            names: files.iter().map(|f| f.name.clone()).collect(),
        },
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Reload a persisted rune document.
pub async fn load_rune(path: &Path) -> Result<Rune> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RuneError::Persistence(format!("{}: {}", path.display(), e)))?;
    let rune = serde_json::from_str(&text)?;
    Ok(rune)
}

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn save(&self, rune: &Rune, files: &[InputFile]) -> SaveOutcome;
}

/// Workspace directory backend.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn rune_path(&self, id: &str) -> PathBuf {
        self.root.join(RUNE_DIR).join(format!("{}.json", id))
    }

    async fn write(&self, rune: &Rune, files: &[InputFile]) -> Result<PathBuf> {
        let rune_dir = self.root.join(RUNE_DIR);
        let media_dir = self.root.join(MEDIA_DIR);
        tokio::fs::create_dir_all(&rune_dir).await?;
        tokio::fs::create_dir_all(&media_dir).await?;

        let path = self.rune_path(rune.id());
        tokio::fs::write(&path, rune_document(rune, files)?).await?;

        for (i, file) in files.iter().enumerate() {
            let target = media_dir.join(format!("media_{}_{}{}", rune.id(), i, file.extension()));
            if let Err(e) = tokio::fs::write(&target, &file.bytes).await {
                warn!(file = %file.name, target = %target.display(), error = %e, "media copy failed");
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl PersistenceBackend for FilesystemBackend {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn save(&self, rune: &Rune, files: &[InputFile]) -> SaveOutcome {
        match self.write(rune, files).await {
            Ok(path) => {
                info!(id = rune.id(), path = %path.display(), "rune saved");
                SaveOutcome::saved(rune.id(), Some(path))
            }
            Err(e) => {
                warn!(id = rune.id(), error = %e, "rune save failed");
                SaveOutcome::failed(rune.id(), &e)
            }
        }
    }
}

/// Export backend: one JSON document to a file or stdout.
pub struct ExportBackend {
    output: Option<PathBuf>,
}

impl ExportBackend {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output }
    }

    async fn write(&self, rune: &Rune, files: &[InputFile]) -> Result<Option<PathBuf>> {
        let json = rune_document(rune, files)?;
        match &self.output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, &json).await?;
                Ok(Some(path.clone()))
            }
            None => {
                println!("{}", json);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl PersistenceBackend for ExportBackend {
    fn name(&self) -> &str {
        "export"
    }

    async fn save(&self, rune: &Rune, files: &[InputFile]) -> SaveOutcome {
        match self.write(rune, files).await {
            Ok(path) => SaveOutcome::saved(rune.id(), path),
            Err(e) => {
                warn!(id = rune.id(), error = %e, "rune export failed");
                SaveOutcome::failed(rune.id(), &e)
            }
        }
    }
}

/// Create the backend selected by `workspace.backend`.
pub fn create_backend(config: &WorkspaceConfig) -> Box<dyn PersistenceBackend> {
    match config.backend.as_str() {
        "export" => Box::new(ExportBackend::new(config.export_path.clone())),
        _ => Box::new(FilesystemBackend::new(config.root.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Rune, Vec<InputFile>) {
        let mut rune = Rune::new("sample.png");
        rune.vector = vec![0.5, 0.25];
        rune.nine_fields.metadata.keywords = vec!["b".into(), "a".into()];
        let files = vec![InputFile::new("sample.png", "image/png", vec![1, 2, 3])];
        (rune, files)
    }

    #[test]
    fn document_carries_file_summary() {
        let (rune, files) = sample();
        let doc: serde_json::Value =
            serde_json::from_str(&rune_document(&rune, &files).unwrap()).unwrap();
        assert_eq!(doc["id"], rune.id());
        assert_eq!(doc["files"]["count"], 1);
        assert_eq!(doc["files"]["names"][0], "sample.png");
        assert!(doc["nineFields"]["turns"]["8_structure"].is_object());
    }

    #[tokio::test]
    async fn filesystem_save_writes_rune_and_media() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let (rune, files) = sample();

        let outcome = backend.save(&rune, &files).await;
        assert!(outcome.success, "{:?}", outcome.error);
        let path = outcome.path.unwrap();
        assert_eq!(path, backend.rune_path(rune.id()));

        let media = dir
            .path()
            .join("media")
            .join(format!("media_{}_0.png", rune.id()));
        assert_eq!(std::fs::read(media).unwrap(), vec![1, 2, 3]);

        let loaded = load_rune(&path).await.unwrap();
        assert_eq!(loaded, rune);
    }

    #[tokio::test]
    async fn reloaded_vector_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let (mut rune, files) = sample();
        // xorshift values in [-1, 1]; most need all 17 significant digits
        let mut state = 0x9e37_79b9_7f4a_7c15u64;
        rune.vector = (0..768)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 11) as f64 / (1u64 << 52) as f64 - 1.0
            })
            .collect();

        let outcome = backend.save(&rune, &files).await;
        let loaded = load_rune(&outcome.path.unwrap()).await.unwrap();
        let mismatched = loaded
            .vector
            .iter()
            .zip(&rune.vector)
            .filter(|(a, b)| a.to_bits() != b.to_bits())
            .count();
        assert_eq!(loaded.vector.len(), 768);
        assert_eq!(mismatched, 0);
    }

    #[tokio::test]
    async fn unwritable_root_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a dir").unwrap();

        let backend = FilesystemBackend::new(&blocker);
        let (rune, files) = sample();
        let outcome = backend.save(&rune, &files).await;
        assert!(!outcome.success);
        assert_eq!(outcome.id.as_deref(), Some(rune.id()));
        assert!(outcome.error.unwrap().contains("persistence error"));
    }

    #[tokio::test]
    async fn export_writes_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("rune.json");
        let backend = ExportBackend::new(Some(out.clone()));
        let (rune, files) = sample();

        let outcome = backend.save(&rune, &files).await;
        assert!(outcome.success);
        assert_eq!(outcome.path.as_deref(), Some(out.as_path()));
        assert_eq!(load_rune(&out).await.unwrap().id(), rune.id());
    }

    #[tokio::test]
    async fn loading_missing_file_fails() {
        let err = load_rune(Path::new("/nonexistent/rune.json")).await.unwrap_err();
        assert!(matches!(err, RuneError::Persistence(_)));
    }
}
