//! Input files handed to the pipeline.
//!
//! An [`InputFile`] is a name, a MIME type and the raw bytes. Files read
//! from disk also remember their path so external decoders can open them
//! in place instead of spooling a copy.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};

use crate::error::{Result, RuneError};
use crate::models::Modality;

pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// A file-like object with a MIME type and byte content.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub path: Option<PathBuf>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
            path: None,
        }
    }

    /// Read a file from disk and detect its MIME type.
    ///
    /// Fails with [`RuneError::Input`] when the file is missing or
    /// unreadable; the pipeline never runs for such inputs.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RuneError::Input(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime = detect_mime(path, &bytes);
        Ok(Self {
            name,
            mime,
            bytes,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn modality(&self) -> Option<Modality> {
        Modality::from_mime(&self.mime)
    }

    /// File extension including the leading dot, or empty.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` form of the file.
    pub fn to_data_url(&self) -> String {
        data_url(&self.mime, &self.bytes)
    }

    /// Lossy UTF-8 decoding of the content.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Split a `data:<mime>;base64,<payload>` URL into MIME type and bytes.
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    let mime = if mime.is_empty() {
        MIME_OCTET_STREAM.to_string()
    } else {
        mime.to_string()
    };
    Some((mime, bytes))
}

/// Detect a MIME type from magic bytes, then from the extension.
pub fn detect_mime(path: &Path, bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    mime_from_extension(&ext).to_string()
}

pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => MIME_OCTET_STREAM,
    }
}
