//! TOML configuration.
//!
//! Every section has defaults, so a missing config file yields
//! [`Config::default`]. See `config/rune.example.toml` for a full example.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{DEFAULT_DIMENSION, DEFAULT_EMBEDDING_MODEL};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub frames: FrameConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_prompt_char_limit")]
    pub prompt_char_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: default_gateway_provider(),
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            dims: default_dims(),
            timeout_secs: default_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            prompt_char_limit: default_prompt_char_limit(),
        }
    }
}

fn default_gateway_provider() -> String {
    "remote".to_string()
}
fn default_base_url() -> String {
    "http://localhost:3001/api/gemini".to_string()
}
fn default_chat_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_dims() -> usize {
    DEFAULT_DIMENSION
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_retry_backoff_ms() -> u64 {
    800
}
fn default_prompt_char_limit() -> usize {
    1200
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrameConfig {
    #[serde(default = "default_frame_extractor")]
    pub extractor: String,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default)]
    pub offset_secs: f64,
    #[serde(default = "default_frame_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_fallback_width")]
    pub fallback_width: u32,
    #[serde(default = "default_fallback_height")]
    pub fallback_height: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            extractor: default_frame_extractor(),
            ffmpeg_path: default_ffmpeg_path(),
            offset_secs: 0.0,
            timeout_ms: default_frame_timeout_ms(),
            fallback_width: default_fallback_width(),
            fallback_height: default_fallback_height(),
        }
    }
}

fn default_frame_extractor() -> String {
    "ffmpeg".to_string()
}
fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_frame_timeout_ms() -> u64 {
    1500
}
fn default_fallback_width() -> u32 {
    320
}
fn default_fallback_height() -> u32 {
    180
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
    /// Export backend target; stdout when unset.
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: default_workspace_root(),
            export_path: None,
        }
    }
}

fn default_backend() -> String {
    "filesystem".to_string()
}
fn default_workspace_root() -> PathBuf {
    PathBuf::from("./myrune")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_provider_url")]
    pub provider_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_chat_model")]
    pub default_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            provider_url: default_provider_url(),
            api_key_env: default_api_key_env(),
            default_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            max_upload_bytes: default_max_upload_bytes(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}
fn default_provider_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl ProxyConfig {
    /// The provider API key from the process environment, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to defaults.
///
/// A file that exists but fails to parse or validate is still an error.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate gateway
    match config.gateway.provider.as_str() {
        "remote" | "heuristic" => {}
        other => bail!(
            "Unknown gateway provider: '{}'. Must be remote or heuristic.",
            other
        ),
    }
    if config.gateway.dims == 0 {
        bail!("gateway.dims must be > 0");
    }
    if config.gateway.timeout_secs == 0 {
        bail!("gateway.timeout_secs must be > 0");
    }
    if config.gateway.provider == "remote" && config.gateway.base_url.trim().is_empty() {
        bail!("gateway.base_url must be set when provider is 'remote'");
    }

    // Validate frames
    match config.frames.extractor.as_str() {
        "ffmpeg" | "disabled" => {}
        other => bail!(
            "Unknown frame extractor: '{}'. Must be ffmpeg or disabled.",
            other
        ),
    }
    if config.frames.timeout_ms == 0 {
        bail!("frames.timeout_ms must be > 0");
    }
    if config.frames.offset_secs < 0.0 {
        bail!("frames.offset_secs must be >= 0");
    }

    // Validate workspace
    match config.workspace.backend.as_str() {
        "filesystem" | "export" => {}
        other => bail!(
            "Unknown workspace backend: '{}'. Must be filesystem or export.",
            other
        ),
    }

    Ok(())
}
