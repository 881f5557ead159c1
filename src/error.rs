//! Error taxonomy for the rune pipeline.
//!
//! Every capability (gateway, frame extractor, persistence backend) reports
//! failures as a [`RuneError`]. Inside the pipeline these errors are logged
//! and converted into empty results plus the fallback flag; only
//! [`RuneError::Persistence`] reaches the caller, as a failed save outcome.

use thiserror::Error;

/// Errors produced by the pipeline's collaborators.
#[derive(Debug, Error)]
pub enum RuneError {
    /// Unsupported, missing or unreadable input file.
    #[error("input error: {0}")]
    Input(String),

    /// Network failure or timeout talking to the proxy or provider.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx status or malformed JSON body from the provider.
    #[error("provider error {status}: {body}")]
    Provider { status: u16, body: String },

    /// Structured output could not be recovered from the model response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Writing the finished rune failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The capability is not available in this build or configuration.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl RuneError {
    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RuneError::Input(_) => "input",
            RuneError::Transport(_) => "transport",
            RuneError::Provider { .. } => "provider",
            RuneError::Parse(_) => "parse",
            RuneError::Persistence(_) => "persistence",
            RuneError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<reqwest::Error> for RuneError {
    fn from(err: reqwest::Error) -> Self {
        RuneError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for RuneError {
    fn from(err: std::io::Error) -> Self {
        RuneError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for RuneError {
    fn from(err: serde_json::Error) -> Self {
        RuneError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RuneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_display_includes_status_and_body() {
        let err = RuneError::Provider {
            status: 401,
            body: "API key not valid".to_string(),
        };
        assert_eq!(err.to_string(), "provider error 401: API key not valid");
        assert_eq!(err.kind(), "provider");
    }

    #[test]
    fn io_errors_map_to_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: RuneError = io.into();
        assert!(matches!(err, RuneError::Persistence(_)));
    }
}
