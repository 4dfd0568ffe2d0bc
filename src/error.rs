use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("URL '{url}' must use one of: {expected}")]
    UnsupportedScheme { url: String, expected: &'static str },

    #[error("Unsupported config version {found} (expected {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("server.timeout_sec must be greater than zero")]
    ZeroTimeout,

    #[error("retry.max_attempts must be greater than zero")]
    ZeroAttempts,
}

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors surfaced by session operations.
///
/// `Validation` is caller misuse and never fails a session. `Transport` and
/// `Server` come from the backend calls and are retryable by repeating the
/// user action. `BackendReported` is an `error` push event that failed a
/// running session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error ({status}): {detail}")]
    Server { status: u16, detail: String },

    #[error("Research failed: {0}")]
    BackendReported(String),

    #[error("Session was replaced before the operation completed")]
    Superseded,
}

impl SessionError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        SessionError::Validation(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Transport(_) | SessionError::Server { .. })
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}

impl From<ChannelError> for SessionError {
    fn from(e: ChannelError) -> Self {
        SessionError::Transport(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to build channel URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to connect to '{url}': {reason}")]
    Connect { url: String, reason: String },

    #[error("Notification channel is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SessionError::Transport("timed out".into()).is_retryable());
        assert!(SessionError::Server {
            status: 500,
            detail: "boom".into()
        }
        .is_retryable());
        assert!(!SessionError::validation("blank").is_retryable());
        assert!(!SessionError::Superseded.is_retryable());
        assert!(!SessionError::BackendReported("x".into()).is_retryable());
    }

    #[test]
    fn test_channel_error_maps_to_transport() {
        let err: SessionError = ChannelError::Closed.into();
        assert_eq!(
            err,
            SessionError::Transport("Notification channel is closed".into())
        );
    }
}
