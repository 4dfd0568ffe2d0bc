mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpBackend;

use crate::config::Config;
use crate::error::{SessionError, SetupError};
use crate::session::{QaPair, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Backend progress flags for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub status: Option<String>,
    #[serde(default)]
    pub has_intent: bool,
    #[serde(default)]
    pub has_qa_pairs: bool,
    #[serde(default)]
    pub has_plan: bool,
    #[serde(default)]
    pub has_report: bool,
}

/// Request/response contract of the research backend
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    async fn create_session(
        &self,
        intent: &str,
        model_name: &str,
    ) -> Result<SessionId, SessionError>;

    async fn fetch_questions(&self, session_id: &SessionId) -> Result<Vec<String>, SessionError>;

    async fn submit_answers(
        &self,
        session_id: &SessionId,
        answers: &[QaPair],
    ) -> Result<(), SessionError>;

    async fn fetch_plan(&self, session_id: &SessionId) -> Result<Vec<String>, SessionError>;

    async fn list_models(&self) -> Result<Vec<String>, SessionError>;

    async fn session_status(&self, session_id: &SessionId) -> Result<SessionStatus, SessionError>;
}

/// Create the HTTP backend described by the config
pub fn create_backend(config: &Config) -> Result<Arc<dyn ResearchBackend>, SetupError> {
    let backend = HttpBackend::new(config.base_url()?, config.request_timeout())?;
    Ok(Arc::new(backend))
}
