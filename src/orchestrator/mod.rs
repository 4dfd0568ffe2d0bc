//! Sequencing of the blocking backend calls
//!
//! The start sequence is `create -> open channel -> fetch questions`, and
//! the answer sequence is `submit -> (caller hook) -> fetch plan`. Reads are
//! retried on transport errors; writes are attempted once.

mod retry;

pub use retry::retry_with_backoff;

use crate::backend::{ResearchBackend, SessionStatus};
use crate::config::RetryConfig;
use crate::error::SessionError;
use crate::session::{QaPair, SessionId};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

fn transport_only(error: &SessionError) -> bool {
    matches!(error, SessionError::Transport(_))
}

pub struct RequestOrchestrator {
    backend: Arc<dyn ResearchBackend>,
    retry: RetryConfig,
}

impl RequestOrchestrator {
    pub fn new(backend: Arc<dyn ResearchBackend>, retry: RetryConfig) -> Self {
        Self { backend, retry }
    }

    /// Create a session, let the caller open its push channel, then fetch
    /// the clarifying questions. The channel is open before the questions
    /// fetch starts so no push event is missed.
    pub async fn start_session<F, Fut>(
        &self,
        intent: &str,
        model_name: &str,
        open_channel: F,
    ) -> Result<(SessionId, Vec<String>), SessionError>
    where
        F: FnOnce(SessionId) -> Fut,
        Fut: Future<Output = Result<(), SessionError>>,
    {
        info!("Creating session with model {}", model_name);
        let session_id = self.backend.create_session(intent, model_name).await?;

        open_channel(session_id.clone()).await?;

        let questions = self.fetch_questions(&session_id).await?;
        info!(
            "Session {} has {} clarifying questions",
            session_id,
            questions.len()
        );
        Ok((session_id, questions))
    }

    /// Submit the answers, run `on_accepted` once the backend took them,
    /// then fetch the plan. A failure after `on_accepted` ran means the
    /// answers are stored and only the plan fetch needs repeating.
    pub async fn submit_answers<F, Fut>(
        &self,
        session_id: &SessionId,
        answers: &[QaPair],
        on_accepted: F,
    ) -> Result<Vec<String>, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), SessionError>>,
    {
        info!("Submitting {} answers for {}", answers.len(), session_id);
        self.backend.submit_answers(session_id, answers).await?;

        on_accepted().await?;

        self.fetch_plan(session_id).await
    }

    pub async fn fetch_questions(&self, session_id: &SessionId) -> Result<Vec<String>, SessionError> {
        retry_with_backoff(&self.retry, transport_only, || {
            self.backend.fetch_questions(session_id)
        })
        .await
    }

    pub async fn fetch_plan(&self, session_id: &SessionId) -> Result<Vec<String>, SessionError> {
        retry_with_backoff(&self.retry, transport_only, || {
            self.backend.fetch_plan(session_id)
        })
        .await
    }

    pub async fn list_models(&self) -> Result<Vec<String>, SessionError> {
        retry_with_backoff(&self.retry, transport_only, || self.backend.list_models()).await
    }

    pub async fn session_status(&self, session_id: &SessionId) -> Result<SessionStatus, SessionError> {
        retry_with_backoff(&self.retry, transport_only, || {
            self.backend.session_status(session_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{Call, FakeBackend};
    use std::sync::Mutex;

    fn orchestrator(backend: Arc<FakeBackend>) -> RequestOrchestrator {
        RequestOrchestrator::new(
            backend,
            RetryConfig {
                max_attempts: 3,
                backoff_base_ms: 0,
            },
        )
    }

    fn transport() -> SessionError {
        SessionError::Transport("connection reset".to_string())
    }

    async fn accept() -> Result<(), SessionError> {
        Ok(())
    }

    fn server() -> SessionError {
        SessionError::Server {
            status: 500,
            detail: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_channel_opens_between_create_and_questions() {
        let backend = Arc::new(FakeBackend::with_questions(&["Which two databases?"]));
        let orchestrator = orchestrator(backend.clone());
        let seen = Mutex::new(Vec::new());

        let (session_id, questions) = orchestrator
            .start_session("compare two databases", "llama3", |id| {
                seen.lock().unwrap().push((id, backend.calls()));
                accept()
            })
            .await
            .unwrap();

        assert_eq!(questions, vec!["Which two databases?".to_string()]);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![(session_id, vec![Call::Create])]);
        assert_eq!(backend.calls(), vec![Call::Create, Call::Questions]);
    }

    #[tokio::test]
    async fn test_channel_failure_skips_questions() {
        let backend = Arc::new(FakeBackend::with_questions(&["q"]));
        let orchestrator = orchestrator(backend.clone());

        let result = orchestrator
            .start_session("intent", "llama3", |_| async {
                Err::<(), _>(SessionError::Transport("refused".to_string()))
            })
            .await;

        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert_eq!(backend.calls(), vec![Call::Create]);
    }

    #[tokio::test]
    async fn test_create_is_not_retried() {
        let backend = Arc::new(FakeBackend::with_questions(&["q"]));
        backend.fail(Call::Create, transport());
        let orchestrator = orchestrator(backend.clone());

        let result = orchestrator
            .start_session("intent", "llama3", |_| accept())
            .await;

        assert_eq!(result, Err(transport()));
        assert_eq!(backend.count(Call::Create), 1);
        assert_eq!(backend.count(Call::Questions), 0);
    }

    #[tokio::test]
    async fn test_reads_retry_transport_errors_only() {
        let backend = Arc::new(FakeBackend::with_questions(&["q"]));
        backend.fail(Call::Questions, transport());
        backend.fail(Call::Questions, transport());
        let orchestrator = orchestrator(backend.clone());

        let questions = orchestrator
            .fetch_questions(&SessionId::new("s"))
            .await
            .unwrap();
        assert_eq!(questions, vec!["q".to_string()]);
        assert_eq!(backend.count(Call::Questions), 3);

        backend.fail(Call::Plan, server());
        let result = orchestrator.fetch_plan(&SessionId::new("s")).await;
        assert_eq!(result, Err(server()));
        assert_eq!(backend.count(Call::Plan), 1);
    }

    #[tokio::test]
    async fn test_submit_runs_hook_before_plan_fetch() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_plan(&["Research Postgres"]);
        let orchestrator = orchestrator(backend.clone());
        let pairs = vec![QaPair {
            question: "Which two databases?".to_string(),
            answer: "Postgres and MySQL".to_string(),
        }];

        let hook_calls = Mutex::new(Vec::new());
        let plan = orchestrator
            .submit_answers(&SessionId::new("s"), &pairs, || {
                hook_calls.lock().unwrap().push(backend.calls());
                accept()
            })
            .await
            .unwrap();

        assert_eq!(plan, vec!["Research Postgres".to_string()]);
        assert_eq!(hook_calls.into_inner().unwrap(), vec![vec![Call::Submit]]);
        assert_eq!(backend.submitted(), vec![pairs]);
    }

    #[tokio::test]
    async fn test_rejected_submit_skips_hook() {
        let backend = Arc::new(FakeBackend::default());
        backend.fail(Call::Submit, transport());
        let orchestrator = orchestrator(backend.clone());

        let mut hook_ran = false;
        let result = orchestrator
            .submit_answers(&SessionId::new("s"), &[], || {
                hook_ran = true;
                accept()
            })
            .await;

        assert_eq!(result, Err(transport()));
        assert!(!hook_ran);
        assert_eq!(backend.count(Call::Submit), 1);
        assert_eq!(backend.count(Call::Plan), 0);
    }

    #[tokio::test]
    async fn test_models_and_status_reads() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_models(&["llama3", "mistral"]);
        backend.fail(Call::Models, transport());
        let orchestrator = orchestrator(backend.clone());

        let models = orchestrator.list_models().await.unwrap();
        assert_eq!(models, vec!["llama3".to_string(), "mistral".to_string()]);
        assert_eq!(backend.count(Call::Models), 2);

        let status = orchestrator
            .session_status(&SessionId::new("s"))
            .await
            .unwrap();
        assert!(status.has_intent);
        assert!(!status.has_qa_pairs);
    }
}
