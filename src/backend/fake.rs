//! In-memory backend for orchestrator and controller tests

use super::{ResearchBackend, SessionStatus};
use crate::error::SessionError;
use crate::session::{QaPair, SessionId};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Create,
    Questions,
    Submit,
    Plan,
    Models,
    Status,
}

#[derive(Default)]
pub struct FakeBackend {
    questions: Mutex<Vec<String>>,
    plan: Mutex<Vec<String>>,
    models: Mutex<Vec<String>>,
    failures: Mutex<HashMap<Call, VecDeque<SessionError>>>,
    calls: Mutex<Vec<Call>>,
    submitted: Mutex<Vec<Vec<QaPair>>>,
    created: AtomicUsize,
    plan_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBackend {
    pub fn with_questions(questions: &[&str]) -> Self {
        let backend = Self::default();
        *backend.questions.lock().unwrap() = questions.iter().map(|q| q.to_string()).collect();
        backend
    }

    pub fn set_plan(&self, plan: &[&str]) {
        *self.plan.lock().unwrap() = plan.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_models(&self, models: &[&str]) {
        *self.models.lock().unwrap() = models.iter().map(|s| s.to_string()).collect();
    }

    /// Queue a failure for the next `call`
    pub fn fail(&self, call: Call, error: SessionError) {
        self.failures
            .lock()
            .unwrap()
            .entry(call)
            .or_default()
            .push_back(error);
    }

    /// Hold `fetch_plan` until the returned notify fires
    pub fn gate_plan(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.plan_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn submitted(&self) -> Vec<Vec<QaPair>> {
        self.submitted.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<(), SessionError> {
        self.calls.lock().unwrap().push(call);
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(&call)
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ResearchBackend for FakeBackend {
    async fn create_session(
        &self,
        _intent: &str,
        _model_name: &str,
    ) -> Result<SessionId, SessionError> {
        self.record(Call::Create)?;
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionId::new(format!("session-{}", n)))
    }

    async fn fetch_questions(&self, _session_id: &SessionId) -> Result<Vec<String>, SessionError> {
        self.record(Call::Questions)?;
        Ok(self.questions.lock().unwrap().clone())
    }

    async fn submit_answers(
        &self,
        _session_id: &SessionId,
        answers: &[QaPair],
    ) -> Result<(), SessionError> {
        self.record(Call::Submit)?;
        self.submitted.lock().unwrap().push(answers.to_vec());
        Ok(())
    }

    async fn fetch_plan(&self, _session_id: &SessionId) -> Result<Vec<String>, SessionError> {
        let gate = self.plan_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.record(Call::Plan)?;
        Ok(self.plan.lock().unwrap().clone())
    }

    async fn list_models(&self) -> Result<Vec<String>, SessionError> {
        self.record(Call::Models)?;
        Ok(self.models.lock().unwrap().clone())
    }

    async fn session_status(&self, _session_id: &SessionId) -> Result<SessionStatus, SessionError> {
        self.record(Call::Status)?;
        Ok(SessionStatus {
            status: Some("created".to_string()),
            has_intent: true,
            has_qa_pairs: !self.submitted.lock().unwrap().is_empty(),
            has_plan: !self.plan.lock().unwrap().is_empty(),
            has_report: false,
        })
    }
}
