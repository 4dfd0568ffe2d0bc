use super::{ResearchBackend, SessionStatus};
use crate::error::SessionError;
use crate::session::{QaPair, SessionId};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// `ResearchBackend` over the backend's JSON HTTP API
pub struct HttpBackend {
    http: Client,
    base_url: Url,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    intent: &'a str,
    model_name: &'a str,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Serialize)]
struct SubmitAnswersRequest<'a> {
    qa_pairs: &'a [QaPair],
    session_id: &'a str,
}

#[derive(Deserialize)]
struct QuestionsResponse {
    #[serde(default)]
    questions: Vec<String>,
}

#[derive(Deserialize)]
struct PlanResponse {
    #[serde(default)]
    plan: Vec<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl HttpBackend {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SessionError> {
        self.base_url
            .join(path)
            .map_err(|e| SessionError::Transport(format!("invalid endpoint '{}': {}", path, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SessionError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let response = self.http.post(url).json(body).send().await?;
        decode(response).await
    }
}

/// Map a response to its JSON body, or to `Server` for non-success statuses
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SessionError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(SessionError::Server {
            status: status.as_u16(),
            detail: error_detail(&body),
        });
    }

    serde_json::from_str(&body).map_err(|e| SessionError::Server {
        status: status.as_u16(),
        detail: format!("malformed response body: {}", e),
    })
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl ResearchBackend for HttpBackend {
    async fn create_session(
        &self,
        intent: &str,
        model_name: &str,
    ) -> Result<SessionId, SessionError> {
        let response: CreateSessionResponse = self
            .post("sessions", &CreateSessionRequest { intent, model_name })
            .await?;
        info!("Backend created session {}", response.session_id);
        Ok(SessionId::new(response.session_id))
    }

    async fn fetch_questions(&self, session_id: &SessionId) -> Result<Vec<String>, SessionError> {
        let response: QuestionsResponse =
            self.get(&format!("sessions/{}/questions", session_id)).await?;
        Ok(response.questions)
    }

    async fn submit_answers(
        &self,
        session_id: &SessionId,
        answers: &[QaPair],
    ) -> Result<(), SessionError> {
        let body = SubmitAnswersRequest {
            qa_pairs: answers,
            session_id: session_id.as_str(),
        };
        let _: serde_json::Value = self
            .post(&format!("sessions/{}/answers", session_id), &body)
            .await?;
        Ok(())
    }

    async fn fetch_plan(&self, session_id: &SessionId) -> Result<Vec<String>, SessionError> {
        let response: PlanResponse = self.get(&format!("sessions/{}/plan", session_id)).await?;
        Ok(response.plan)
    }

    async fn list_models(&self) -> Result<Vec<String>, SessionError> {
        let response: ModelsResponse = self.get("models").await?;
        Ok(response.models)
    }

    async fn session_status(&self, session_id: &SessionId) -> Result<SessionStatus, SessionError> {
        self.get(&format!("sessions/{}/status", session_id)).await
    }
}
