//! Session data model: stages, the live session value and its wire records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::error::SessionError;

/// Backend-assigned session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Workflow phase of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Init,
    QuestionsPending,
    AwaitingAnswers,
    PlanPending,
    Researching,
    Complete,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Failed)
    }

    /// A session in one of these stages blocks starting another
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Stage::QuestionsPending | Stage::AwaitingAnswers | Stage::PlanPending | Stage::Researching
        )
    }

    /// Stages only move one step forward along the happy path; any
    /// non-terminal stage may fail.
    pub fn can_advance_to(self, next: Stage) -> bool {
        match (self, next) {
            (from, Stage::Failed) => !from.is_terminal(),
            (Stage::Init, Stage::QuestionsPending)
            | (Stage::QuestionsPending, Stage::AwaitingAnswers)
            | (Stage::AwaitingAnswers, Stage::PlanPending)
            | (Stage::PlanPending, Stage::Researching)
            | (Stage::Researching, Stage::Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Init => "init",
            Stage::QuestionsPending => "questions_pending",
            Stage::AwaitingAnswers => "awaiting_answers",
            Stage::PlanPending => "plan_pending",
            Stage::Researching => "researching",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
}

/// A question paired with the user's answer, in the order the backend asked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// Why a session ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Failure {
    /// An `error` push event during research
    Backend(String),
    /// The push channel dropped during research
    Transport(String),
}

impl From<&Failure> for SessionError {
    fn from(failure: &Failure) -> Self {
        match failure {
            Failure::Backend(message) => SessionError::BackendReported(message.clone()),
            Failure::Transport(message) => SessionError::Transport(message.clone()),
        }
    }
}

/// The single live research session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: Option<SessionId>,
    pub intent: String,
    pub model_name: String,
    pub stage: Stage,
    pub questions: Vec<String>,
    /// Keyed by question; empty values are unanswered
    pub answers: BTreeMap<String, String>,
    pub plan: Vec<String>,
    /// Description of the step the backend is working on
    pub current_step: Option<String>,
    /// Last-applied result list per query
    pub search_results: BTreeMap<String, Vec<SearchResult>>,
    pub report_ref: Option<String>,
    pub status_message: Option<String>,
    pub failure: Option<Failure>,
    /// Assistant-side messages for the conversation log
    pub transcript: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(intent: &str, model_name: &str) -> Self {
        Self {
            id: None,
            intent: intent.to_string(),
            model_name: model_name.to_string(),
            stage: Stage::Init,
            questions: Vec::new(),
            answers: BTreeMap::new(),
            plan: Vec::new(),
            current_step: None,
            search_results: BTreeMap::new(),
            report_ref: None,
            status_message: None,
            failure: None,
            transcript: Vec::new(),
            created_at: Utc::now(),
            last_event_at: None,
        }
    }

    /// Move to `next` if the stage table allows it
    pub fn advance(&mut self, next: Stage) -> bool {
        if !self.stage.can_advance_to(next) {
            warn!("Refusing stage transition {} -> {}", self.stage, next);
            return false;
        }
        info!("Session stage {} -> {}", self.stage, next);
        self.stage = next;
        true
    }

    pub fn fail(&mut self, failure: Failure) -> bool {
        if !self.advance(Stage::Failed) {
            return false;
        }
        self.failure = Some(failure);
        true
    }

    pub fn set_status<S: Into<String>>(&mut self, message: S) {
        self.status_message = Some(message.into());
    }

    /// Store the clarifying questions and enter `AwaitingAnswers` with every
    /// question unanswered.
    pub fn receive_questions(&mut self, questions: Vec<String>) -> bool {
        if self.stage != Stage::QuestionsPending {
            return false;
        }
        self.answers = questions
            .iter()
            .map(|q| (q.clone(), String::new()))
            .collect();
        self.questions = questions;
        self.advance(Stage::AwaitingAnswers)
    }

    pub fn record_answer(&mut self, question: &str, answer: String) -> Result<(), SessionError> {
        if self.stage != Stage::AwaitingAnswers {
            return Err(SessionError::validation(format!(
                "Answers can only be recorded while awaiting answers (session is {})",
                self.stage
            )));
        }
        match self.answers.get_mut(question) {
            Some(slot) => {
                *slot = answer;
                Ok(())
            }
            None => Err(SessionError::validation(format!(
                "Unknown question: {}",
                question
            ))),
        }
    }

    /// Questions whose answer is still blank, in question order
    pub fn unanswered(&self) -> Vec<&str> {
        self.questions
            .iter()
            .filter(|q| {
                self.answers
                    .get(q.as_str())
                    .map(|a| a.trim().is_empty())
                    .unwrap_or(true)
            })
            .map(|q| q.as_str())
            .collect()
    }

    pub fn qa_pairs(&self) -> Vec<QaPair> {
        self.questions
            .iter()
            .map(|q| QaPair {
                question: q.clone(),
                answer: self.answers.get(q).cloned().unwrap_or_default(),
            })
            .collect()
    }

    /// First-writer-wins plan merge shared by the plan fetch and the
    /// `plan_generated` event. An applied plan starts research.
    pub fn apply_plan(&mut self, plan: Vec<String>) -> bool {
        if !matches!(self.stage, Stage::PlanPending | Stage::Researching) {
            return false;
        }
        if !self.plan.is_empty() || plan.is_empty() {
            return false;
        }
        self.plan = plan;
        if self.stage == Stage::PlanPending {
            self.advance(Stage::Researching);
        }
        true
    }
}
