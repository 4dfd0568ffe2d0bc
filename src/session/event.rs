//! Push notifications from the research backend and the directives the
//! reducer hands to the presentation layer

use serde::{Deserialize, Serialize};

use super::types::SearchResult;

/// A tagged push notification. Unknown `type`s decode to `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    StatusUpdate {
        status: String,
    },
    PlanGenerated {
        plan: Vec<String>,
    },
    StepStarted {
        step: String,
        #[serde(default)]
        step_index: Option<usize>,
    },
    QueriesGenerated {
        #[serde(default)]
        step_index: Option<usize>,
        #[serde(default)]
        queries: Vec<String>,
    },
    ExecutingSearch {
        query: String,
        #[serde(default)]
        query_index: Option<usize>,
    },
    SearchResults {
        query: String,
        #[serde(default)]
        results: Vec<SearchResult>,
    },
    ProcessingUrl {
        title: String,
        #[serde(default)]
        url: Option<String>,
    },
    UrlProcessed {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        category: Option<String>,
    },
    StepCompleted {
        #[serde(alias = "stepIndex")]
        step_index: usize,
    },
    GeneratingReport,
    ReportGenerated {
        filename: String,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::StatusUpdate { .. } => "status_update",
            InboundEvent::PlanGenerated { .. } => "plan_generated",
            InboundEvent::StepStarted { .. } => "step_started",
            InboundEvent::QueriesGenerated { .. } => "queries_generated",
            InboundEvent::ExecutingSearch { .. } => "executing_search",
            InboundEvent::SearchResults { .. } => "search_results",
            InboundEvent::ProcessingUrl { .. } => "processing_url",
            InboundEvent::UrlProcessed { .. } => "url_processed",
            InboundEvent::StepCompleted { .. } => "step_completed",
            InboundEvent::GeneratingReport => "generating_report",
            InboundEvent::ReportGenerated { .. } => "report_generated",
            InboundEvent::Error { .. } => "error",
            InboundEvent::Unknown => "unknown",
        }
    }
}

/// Instruction for the presentation layer; never a state mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// The status line changed
    Status(String),
    /// Add an assistant message to the conversation
    AppendMessage(String),
    /// Show a research failure to the user, verbatim
    SurfaceError(String),
    /// The report can be opened at this reference
    ReportReady(String),
}

impl SideEffect {
    /// True for the last effect of a session that just ended
    pub fn is_final(&self) -> bool {
        matches!(self, SideEffect::SurfaceError(_) | SideEffect::ReportReady(_))
    }
}
