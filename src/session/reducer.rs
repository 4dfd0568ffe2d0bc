//! Event reducer: folds push notifications into the session
//!
//! `reduce` is a pure, total function over `InboundEvent`. Events whose stage
//! precondition does not hold are no-ops, which also makes duplicate and
//! late-arriving events harmless.

use tracing::{debug, info, warn};

use super::event::{InboundEvent, SideEffect};
use super::types::{Failure, Session, Stage};

/// Backend messages that report "not ready yet" while setup catches up.
/// Matched case-insensitively as substrings.
const SETUP_SENTINELS: [&str; 2] = [
    "user intent and qa pairs must be set",
    "please answer the clarifying questions",
];

pub const COMPLETION_MESSAGE: &str = "I've completed the research and generated a report.";

/// True when a backend error message is one of the known setup-phase
/// sentinels, which are never shown to the user.
pub fn is_setup_sentinel(message: &str) -> bool {
    let message = message.to_lowercase();
    SETUP_SENTINELS.iter().any(|s| message.contains(s))
}

/// Apply one inbound event to the session
pub fn reduce(mut session: Session, event: InboundEvent) -> (Session, Vec<SideEffect>) {
    let mut effects = Vec::new();
    let kind = event.kind();

    match event {
        InboundEvent::StatusUpdate { status } => {
            if session.stage.is_terminal() {
                skip(&session, kind);
            } else if let Some(message) = status_text(&status) {
                set_status(&mut session, &mut effects, message);
            } else {
                debug!("Unhandled backend status '{}'", status);
            }
        }

        InboundEvent::PlanGenerated { plan } => {
            if session.apply_plan(plan) {
                info!("Plan applied from push notification");
                set_status(
                    &mut session,
                    &mut effects,
                    "Research plan generated. Beginning execution...",
                );
            } else {
                debug!("Ignoring plan_generated in stage {}", session.stage);
            }
        }

        InboundEvent::StepStarted { step, .. } => {
            if researching(&session, kind) {
                let message = format!("Working on: {}", step);
                session.current_step = Some(step);
                set_status(&mut session, &mut effects, message);
            }
        }

        InboundEvent::QueriesGenerated { .. } => {
            if researching(&session, kind) {
                set_status(
                    &mut session,
                    &mut effects,
                    "Created search queries for current step",
                );
            }
        }

        InboundEvent::ExecutingSearch { query, .. } => {
            if researching(&session, kind) {
                set_status(
                    &mut session,
                    &mut effects,
                    format!("Searching for: \"{}\"", query),
                );
            }
        }

        InboundEvent::SearchResults { query, results } => {
            if researching(&session, kind) {
                let message = format!("Found {} results for \"{}\"", results.len(), query);
                session.search_results.insert(query, results);
                set_status(&mut session, &mut effects, message);
            }
        }

        InboundEvent::ProcessingUrl { title, .. } => {
            if researching(&session, kind) {
                set_status(&mut session, &mut effects, format!("Analyzing: {}", title));
            }
        }

        InboundEvent::UrlProcessed { title, url, .. } => {
            if researching(&session, kind) {
                let source = title.or(url).unwrap_or_else(|| "source".to_string());
                set_status(&mut session, &mut effects, format!("Processed: {}", source));
            }
        }

        InboundEvent::StepCompleted { step_index } => {
            if researching(&session, kind) {
                set_status(
                    &mut session,
                    &mut effects,
                    format!("Completed research step {}", step_index.saturating_add(1)),
                );
            }
        }

        InboundEvent::GeneratingReport => {
            if researching(&session, kind) {
                set_status(
                    &mut session,
                    &mut effects,
                    "Generating final research report...",
                );
            }
        }

        InboundEvent::ReportGenerated { filename } => {
            if researching(&session, kind) {
                let report_ref = format!("/{}", filename.trim_start_matches('/'));
                session.report_ref = Some(report_ref.clone());
                session.advance(Stage::Complete);
                set_status(&mut session, &mut effects, "Research completed successfully!");
                session.transcript.push(COMPLETION_MESSAGE.to_string());
                effects.push(SideEffect::AppendMessage(COMPLETION_MESSAGE.to_string()));
                effects.push(SideEffect::ReportReady(report_ref));
            }
        }

        InboundEvent::Error { message } => {
            if is_setup_sentinel(&message) {
                debug!("Suppressing setup-phase backend message: {}", message);
            } else if session.stage == Stage::Researching {
                warn!("Backend reported an error during research: {}", message);
                session.fail(Failure::Backend(message.clone()));
                set_status(&mut session, &mut effects, "Error during research");
                session
                    .transcript
                    .push(format!("Error during research: {}", message));
                effects.push(SideEffect::SurfaceError(message));
            } else {
                info!(
                    "Ignoring backend error during {}: {}",
                    session.stage, message
                );
            }
        }

        InboundEvent::Unknown => {
            debug!("Ignoring unknown event kind");
        }
    }

    (session, effects)
}

fn researching(session: &Session, kind: &str) -> bool {
    if session.stage == Stage::Researching {
        true
    } else {
        skip(session, kind);
        false
    }
}

fn skip(session: &Session, kind: &str) {
    debug!("Ignoring {} in stage {}", kind, session.stage);
}

fn set_status<S: Into<String>>(session: &mut Session, effects: &mut Vec<SideEffect>, message: S) {
    let message = message.into();
    session.set_status(message.clone());
    effects.push(SideEffect::Status(message));
}

fn status_text(status: &str) -> Option<&'static str> {
    match status {
        "completed" => Some("Research completed!"),
        "cancelled" => Some("Research cancelled"),
        "generating_report" => Some("Generating final research report..."),
        "generating_plan" => Some("Creating research plan..."),
        s if s.contains("generating_queries") => Some("Generating search queries..."),
        _ => None,
    }
}
