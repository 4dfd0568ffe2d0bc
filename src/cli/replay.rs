//! CLI handler for the `replay` subcommand
//!
//! Folds a recorded event log through the reducer, starting from a session
//! whose answers were just accepted, and prints what a live client would show.

use crate::cli::ReplayArgs;
use crate::session::{reduce, InboundEvent, Session, SessionView, Stage};
use anyhow::Context;
use tracing::info;

pub fn execute(args: ReplayArgs) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&args.events)
        .with_context(|| format!("Failed to read event log {:?}", args.events))?;

    let view = replay(&args.intent, &content)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }
    Ok(())
}

fn replay(intent: &str, log: &str) -> anyhow::Result<SessionView> {
    let mut session = Session::new(intent, "replay");
    for stage in [
        Stage::QuestionsPending,
        Stage::AwaitingAnswers,
        Stage::PlanPending,
    ] {
        session.advance(stage);
    }

    let mut applied = 0;
    for (n, line) in log.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: InboundEvent = serde_json::from_str(line)
            .with_context(|| format!("Malformed event on line {}", n + 1))?;
        let (next, effects) = reduce(session, event);
        session = next;
        applied += 1;
        for effect in effects {
            info!("line {}: {:?}", n + 1, effect);
        }
    }
    info!("Replayed {} events", applied);

    Ok(SessionView::new(session))
}

pub fn print_view(view: &SessionView) {
    let session = &view.session;
    println!("Stage: {}", session.stage);
    if let Some(ref status) = session.status_message {
        println!("Status: {}", status);
    }
    println!(
        "Progress: {}% ({} results)",
        view.correlation.progress_percentage, view.correlation.total_results
    );

    for step in &view.correlation.steps {
        let icon = if step.completed {
            "✓"
        } else if step.active {
            "▶"
        } else {
            " "
        };
        println!("  {} {}. {}", icon, step.index + 1, step.description);
        for query in &step.queries {
            let count = session.search_results.get(query).map_or(0, Vec::len);
            println!("      {} ({} results)", query, count);
        }
    }

    if let Some(ref report_ref) = session.report_ref {
        println!("Report: {}", report_ref);
    }
    if let Some(ref failure) = session.failure {
        println!("Failed: {:?}", failure);
    }
}
