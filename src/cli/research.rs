//! CLI handler for the `research` subcommand
//!
//! Drives one session end to end: intent, clarifying questions, plan, then
//! live progress from the push channel until the report is ready.

use crate::backend::create_backend;
use crate::channel::WebSocketTransport;
use crate::cli::ResearchArgs;
use crate::config::Config;
use crate::error::SessionError;
use crate::orchestrator::RequestOrchestrator;
use crate::session::{SessionController, SessionView, SideEffect, Stage};
use anyhow::{anyhow, bail, Context};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn execute(args: ResearchArgs) -> anyhow::Result<()> {
    let config = args.server.load_config()?;
    let orchestrator = RequestOrchestrator::new(create_backend(&config)?, config.retry.clone());
    let model = pick_model(&args, &config, &orchestrator).await?;
    info!("Using model {}", model);

    let preset = match args.answers {
        Some(ref path) => load_answers(path)?,
        None => BTreeMap::new(),
    };

    let intent = if args.intent.is_empty() {
        prompt("What would you like to research?")?
    } else {
        args.intent.join(" ")
    };

    let transport = Arc::new(WebSocketTransport::new(config.channel_url()?));
    let (controller, inbox) =
        SessionController::new(orchestrator, transport, config.channel.reopen_after_answers);
    let controller = Arc::new(controller);
    let (effects_tx, mut effects_rx) = mpsc::unbounded_channel();
    let pump = controller.spawn_pump(inbox, effects_tx);

    // Clarifying questions
    let questions = loop {
        print!("Starting research with {}... ", model);
        io::stdout().flush()?;
        match controller.start_session(&intent, &model).await {
            Ok(questions) => {
                println!("done");
                break questions;
            }
            Err(e) if e.is_retryable() && ask_retry(&e)? => continue,
            Err(e) => return Err(e.into()),
        }
    };

    let answers = collect_answers(&questions, &preset)?;

    // Plan
    print!("\nSubmitting answers... ");
    io::stdout().flush()?;
    let mut result = controller.submit_answers(answers).await;
    let plan = loop {
        match result {
            Ok(plan) => break plan,
            Err(e) if e.is_retryable() && ask_retry(&e)? => {
                result = if *controller.subscribe().borrow() == Stage::PlanPending {
                    controller.refetch_plan().await
                } else {
                    controller.submit_answers(Vec::new()).await
                };
            }
            Err(e) => return Err(e.into()),
        }
    };
    println!("done");
    print_plan(&plan);

    // Live progress
    let cancelled = tokio::select! {
        _ = follow_progress(&mut effects_rx, print_effect) => false,
        _ = tokio::signal::ctrl_c() => {
            if let Err(e) = controller.cancel().await {
                warn!("Cancel failed: {}", e);
            }
            true
        }
    };
    pump.abort();

    let view = controller
        .current_view()
        .await
        .ok_or_else(|| anyhow!("Session was discarded"))?;

    if let Some(ref path) = args.save_view {
        save_view(&view, path)?;
    }

    if cancelled {
        println!("\nCancel requested; research stopped.");
        return Ok(());
    }

    match view.outcome() {
        Ok(Some(report_ref)) => {
            println!("\nReport: {}", config.report_url(report_ref)?);
            Ok(())
        }
        Ok(None) => bail!("Session ended in stage {} without a report", view.session.stage),
        Err(e) => Err(e.into()),
    }
}

async fn pick_model(
    args: &ResearchArgs,
    config: &Config,
    orchestrator: &RequestOrchestrator,
) -> anyhow::Result<String> {
    if let Some(model) = args.model.clone().or_else(|| config.model.clone()) {
        return Ok(model);
    }
    debug!("No model configured; asking the backend");
    let models = orchestrator.list_models().await?;
    models
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Backend reported no models; pass --model"))
}

fn load_answers(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read answers file {:?}", path))?;
    let answers = serde_yaml::from_str(&content)
        .with_context(|| format!("Answers file {:?} must map questions to answers", path))?;
    Ok(answers)
}

fn collect_answers(
    questions: &[String],
    preset: &BTreeMap<String, String>,
) -> anyhow::Result<Vec<(String, String)>> {
    if questions.is_empty() {
        return Ok(Vec::new());
    }

    println!("\n┌─ Clarifying questions ({}) ─────────────────────────────────────────┐", questions.len());
    println!("│ Answer each question. Type 'q' to quit.");
    println!("└─────────────────────────────────────────────────────────────────────┘\n");

    let mut answers = Vec::with_capacity(questions.len());
    for (i, question) in questions.iter().enumerate() {
        println!("{}. {}", i + 1, question);

        let answer = match preset.get(question).filter(|a| !a.trim().is_empty()) {
            Some(answer) => answer.clone(),
            None => loop {
                let input = prompt("  →")?;
                if input.eq_ignore_ascii_case("q") {
                    bail!("Cancelled");
                }
                if !input.is_empty() {
                    break input;
                }
                println!("  An answer is required.");
            },
        };

        println!("  ✓ {}\n", answer);
        answers.push((question.clone(), answer));
    }
    Ok(answers)
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{} ", label);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        bail!("stdin closed");
    }
    Ok(input.trim().to_string())
}

fn ask_retry(error: &SessionError) -> anyhow::Result<bool> {
    println!("failed");
    eprintln!("{}", error);
    let input = prompt("Retry? [Y/n]")?;
    Ok(input.is_empty() || input.eq_ignore_ascii_case("y"))
}

fn print_plan(plan: &[String]) {
    if plan.is_empty() {
        println!("Waiting for the research plan...");
        return;
    }
    println!("\nResearch plan:");
    for (i, step) in plan.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
    println!();
}

/// Hand every side effect to `on_effect` until the session's final one
/// (report ready or surfaced error) has been seen. The stage turns terminal
/// before the pump forwards that event's effects, so the effects stream is
/// what ends the wait.
async fn follow_progress<F>(effects: &mut mpsc::UnboundedReceiver<SideEffect>, mut on_effect: F)
where
    F: FnMut(&SideEffect),
{
    while let Some(effect) = effects.recv().await {
        on_effect(&effect);
        if effect.is_final() {
            return;
        }
    }
    debug!("Effects stream ended before the session finished");
}

fn print_effect(effect: &SideEffect) {
    match effect {
        SideEffect::Status(status) => println!("  · {}", status),
        SideEffect::AppendMessage(message) => println!("\n{}", message),
        SideEffect::SurfaceError(message) => eprintln!("Error during research: {}", message),
        SideEffect::ReportReady(report_ref) => debug!("Report ready at {}", report_ref),
    }
}

fn save_view(view: &SessionView, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(view)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    println!("Session view saved to {}", path.display());
    Ok(())
}
