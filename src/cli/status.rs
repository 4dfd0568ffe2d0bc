use crate::backend::create_backend;
use crate::cli::StatusArgs;
use crate::orchestrator::RequestOrchestrator;
use crate::session::SessionId;

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

pub async fn execute(args: StatusArgs) -> anyhow::Result<()> {
    let config = args.server.load_config()?;
    let orchestrator = RequestOrchestrator::new(create_backend(&config)?, config.retry.clone());

    let session_id = SessionId::new(args.session_id);
    let status = orchestrator.session_status(&session_id).await?;

    println!("Session {}", session_id);
    println!("  status:    {}", status.status.as_deref().unwrap_or("unknown"));
    println!("  intent:    {}", flag(status.has_intent));
    println!("  answers:   {}", flag(status.has_qa_pairs));
    println!("  plan:      {}", flag(status.has_plan));
    println!("  report:    {}", flag(status.has_report));
    Ok(())
}
