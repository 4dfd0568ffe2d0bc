use crate::backend::create_backend;
use crate::cli::ServerArgs;
use crate::orchestrator::RequestOrchestrator;

pub async fn execute(args: ServerArgs) -> anyhow::Result<()> {
    let config = args.load_config()?;
    let orchestrator = RequestOrchestrator::new(create_backend(&config)?, config.retry.clone());

    let models = orchestrator.list_models().await?;
    if models.is_empty() {
        println!("Backend reported no models.");
        return Ok(());
    }

    for model in models {
        let marker = if config.model.as_deref() == Some(model.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, model);
    }
    Ok(())
}
