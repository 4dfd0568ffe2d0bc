use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod backend;
mod channel;
mod cli;
mod config;
mod error;
mod orchestrator;
mod session;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing - only show logs with --verbose
    let filter = if cli.verbose {
        EnvFilter::new("noviq=debug")
    } else {
        EnvFilter::new("noviq=warn")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Research(args) => cli::research::execute(args).await,
        Commands::Models(args) => cli::models::execute(args).await,
        Commands::Status(args) => cli::status::execute(args).await,
        Commands::Replay(args) => cli::replay::execute(args),
        Commands::Schema => cli::schema::execute(),
    }
}
