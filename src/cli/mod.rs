pub mod models;
pub mod replay;
pub mod research;
pub mod schema;
pub mod status;

use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "noviq")]
#[command(
    author,
    version,
    about = "Client for a clarify-plan-research backend: questions, plan, live progress, report"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a research session interactively
    Research(ResearchArgs),

    /// List the models the backend offers
    Models(ServerArgs),

    /// Show the backend's status record for a session
    Status(StatusArgs),

    /// Fold a recorded push-event log and print the resulting view
    Replay(ReplayArgs),

    /// Print JSON Schema for config validation
    Schema,
}

/// Where to find the backend
#[derive(Args, Clone)]
pub struct ServerArgs {
    /// Path to config file (defaults are used when it does not exist)
    #[arg(short, long, default_value = "noviq.yaml")]
    pub config: PathBuf,

    /// Override the backend base URL
    #[arg(long, env = "NOVIQ_SERVER")]
    pub server: Option<String>,
}

impl ServerArgs {
    /// Load the config file (or defaults), apply overrides and validate
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = if self.config.exists() {
            info!("Loading config from {:?}", self.config);
            Config::load(&self.config)?
        } else {
            info!("No config found, using defaults");
            Config::default()
        };

        if let Some(ref server) = self.server {
            config.server.base_url = server.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser, Clone)]
pub struct ResearchArgs {
    /// What to research (prompted for when omitted)
    #[arg(value_name = "INTENT")]
    pub intent: Vec<String>,

    /// Model to use (defaults to config `model`, then the backend's first)
    #[arg(short, long)]
    pub model: Option<String>,

    /// YAML map of question to answer; unmatched questions are prompted for
    #[arg(long, value_name = "FILE")]
    pub answers: Option<PathBuf>,

    /// Write the final session view as JSON
    #[arg(long, value_name = "FILE")]
    pub save_view: Option<PathBuf>,

    #[command(flatten)]
    pub server: ServerArgs,
}

#[derive(Parser, Clone)]
pub struct StatusArgs {
    /// Backend session id
    pub session_id: String,

    #[command(flatten)]
    pub server: ServerArgs,
}

#[derive(Parser, Clone)]
pub struct ReplayArgs {
    /// Event log, one JSON push event per line
    #[arg(value_name = "EVENTS")]
    pub events: PathBuf,

    /// Intent recorded on the replayed session
    #[arg(long, default_value = "replayed session")]
    pub intent: String,

    /// Print the view as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}
