use anyhow::Result;
use autoship::config::AppConfig;
use autoship::logging::{LogOptions, init_logging};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "autoship")]
#[command(
    version,
    about = "Turn a project description into a published, deployed repository"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to the config file (defaults to ./autoship.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one pipeline in the foreground and print its progress
    Create {
        /// Natural-language description of the project
        description: String,

        /// Repository name (defaults to project-<unix seconds>)
        project_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Credentials may live in a local .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load(cli.config.as_deref())?;
    let _log_guard = init_logging(LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
        log_dir: config.log_dir.as_deref(),
    })?;

    match cli.command {
        Commands::Serve { port } => cmd::cmd_serve(config, port).await?,
        Commands::Create {
            description,
            project_name,
        } => cmd::cmd_create(config, &description, project_name).await?,
    }

    Ok(())
}
