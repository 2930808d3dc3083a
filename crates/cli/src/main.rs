//! chatscout CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive session with tools and observers
//! - `ask`: Single message, optionally with a JSON schema for the answer
//! - `resume`: Continue a chat persisted after a quota failure
//! - `verify-audit`: Check the hash chain of an audit trail
//! - `config`: Show or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod session;

#[derive(Parser)]
#[command(
    name = "chatscout",
    about = "chatscout: a tool-calling chat agent with resilient model backends",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.chatscout/config.toml
    #[arg(short, long, global = true, env = "CHATSCOUT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent interactively
    Chat {
        /// Prefix for history and analytics files
        #[arg(short, long, default_value = "chat")]
        session: String,

        /// Do not connect to the tool server
        #[arg(long)]
        no_tools: bool,
    },

    /// Send a single message and print the answer
    Ask {
        message: String,

        /// JSON schema file the answer must conform to
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Name reported to the model for the schema
        #[arg(long, default_value = "answer")]
        schema_name: String,

        #[arg(long)]
        no_tools: bool,
    },

    /// Continue a persisted chat
    Resume {
        /// Chat file written when a backend ran out of quota
        path: PathBuf,

        #[arg(short, long, default_value = "resume")]
        session: String,

        #[arg(long)]
        no_tools: bool,
    },

    /// Verify the hash chain of an audit trail
    VerifyAudit { path: PathBuf },

    /// Show or validate the configuration
    Config {
        /// Print the default configuration as TOML
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Chat { session, no_tools } => {
            commands::chat::run(config, &session, !no_tools).await?
        }
        Commands::Ask {
            message,
            schema,
            schema_name,
            no_tools,
        } => commands::ask::run(config, &message, schema.as_deref(), &schema_name, !no_tools).await?,
        Commands::Resume {
            path,
            session,
            no_tools,
        } => commands::resume::run(config, &path, &session, !no_tools).await?,
        Commands::VerifyAudit { path } => commands::verify_audit::run(&path)?,
        Commands::Config { default } => commands::config_cmd::run(config, default)?,
    }

    Ok(())
}
