use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use overseer::config::{DEFAULT_DATA_DIR, LogFormat, LoggingSettings, OverseerConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "overseer")]
#[command(version, about = "Project-management agent backend")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding overseer.toml and the database
    #[arg(long, global = true, env = "OVERSEER_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP/WebSocket server
    Serve {
        /// Port to serve on (overrides config and OVERSEER_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (permissive CORS for a local UI dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Create the data directory, a default overseer.toml and the database
    Init {
        /// Overwrite an existing overseer.toml
        #[arg(long)]
        force: bool,
    },
    /// Inspect and decide pending actions
    Approvals {
        #[command(subcommand)]
        command: ApprovalCommands,
    },
    /// Manage task dependencies
    Deps {
        #[command(subcommand)]
        command: DepsCommands,
    },
    /// Run the Claude CLI once with a prompt
    Run {
        /// Stream steps as they arrive instead of waiting for the final text
        #[arg(long)]
        stream: bool,

        /// Prompt text, or `-` to read it from stdin
        prompt: String,
    },
    /// Work with plan documents
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ApprovalCommands {
    /// List actions (expires overdue ones first)
    List {
        /// Only show actions with this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Approve an action and run it
    Approve {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Reject an action
    Reject {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum DepsCommands {
    /// Make <task> depend on <depends_on>
    Add {
        task: String,
        depends_on: String,
        /// depends_on | blocks
        #[arg(long = "type", default_value = "depends_on")]
        dependency_type: String,
    },
    /// Remove the edge <task> -> <depends_on>
    Remove { task: String, depends_on: String },
    /// Report whether all of <task>'s dependencies are completed
    Check { task: String },
}

#[derive(Subcommand, Clone)]
pub enum PlanCommands {
    /// Print the analysis of a plan markdown file as JSON
    Analyze {
        file: PathBuf,

        /// Also create the suggested tasks in this project
        #[arg(long)]
        project_id: Option<i64>,
    },
}

fn init_tracing(settings: &LoggingSettings, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { settings.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match settings.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = OverseerConfig::resolve(&cli.data_dir).context("Failed to load configuration")?;
    config.validate()?;
    init_tracing(&config.logging, cli.verbose);

    match &cli.command {
        Commands::Serve { port, dev } => {
            cmd::cmd_serve(config, &cli.data_dir, *port, *dev).await?;
        }
        Commands::Init { force } => cmd::cmd_init(&cli.data_dir, *force)?,
        Commands::Approvals { command } => {
            cmd::cmd_approvals(&config, &cli.data_dir, command.clone()).await?;
        }
        Commands::Deps { command } => {
            cmd::cmd_deps(&config, &cli.data_dir, command.clone()).await?;
        }
        Commands::Run { stream, prompt } => {
            cmd::cmd_run(&config, prompt, *stream).await?;
        }
        Commands::Plan { command } => {
            cmd::cmd_plan(&config, &cli.data_dir, command.clone()).await?;
        }
    }

    Ok(())
}
