//! Sleuth CLI: the main entry point.
//!
//! Commands:
//! - `ask`    one question, answer plus evidence
//! - `chat`   interactive session keeping history
//! - `serve`  start the HTTP API
//! - `tools`  list the tools the agent would get
//! - `init`   write a default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "sleuth",
    about = "Sleuth: an analyst agent for anti-fraud investigations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.sleuth/config.toml)
    #[arg(short, long, global = true, env = "SLEUTH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print the raw `{response, chunks, queries}` JSON
        #[arg(long)]
        json: bool,
    },

    /// Chat interactively
    Chat,

    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the registered tools
    Tools,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Ask { question, json } => commands::ask::run(config, &question.join(" "), json).await?,
        Commands::Chat => commands::chat::run(config).await?,
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Tools => commands::tools::run(config).await?,
        Commands::Init { force } => commands::init::run(config, force).await?,
    }

    Ok(())
}
