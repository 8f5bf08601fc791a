//! quill CLI: the main entry point.
//!
//! Commands:
//! - `init`           - Write the default configuration file
//! - `chat`           - Interactive chat or single-message mode
//! - `conversations`  - List, show or delete stored conversations
//! - `cache`          - Clear cached responses
//! - `tools`          - List the tools an agent would get

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use quill_config::{AppConfig, DEFAULT_CONFIG_FILE};

mod cmd;
mod logging;

#[derive(Parser)]
#[command(name = "quill", about = "quill: a small tool-calling agent", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE, env = "QUILL_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Provider id to use instead of `default_provider`
        #[arg(long)]
        provider: Option<String>,

        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,

        /// Continue a stored conversation
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },

    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// List available tools
    Tools,
}

#[derive(Subcommand)]
pub enum ConversationAction {
    /// List conversations, most recent first
    List,
    /// Print a conversation's messages
    Show { id: String },
    /// Delete a conversation
    Delete { id: String },
    /// Delete every stored conversation
    Clear {
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Remove cached responses
    Clear {
        /// Only remove entries older than this many days (default: cache.expiry_days)
        #[arg(long, conflicts_with = "all")]
        days: Option<u64>,

        /// Remove every entry
        #[arg(long)]
        all: bool,
    },
}

/// Load the configuration and install logging from it.
fn setup(cli: &Cli, materialize: bool) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let loaded = if materialize {
        AppConfig::load_or_init(&cli.config)
    } else {
        AppConfig::load_from(&cli.config)
    };
    let config = loaded.map_err(|e| format!("Failed to load config: {e}"))?;
    logging::init(Some(&config.logging), cli.verbose)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { force } => {
            logging::init(None, cli.verbose)?;
            cmd::init::run(&cli.config, *force)?
        }
        Commands::Chat {
            message,
            provider,
            no_cache,
            conversation,
        } => {
            let config = setup(&cli, true)?;
            let options = cmd::chat::ChatOptions {
                message: message.clone(),
                provider: provider.clone(),
                no_cache: *no_cache,
                conversation: conversation.clone(),
            };
            cmd::chat::run(config, options).await?
        }
        Commands::Conversations { action } => cmd::conversations::run(&setup(&cli, false)?, action).await?,
        Commands::Cache { action } => cmd::cache::run(&setup(&cli, false)?, action)?,
        Commands::Tools => cmd::tools::run(&setup(&cli, false)?),
    }

    Ok(())
}
