//! Main entry point for the Unify chat CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::{Config, SessionConfig};
use std::path::PathBuf;
use tracing::debug;

mod commands;
mod logging;

use commands::{
    chat::{FollowArgs, HistoryArgs, SendArgs},
    conversations::{DeleteArgs, SearchArgs},
    room::RoomArgs,
};

/// Unify chat CLI
#[derive(Parser, Debug)]
#[command(name = "unify")]
#[command(about = "Command-line client for Unify campus chat", long_about = None)]
struct Cli {
    /// Path to the configuration file (yaml or json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Session token, overriding the configuration file and environment
    #[arg(long, global = true)]
    token: Option<String>,

    /// Signed-in user identifier, overriding the configuration file and environment
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the Unify CLI
#[derive(Subcommand, Debug)]
enum Commands {
    /// List conversations, most recent first
    Conversations,

    /// Search users to start a conversation with
    Search(SearchArgs),

    /// Show the message history with a peer
    History(HistoryArgs),

    /// Send a private message
    Send(SendArgs),

    /// Delete a conversation
    Delete(DeleteArgs),

    /// Follow live messages, conversations and presence
    Follow(FollowArgs),

    /// Join a college room
    Room(RoomArgs),

    /// Generate a configuration file
    Config {
        /// Format of the configuration file to generate (yaml or json). Defaults to yaml.
        #[arg(long, short, default_value = "yaml")]
        format: String,

        /// Where to write the file (defaults to ./config.<format>)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell type for which to generate the completion script
        #[arg(long, short, value_enum)]
        shell: clap_complete::Shell,
    },
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().or_else(|| {
        let default = Config::default_path();
        default.exists().then_some(default)
    });
    let overrides = SessionConfig {
        user_id: cli.user.clone(),
        token: cli.token.clone(),
    };
    Config::load_config(path, overrides).context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { ref format, ref output } => {
            commands::config::generate_config(format, output.clone())?;
            return Ok(());
        }
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
            return Ok(());
        }
        _ => {}
    }

    let config = resolve_config(&cli)?;
    let level = logging::initialize_tracing(&config.logging);
    debug!(level = %level, api = %config.api_base_url, "configuration loaded");

    match cli.command {
        Commands::Conversations => commands::conversations::handle_conversations(config).await,
        Commands::Search(args) => commands::conversations::handle_search(config, args).await,
        Commands::History(args) => commands::chat::handle_history(config, args).await,
        Commands::Send(args) => commands::chat::handle_send(config, args).await,
        Commands::Delete(args) => commands::conversations::handle_delete(config, args).await,
        Commands::Follow(args) => commands::chat::handle_follow(config, args).await,
        Commands::Room(args) => commands::room::handle_room(config, args).await,
        Commands::Config { .. } | Commands::Completion { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_apply_to_subcommands() {
        let cli = Cli::try_parse_from([
            "unify", "history", "--peer", "u2", "--user", "me", "--token", "t",
        ])
        .unwrap();

        assert_eq!(cli.user.as_deref(), Some("me"));
        assert_eq!(cli.token.as_deref(), Some("t"));
        assert!(matches!(cli.command, Commands::History(HistoryArgs { ref peer }) if peer == "u2"));
    }

    #[test]
    fn completion_requires_known_shell() {
        assert!(Cli::try_parse_from(["unify", "completion", "--shell", "tcsh"]).is_err());
        assert!(Cli::try_parse_from(["unify", "completion", "--shell", "zsh"]).is_ok());
    }
}
