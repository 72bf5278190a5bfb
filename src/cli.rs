//! Command-line interface definition for Watch Pro
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for serving the HTTP API, asking a one-off question,
//! and inspecting chat history.

use clap::{Parser, Subcommand};

/// Watch Pro - conversational watch-domain assistant
///
/// Answers watch questions by orchestrating model calls and web search,
/// and keeps chat history in a key-value store.
#[derive(Parser, Debug, Clone)]
#[command(name = "watchpro")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "WATCHPRO_JSON_LOGS")]
    pub json_logs: bool,

    /// Use the local store at this path (overrides the configured backend)
    #[arg(long, env = "WATCHPRO_STORE_PATH_OVERRIDE")]
    pub store_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Watch Pro
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Override the bind address from config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Ask a single question and stream the answer to the terminal
    Ask {
        /// The question to ask
        question: String,

        /// Continue an existing chat instead of starting a new one
        #[arg(long)]
        chat: Option<String>,

        /// User id to record the chat under
        #[arg(short, long)]
        user: Option<String>,

        /// Skip intent classification and go straight to research
        #[arg(long)]
        skip_inquiry: bool,
    },

    /// Inspect stored chat history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List chats for a user, newest first
    List {
        /// User id (defaults to the configured default user)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show the messages of a chat
    Show {
        /// Chat id
        id: String,
    },

    /// Delete all chats for a user
    Clear {
        /// User id (defaults to the configured default user)
        #[arg(short, long)]
        user: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["watchpro", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        match cli.command {
            Commands::Serve { bind } => assert_eq!(bind.as_deref(), Some("0.0.0.0:8080")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ask_with_flags() {
        let cli = Cli::try_parse_from([
            "watchpro",
            "ask",
            "Is the Speedmaster a chronometer?",
            "--user",
            "u1",
            "--skip-inquiry",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                question,
                chat,
                user,
                skip_inquiry,
            } => {
                assert_eq!(question, "Is the Speedmaster a chronometer?");
                assert!(chat.is_none());
                assert_eq!(user.as_deref(), Some("u1"));
                assert!(skip_inquiry);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_history_show() {
        let cli = Cli::try_parse_from(["watchpro", "history", "show", "abc"]).unwrap();
        match cli.command {
            Commands::History {
                command: HistoryCommand::Show { id },
            } => assert_eq!(id, "abc"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["watchpro", "history", "list"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("config/config.yaml"));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_json_logs() {
        let cli = Cli::try_parse_from(["watchpro", "--json-logs", "serve"]).unwrap();
        assert!(cli.json_logs);
    }
}
