//! Watch Pro - conversational watch-domain assistant
//!
#![doc = "Main entry point for the Watch Pro application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use watchpro::cli::{Cli, Commands};
use watchpro::commands;
use watchpro::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!("Starting HTTP server");
            if let Some(b) = &bind {
                tracing::debug!("Using bind override: {}", b);
            }
            commands::serve::run_serve(config, bind).await?;
            Ok(())
        }
        Commands::Ask {
            question,
            chat,
            user,
            skip_inquiry,
        } => {
            tracing::info!("Starting single question mode");
            if let Some(c) = &chat {
                tracing::debug!("Continuing chat: {}", c);
            }
            commands::ask::run_ask(config, question, chat, user, skip_inquiry).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(&config, command).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins; otherwise `watchpro=info`, or `watchpro=debug` with
/// `--verbose`. Logs go to stderr, as JSON lines with `--json-logs`.
fn init_tracing(verbose: bool, json_logs: bool) {
    let default = if verbose {
        "watchpro=debug"
    } else {
        "watchpro=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
