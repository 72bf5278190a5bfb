/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `serve`   - Run the HTTP API
- `ask`     - Run the workflow once and print the streamed answer
- `history` - List, show and clear stored chats

Each handler opens the configured store, wires the library components
together, and closes the store before returning.
*/

use crate::agent::Workflow;
use crate::config::Config;
use crate::error::Result;
use crate::providers::create_provider;
use crate::storage::ChatStorage;
use crate::store::KvStore;
use crate::tools::{SearchClient, ToolRegistry};
use std::sync::Arc;

pub mod ask;
pub mod history;
pub mod serve;

/// Builds the workflow from configuration, persisting through `store`
///
/// # Errors
///
/// Returns error if the provider or the search client cannot be created,
/// for example because credentials are missing.
pub fn build_workflow(config: &Config, store: Arc<dyn KvStore>) -> Result<Workflow> {
    let provider = create_provider(&config.provider)?;
    let client = Arc::new(SearchClient::new(&config.search)?);
    let tools = ToolRegistry::research(client);
    tracing::debug!(
        "Workflow using provider {} with {} tools",
        config.provider.provider_type,
        tools.len()
    );

    Ok(Workflow::new(provider, tools, config.workflow.clone())
        .with_storage(ChatStorage::new(store)))
}
