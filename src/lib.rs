//! Watch Pro - conversational watch-domain assistant library
//!
//! This library answers watch questions by orchestrating model calls and
//! web search, streaming progress to the caller, and keeping chat history
//! in a key-value store.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `agent`: Orchestration workflow (classify, inquire, research, suggest)
//! - `providers`: Model provider abstraction and implementations (OpenAI, Ollama)
//! - `tools`: Tool registry and the `search`/`retrieve` tools
//! - `store`: Key-value store abstraction with hosted and local backends
//! - `storage`: Chat history persistence on top of the store
//! - `cache`: Search result cache and its optional sweeper
//! - `server`: HTTP API with SSE streaming
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use watchpro::agent::{Submission, Workflow};
//! use watchpro::providers::create_provider;
//! use watchpro::tools::{SearchClient, ToolRegistry};
//! use watchpro::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let provider = create_provider(&config.provider)?;
//!     let tools = ToolRegistry::research(Arc::new(SearchClient::new(&config.search)?));
//!     let workflow = Arc::new(Workflow::new(provider, tools, config.workflow.clone()));
//!
//!     let mut events = workflow.spawn(Submission::new("What is a GMT complication?"));
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod prompts;
pub mod providers;
pub mod server;
pub mod storage;
pub mod store;
pub mod tools;

// Re-export commonly used types
pub use agent::{Outcome, Submission, Workflow, WorkflowEvent};
pub use config::Config;
pub use error::{Result, WatchProError};

#[cfg(test)]
pub mod test_utils;
