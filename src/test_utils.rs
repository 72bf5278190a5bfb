//! Test utilities for Watch Pro
//!
//! This module provides common test utilities: temporary stores, a scripted
//! model provider, canned tools, and assertion helpers.

use crate::error::{Result, WatchProError};
use crate::providers::{CompletionResponse, FunctionCall, Message, Provider, ToolCall};
use crate::store::{local::LocalStore, KvStore};
use crate::tools::{ToolExecutor, ToolResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Open a local store in a fresh temporary directory
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub fn temp_store() -> (Arc<dyn KvStore>, TempDir) {
    let dir = temp_dir();
    let store = LocalStore::open(dir.path().join("store")).expect("Failed to open local store");
    (Arc::new(store), dir)
}

/// Assert that an error's message contains the expected text
pub fn assert_error_contains<T: std::fmt::Debug>(result: Result<T>, expected: &str) {
    match result {
        Ok(value) => panic!(
            "Expected error containing '{}' but got Ok({:?})",
            expected, value
        ),
        Err(e) => {
            let error_msg = format!("{:#}", e);
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Assistant reply carrying only text
pub fn text_reply(content: &str) -> Message {
    Message::assistant(content)
}

/// Assistant reply requesting one tool call
pub fn tool_call_reply(id: &str, name: &str, arguments: &str) -> Message {
    Message::assistant_with_tools(
        None,
        vec![ToolCall {
            id: id.to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }],
    )
}

/// Provider that answers with a fixed list of replies, in order
///
/// Records every transcript and the number of tools offered per call.
/// Fails once the script is exhausted. Streaming splits text on spaces.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Message>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
    tool_counts: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
            tool_counts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Transcripts received so far
    pub fn requests(&self) -> Arc<Mutex<Vec<Vec<Message>>>> {
        Arc::clone(&self.requests)
    }

    /// Number of tool definitions offered on each call
    pub fn tool_counts(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.tool_counts)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.tool_counts.lock().unwrap().push(tools.len());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WatchProError::Provider("script exhausted".to_string()))?;
        Ok(CompletionResponse::new(reply))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        deltas: mpsc::UnboundedSender<String>,
    ) -> Result<CompletionResponse> {
        let response = self.complete(messages, tools).await?;
        for piece in response.message.text().split_inclusive(' ') {
            let _ = deltas.send(piece.to_string());
        }
        Ok(response)
    }

    fn get_current_model(&self) -> Result<String> {
        Ok("scripted".to_string())
    }
}

/// Tool that always succeeds with a fixed output
pub struct StaticTool {
    name: String,
    output: String,
}

impl StaticTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            output: output.to_string(),
        }
    }
}

#[async_trait]
impl ToolExecutor for StaticTool {
    fn tool_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": "Canned test tool",
            "parameters": {"type": "object", "properties": {}}
        })
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<ToolResult> {
        Ok(ToolResult::success(self.output.clone()))
    }
}

/// Create a test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
provider:
  type: ollama
  ollama:
    host: http://localhost:11434
    model: llama3.2:latest

search:
  api_key: tvly-test
  max_content_chars: 10000

store:
  backend: local
  local_path: /tmp/watchpro-test

workflow:
  max_research_steps: 5
  max_history_messages: 10
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_temp_store_is_usable() {
        let (store, _dir) = temp_store();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<()> = Err(WatchProError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[tokio::test]
    async fn test_scripted_provider_order_and_exhaustion() {
        let provider = ScriptedProvider::new(vec![text_reply("one"), text_reply("two")]);
        assert_eq!(
            provider.complete(&[], &[]).await.unwrap().message.text(),
            "one"
        );
        assert_eq!(
            provider.complete(&[], &[]).await.unwrap().message.text(),
            "two"
        );
        assert!(provider.complete(&[], &[]).await.is_err());
        assert_eq!(provider.requests().lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_provider_streams_words() {
        let provider = ScriptedProvider::new(vec![text_reply("Sapphire crystal glass")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        provider.complete_stream(&[], &[], tx).await.unwrap();

        let mut pieces = Vec::new();
        while let Some(piece) = rx.recv().await {
            pieces.push(piece);
        }
        assert_eq!(pieces, vec!["Sapphire ", "crystal ", "glass"]);
    }

    #[test]
    fn test_test_config_yaml() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert_eq!(config.provider.provider_type, "ollama");
        assert!(config.validate().is_ok());
    }
}
