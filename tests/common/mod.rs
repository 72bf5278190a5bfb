use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use watchpro::config::SearchConfig;
use watchpro::error::{Result, WatchProError};
use watchpro::providers::{CompletionResponse, FunctionCall, Message, Provider, ToolCall};
use watchpro::store::local::LocalStore;
use watchpro::store::KvStore;

#[allow(dead_code)]
pub fn create_temp_store() -> (Arc<dyn KvStore>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store = LocalStore::open(tmp.path().join("store")).expect("failed to open local store");
    (Arc::new(store), tmp)
}

#[allow(dead_code)]
pub fn search_config(api_base: &str) -> SearchConfig {
    SearchConfig {
        api_key: Some("tvly-test".to_string()),
        api_base: api_base.to_string(),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn text_reply(content: &str) -> Message {
    Message::assistant(content)
}

#[allow(dead_code)]
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

#[allow(dead_code)]
pub fn related_reply() -> Message {
    text_reply(
        r#"{"items":[{"query":"Omega Speedmaster 3861 vs 1861"},{"query":"Speedmaster Moonwatch sizing"},{"query":"Speedmaster service interval"}]}"#,
    )
}

/// Provider replaying scripted replies in order, recording transcripts
#[allow(dead_code)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Message>>,
    pub requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[serde_json::Value],
    ) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WatchProError::Provider("script exhausted".to_string()))?;
        Ok(CompletionResponse::new(reply))
    }
}
