//! Base provider trait and common types for Watch Pro
//!
//! This module defines the Provider trait that all model providers must
//! implement, along with the message types exchanged with them.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Message structure for conversation
///
/// Represents a message in the conversation with the model provider.
/// Messages can be from the user, assistant, system, or tool results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system, tool)
    pub role: String,
    /// Content of the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Optional tool calls in the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Optional tool call ID (for tool result messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use watchpro::providers::Message;
    ///
    /// let msg = Message::user("Is the Submariner waterproof?");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a tool result message answering `tool_call_id`
    ///
    /// # Examples
    ///
    /// ```
    /// use watchpro::providers::Message;
    ///
    /// let msg = Message::tool_result("call_123", "{\"results\":[]}");
    /// assert_eq!(msg.role, "tool");
    /// assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    /// ```
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Creates an assistant message that requests tool calls
    ///
    /// Any text the model produced alongside the calls is kept in `content`.
    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.filter(|c| !c.is_empty()),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Text content, or an empty string
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Whether the message requests at least one tool call
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

/// Function call information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function/tool to call
    pub name: String,
    /// Arguments for the function (as JSON string)
    pub arguments: String,
}

/// Tool call structure
///
/// Represents a request from the model to execute a tool with specific arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Function call details
    pub function: FunctionCall,
}

/// Token usage information from a completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Examples
    ///
    /// ```
    /// use watchpro::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Completion response with message and optional token usage
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The response message from the model
    pub message: Message,
    /// Optional token usage information
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Create a new CompletionResponse
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
        }
    }

    /// Create a new CompletionResponse with token usage
    pub fn with_usage(message: Message, usage: TokenUsage) -> Self {
        Self {
            message,
            usage: Some(usage),
        }
    }
}

/// Provider trait for model providers
///
/// All model providers (OpenAI-compatible, Ollama) implement this trait.
///
/// # Examples
///
/// ```no_run
/// use watchpro::providers::{Provider, Message, CompletionResponse};
/// use watchpro::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     async fn complete(
///         &self,
///         messages: &[Message],
///         _tools: &[serde_json::Value],
///     ) -> Result<CompletionResponse> {
///         let last = messages.last().map(|m| m.text().to_string()).unwrap_or_default();
///         Ok(CompletionResponse::new(Message::assistant(last)))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Completes a conversation with the given messages and available tools
    ///
    /// # Arguments
    ///
    /// * `messages` - Conversation history
    /// * `tools` - Tool definitions (`{name, description, parameters}`)
    ///
    /// # Errors
    ///
    /// Returns error if the API call fails or the response is invalid
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<CompletionResponse>;

    /// Completes a conversation, forwarding text deltas as they arrive
    ///
    /// The returned response carries the full message, identical to what
    /// [`Provider::complete`] would return. A closed `deltas` receiver does
    /// not abort the completion.
    ///
    /// # Default Implementation
    ///
    /// Calls [`Provider::complete`] and forwards the whole content as a
    /// single delta.
    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        deltas: mpsc::UnboundedSender<String>,
    ) -> Result<CompletionResponse> {
        let response = self.complete(messages, tools).await?;
        if let Some(content) = response.message.content.as_ref().filter(|c| !c.is_empty()) {
            let _ = deltas.send(content.clone());
        }
        Ok(response)
    }

    /// Get the name of the currently active model
    ///
    /// # Default Implementation
    ///
    /// The default implementation returns an error.
    fn get_current_model(&self) -> Result<String> {
        Err(crate::error::WatchProError::Provider(
            "Current model information is not available from this provider".to_string(),
        )
        .into())
    }
}

/// Validates message sequence and removes orphan tool messages
///
/// An orphan tool message is one with role="tool" that has no
/// `tool_call_id`, or whose id does not match a tool call requested by a
/// preceding assistant message. Providers reject such sequences.
///
/// # Examples
///
/// ```
/// use watchpro::providers::{Message, validate_message_sequence};
///
/// let messages = vec![
///     Message::user("Do something"),
///     Message::tool_result("call_123", "Result"),
/// ];
/// let validated = validate_message_sequence(&messages);
/// assert_eq!(validated.len(), 1);
/// ```
pub fn validate_message_sequence(messages: &[Message]) -> Vec<Message> {
    use std::collections::HashSet;

    let mut seen_tool_ids: HashSet<&str> = HashSet::new();
    let mut validated = Vec::with_capacity(messages.len());

    for message in messages {
        if message.role == "assistant" {
            if let Some(tool_calls) = &message.tool_calls {
                seen_tool_ids.extend(tool_calls.iter().map(|tc| tc.id.as_str()));
            }
        }

        if message.role == "tool" {
            match &message.tool_call_id {
                Some(id) if seen_tool_ids.contains(id.as_str()) => {}
                Some(id) => {
                    tracing::warn!("Dropping orphan tool message with tool_call_id: {}", id);
                    continue;
                }
                None => {
                    tracing::warn!("Dropping tool message without tool_call_id");
                    continue;
                }
            }
        }

        validated.push(message.clone());
    }

    validated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            function: FunctionCall {
                name: "search".to_string(),
                arguments: r#"{"query":"seiko"}"#.to_string(),
            },
        }
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::user("a").role, "user");
        assert_eq!(Message::assistant("a").role, "assistant");
        assert_eq!(Message::system("a").role, "system");
        assert_eq!(Message::user("a").text(), "a");
    }

    #[test]
    fn test_assistant_with_tools_drops_empty_content() {
        let msg = Message::assistant_with_tools(Some(String::new()), vec![call("c1")]);
        assert!(msg.content.is_none());
        assert!(msg.has_tool_calls());
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn test_token_usage_new() {
        let usage = TokenUsage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_validate_message_sequence_drops_orphan_tool() {
        let messages = vec![Message::user("q"), Message::tool_result("missing", "r")];
        assert_eq!(validate_message_sequence(&messages).len(), 1);
    }

    #[test]
    fn test_validate_message_sequence_preserves_valid_pair() {
        let messages = vec![
            Message::user("q"),
            Message::assistant_with_tools(None, vec![call("c1")]),
            Message::tool_result("c1", "r"),
        ];
        assert_eq!(validate_message_sequence(&messages).len(), 3);
    }

    #[test]
    fn test_validate_message_sequence_drops_tool_before_call() {
        let messages = vec![
            Message::tool_result("c1", "r"),
            Message::assistant_with_tools(None, vec![call("c1")]),
        ];
        assert_eq!(validate_message_sequence(&messages).len(), 1);
    }

    struct FixedProvider;

    #[async_trait]
    impl Provider for FixedProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[serde_json::Value],
        ) -> Result<CompletionResponse> {
            Ok(CompletionResponse::new(Message::assistant("fixed")))
        }
    }

    #[tokio::test]
    async fn test_default_complete_stream_forwards_content() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let response = FixedProvider.complete_stream(&[], &[], tx).await.unwrap();
        assert_eq!(response.message.text(), "fixed");
        assert_eq!(rx.recv().await.as_deref(), Some("fixed"));
    }

    #[test]
    fn test_default_get_current_model_error() {
        assert!(FixedProvider.get_current_model().is_err());
    }
}
