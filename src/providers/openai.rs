//! OpenAI-compatible provider implementation for Watch Pro
//!
//! Talks to any service exposing the `/chat/completions` API (OpenAI itself,
//! Azure-style gateways, local proxies). Supports tool calling and SSE
//! streaming of text deltas.

use crate::config::OpenAiConfig;
use crate::error::{Result, WatchProError};
use crate::providers::stream::SseDecoder;
use crate::providers::{CompletionResponse, FunctionCall, Message, Provider, TokenUsage, ToolCall};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// OpenAI-compatible chat completions provider
///
/// # Examples
///
/// ```
/// use watchpro::config::OpenAiConfig;
/// use watchpro::providers::{OpenAiProvider, Provider};
///
/// let config = OpenAiConfig {
///     api_key: Some("sk-test".to_string()),
///     ..Default::default()
/// };
/// let provider = OpenAiProvider::new(config).unwrap();
/// assert_eq!(provider.get_current_model().unwrap(), "gpt-4o");
/// ```
pub struct OpenAiProvider {
    client: Client,
    completions_url: String,
    api_key: String,
    model: String,
}

/// Request structure for the chat completions API
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// Message structure for the chat completions API
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// Tool definition
#[derive(Debug, Serialize)]
struct ChatTool {
    r#type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// Tool call in wire format
#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(default = "default_tool_type")]
    r#type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// Non-streaming response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// One streamed chunk
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Assembles a complete assistant message from streamed chunks
///
/// Tool calls arrive as fragments keyed by index: the first fragment carries
/// the id and name, later ones append to the argument string.
#[derive(Debug, Default)]
struct StreamAccumulator {
    content: String,
    tool_calls: BTreeMap<usize, (String, String, String)>,
    usage: Option<TokenUsage>,
}

impl StreamAccumulator {
    /// Apply a chunk, returning its text delta if any
    fn apply(&mut self, chunk: ChatChunk) -> Option<String> {
        if let Some(usage) = chunk.usage {
            self.usage = Some(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        let mut text = String::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                text.push_str(&content);
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let entry = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    entry.0 = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.1.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.2.push_str(&arguments);
                    }
                }
            }
        }

        self.content.push_str(&text);
        (!text.is_empty()).then_some(text)
    }

    fn into_response(self) -> CompletionResponse {
        let message = if self.tool_calls.is_empty() {
            Message::assistant(self.content)
        } else {
            let calls = self
                .tool_calls
                .into_iter()
                .map(|(index, (id, name, arguments))| ToolCall {
                    id: if id.is_empty() {
                        format!("call_{}", index)
                    } else {
                        id
                    },
                    function: FunctionCall {
                        name,
                        arguments: if arguments.is_empty() {
                            "{}".to_string()
                        } else {
                            arguments
                        },
                    },
                })
                .collect();
            Message::assistant_with_tools(Some(self.content), calls)
        };

        match self.usage {
            Some(usage) => CompletionResponse::with_usage(message, usage),
            None => CompletionResponse::new(message),
        }
    }
}

impl OpenAiProvider {
    /// Create a new provider instance
    ///
    /// # Errors
    ///
    /// Returns `WatchProError::MissingCredentials` when no API key is
    /// configured, or an error if HTTP client initialization fails.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| WatchProError::MissingCredentials("provider.openai.api_key".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("watchpro/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WatchProError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized OpenAI-compatible provider: base={}, model={}",
            config.api_base,
            config.model
        );

        Ok(Self {
            client,
            completions_url: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model,
        })
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        stream: bool,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: self.convert_messages(messages),
            tools: self.convert_tools(tools),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    /// Convert messages to wire format
    fn convert_messages(&self, messages: &[Message]) -> Vec<ChatMessage> {
        crate::providers::validate_message_sequence(messages)
            .into_iter()
            .filter(|m| m.content.is_some() || m.tool_calls.is_some())
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
                tool_calls: m.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .map(|tc| ChatToolCall {
                            id: tc.id,
                            r#type: default_tool_type(),
                            function: ChatFunctionCall {
                                name: tc.function.name,
                                arguments: tc.function.arguments,
                            },
                        })
                        .collect()
                }),
                tool_call_id: m.tool_call_id,
            })
            .collect()
    }

    /// Convert tool schemas to wire format
    fn convert_tools(&self, tools: &[serde_json::Value]) -> Vec<ChatTool> {
        tools
            .iter()
            .filter_map(|t| {
                let obj = t.as_object()?;
                Some(ChatTool {
                    r#type: default_tool_type(),
                    function: ChatFunction {
                        name: obj.get("name")?.as_str()?.to_string(),
                        description: obj.get("description")?.as_str()?.to_string(),
                        parameters: obj.get("parameters")?.clone(),
                    },
                })
            })
            .collect()
    }

    /// Convert a response message back to the common format
    fn convert_response_message(&self, message: ChatMessage) -> Message {
        match message.tool_calls {
            Some(calls) if !calls.is_empty() => Message::assistant_with_tools(
                message.content,
                calls
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: tc.id,
                        function: FunctionCall {
                            name: tc.function.name,
                            arguments: tc.function.arguments,
                        },
                    })
                    .collect(),
            ),
            _ => Message::assistant(message.content.unwrap_or_default()),
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        tracing::debug!(
            "Sending chat completion request: {} messages, {} tools, stream={}",
            request.messages.len(),
            request.tools.len(),
            request.stream
        );

        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Chat completion request failed: {}", e);
                WatchProError::Provider(format!("Chat completion request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Chat completion returned error {}: {}", status, error_text);
            return Err(WatchProError::Provider(format!(
                "Chat completion returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<CompletionResponse> {
        let request = self.build_request(messages, tools, false);
        let response = self.send(&request).await?;
        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse chat completion response: {}", e);
            WatchProError::Provider(format!("Failed to parse chat completion response: {}", e))
        })?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| WatchProError::Provider("No choices in chat completion".to_string()))?;

        let message = self.convert_response_message(choice.message);
        Ok(match chat_response.usage {
            Some(u) => CompletionResponse::with_usage(
                message,
                TokenUsage::new(u.prompt_tokens, u.completion_tokens),
            ),
            None => CompletionResponse::new(message),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        deltas: mpsc::UnboundedSender<String>,
    ) -> Result<CompletionResponse> {
        let request = self.build_request(messages, tools, true);
        let response = self.send(&request).await?;
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut accumulator = StreamAccumulator::default();

        let handle_payload = |payload: String, acc: &mut StreamAccumulator| -> Result<bool> {
            if payload.trim() == "[DONE]" {
                return Ok(true);
            }
            let chunk: ChatChunk = serde_json::from_str(&payload).map_err(|e| {
                WatchProError::Provider(format!("Malformed stream chunk: {}", e))
            })?;
            if let Some(text) = acc.apply(chunk) {
                let _ = deltas.send(text);
            }
            Ok(false)
        };

        'outer: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::error!("Chat completion stream interrupted: {}", e);
                WatchProError::Provider(format!("Chat completion stream interrupted: {}", e))
            })?;
            for payload in decoder.push(&chunk) {
                if handle_payload(payload, &mut accumulator)? {
                    break 'outer;
                }
            }
        }
        if let Some(payload) = decoder.finish() {
            handle_payload(payload, &mut accumulator)?;
        }

        tracing::debug!(
            "Chat completion stream finished: {} chars, {} tool calls",
            accumulator.content.len(),
            accumulator.tool_calls.len()
        );
        Ok(accumulator.into_response())
    }

    fn get_current_model(&self) -> Result<String> {
        Ok(self.model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            api_base: base.to_string(),
            model: "gpt-test".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_new_requires_api_key() {
        let err = OpenAiProvider::new(OpenAiConfig::default()).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<WatchProError>(),
            Some(WatchProError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_convert_tools() {
        let p = provider("http://localhost");
        let tools = vec![
            json!({"name": "search", "description": "Search the web", "parameters": {"type": "object"}}),
            json!({"bogus": true}),
        ];
        let converted = p.convert_tools(&tools);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].function.name, "search");
    }

    #[test]
    fn test_stream_accumulator_assembles_tool_calls() {
        let mut acc = StreamAccumulator::default();
        let chunks = [
            json!({"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"search","arguments":""}}]}}]}),
            json!({"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":"}}]}}]}),
            json!({"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"seiko\"}"}}]}}]}),
        ];
        for chunk in chunks {
            assert!(acc.apply(serde_json::from_value(chunk).unwrap()).is_none());
        }
        let message = acc.into_response().message;
        let calls = message.tool_calls.unwrap();
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "search");
        assert_eq!(calls[0].function.arguments, r#"{"query":"seiko"}"#);
    }

    #[tokio::test]
    async fn test_complete_parses_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-test", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "c1", "type": "function",
                        "function": {"name": "search", "arguments": "{\"query\":\"omega\"}"}}]
                }}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server.uri())
            .complete(&[Message::user("omega?")], &[])
            .await
            .unwrap();
        assert!(response.message.has_tool_calls());
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_complete_stream_forwards_deltas() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"The \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Speedmaster\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2}}\n\n",
            "data: [DONE]\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let response = provider(&server.uri())
            .complete_stream(&[Message::user("q")], &[], tx)
            .await
            .unwrap();

        assert_eq!(response.message.text(), "The Speedmaster");
        assert_eq!(response.usage.unwrap().total_tokens, 7);
        assert_eq!(rx.recv().await.as_deref(), Some("The "));
        assert_eq!(rx.recv().await.as_deref(), Some("Speedmaster"));
    }

    #[tokio::test]
    async fn test_complete_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .complete(&[Message::user("q")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
