//! Ollama provider implementation for Watch Pro
//!
//! This module implements the Provider trait for Ollama, connecting to a local
//! or remote Ollama server to generate completions with tool calling support.
//! Streaming responses are newline-delimited JSON objects.

use crate::config::OllamaConfig;
use crate::error::{Result, WatchProError};
use crate::providers::stream::LineDecoder;
use crate::providers::{CompletionResponse, FunctionCall, Message, Provider, TokenUsage, ToolCall};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Ollama API provider
///
/// # Examples
///
/// ```no_run
/// use watchpro::config::OllamaConfig;
/// use watchpro::providers::{OllamaProvider, Provider, Message};
///
/// # async fn example() -> watchpro::error::Result<()> {
/// let config = OllamaConfig {
///     host: "http://localhost:11434".to_string(),
///     model: "llama3.2:latest".to_string(),
/// };
/// let provider = OllamaProvider::new(config)?;
/// let messages = vec![Message::user("Who makes the Reverso?")];
/// let completion = provider.complete(&messages, &[]).await?;
/// # Ok(())
/// # }
/// ```
pub struct OllamaProvider {
    client: Client,
    chat_url: String,
    config: OllamaConfig,
}

/// Request structure for Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
}

/// Message structure for Ollama API
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

/// Tool definition for Ollama API
#[derive(Debug, Serialize)]
struct OllamaTool {
    r#type: String,
    function: OllamaFunction,
}

/// Function definition for Ollama tools
#[derive(Debug, Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// Tool call in Ollama format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "default_tool_type")]
    r#type: String,
    function: OllamaFunctionCall,
}

/// Function call details in Ollama format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Default type for tool calls (used when field is missing)
fn default_tool_type() -> String {
    "function".to_string()
}

/// Response structure from Ollama API (also one streamed line)
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
}

impl OllamaProvider {
    /// Create a new Ollama provider instance
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    ///
    /// # Examples
    ///
    /// ```
    /// use watchpro::config::OllamaConfig;
    /// use watchpro::providers::OllamaProvider;
    ///
    /// let provider = OllamaProvider::new(OllamaConfig::default());
    /// assert!(provider.is_ok());
    /// ```
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("watchpro/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WatchProError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Ollama provider: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self {
            client,
            chat_url: format!("{}/api/chat", config.host.trim_end_matches('/')),
            config,
        })
    }

    /// Configured Ollama host
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Convert messages to Ollama format
    fn convert_messages(&self, messages: &[Message]) -> Vec<OllamaMessage> {
        crate::providers::validate_message_sequence(messages)
            .iter()
            .filter_map(|m| {
                if m.content.is_none() && m.tool_calls.is_none() {
                    return None;
                }

                let tool_calls = m.tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|tc| OllamaToolCall {
                            id: tc.id.clone(),
                            r#type: default_tool_type(),
                            function: OllamaFunctionCall {
                                name: tc.function.name.clone(),
                                arguments: serde_json::from_str(&tc.function.arguments)
                                    .unwrap_or(serde_json::Value::Object(serde_json::Map::new())),
                            },
                        })
                        .collect()
                });

                Some(OllamaMessage {
                    role: m.role.clone(),
                    content: m.content.clone().unwrap_or_default(),
                    tool_calls,
                })
            })
            .collect()
    }

    /// Convert tool schemas to Ollama format
    fn convert_tools(&self, tools: &[serde_json::Value]) -> Vec<OllamaTool> {
        tools
            .iter()
            .filter_map(|t| {
                let obj = t.as_object()?;
                Some(OllamaTool {
                    r#type: default_tool_type(),
                    function: OllamaFunction {
                        name: obj.get("name")?.as_str()?.to_string(),
                        description: obj.get("description")?.as_str()?.to_string(),
                        parameters: obj.get("parameters")?.clone(),
                    },
                })
            })
            .collect()
    }

    /// Convert tool calls reported by Ollama, inventing ids where missing
    fn convert_tool_calls(calls: Vec<OllamaToolCall>, offset: usize) -> Vec<ToolCall> {
        calls
            .into_iter()
            .enumerate()
            .map(|(idx, tc)| ToolCall {
                id: if tc.id.is_empty() {
                    let nonce = uuid::Uuid::new_v4().simple().to_string();
                    format!("call_{}_{}", &nonce[..8], offset + idx)
                } else {
                    tc.id
                },
                function: FunctionCall {
                    name: tc.function.name,
                    arguments: serde_json::to_string(&tc.function.arguments)
                        .unwrap_or_else(|_| "{}".to_string()),
                },
            })
            .collect()
    }

    /// Convert Ollama response message back to the common format
    fn convert_response_message(&self, ollama_msg: OllamaMessage) -> Message {
        match ollama_msg.tool_calls {
            Some(calls) if !calls.is_empty() => Message::assistant_with_tools(
                Some(ollama_msg.content),
                Self::convert_tool_calls(calls, 0),
            ),
            _ => Message::assistant(ollama_msg.content),
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        stream: bool,
    ) -> OllamaRequest {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            messages: self.convert_messages(messages),
            tools: self.convert_tools(tools),
            stream,
        };

        tracing::debug!(
            "Sending Ollama request: {} messages, {} tools, stream={}",
            request.messages.len(),
            request.tools.len(),
            stream
        );
        request
    }

    async fn send(&self, request: &OllamaRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.chat_url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Ollama request failed: {}", e);
                WatchProError::Provider(format!("Ollama request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            return Err(WatchProError::Provider(format!(
                "Ollama returned error {}: {}",
                status, error_text
            ))
            .into());
        }
        Ok(response)
    }
}

fn usage_of(response: &OllamaResponse) -> Option<TokenUsage> {
    (response.prompt_eval_count > 0 || response.eval_count > 0)
        .then(|| TokenUsage::new(response.prompt_eval_count, response.eval_count))
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<CompletionResponse> {
        let request = self.build_request(messages, tools, false);
        let response = self.send(&request).await?;

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Ollama response: {}", e);
            WatchProError::Provider(format!("Failed to parse Ollama response: {}", e))
        })?;

        tracing::debug!(
            "Ollama response: done={}, prompt_tokens={}, completion_tokens={}",
            ollama_response.done,
            ollama_response.prompt_eval_count,
            ollama_response.eval_count
        );

        let usage = usage_of(&ollama_response);
        let message = self.convert_response_message(ollama_response.message);
        Ok(match usage {
            Some(u) => CompletionResponse::with_usage(message, u),
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
        let mut decoder = LineDecoder::new();
        let mut content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut usage = None;

        let mut handle_line = |line: String| -> Result<bool> {
            let part: OllamaResponse = serde_json::from_str(&line).map_err(|e| {
                WatchProError::Provider(format!("Malformed Ollama stream line: {}", e))
            })?;
            if !part.message.content.is_empty() {
                content.push_str(&part.message.content);
                let _ = deltas.send(part.message.content.clone());
            }
            if part.done {
                usage = usage_of(&part);
            }
            if let Some(calls) = part.message.tool_calls {
                let offset = tool_calls.len();
                tool_calls.extend(Self::convert_tool_calls(calls, offset));
            }
            Ok(part.done)
        };

        'outer: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::error!("Ollama stream interrupted: {}", e);
                WatchProError::Provider(format!("Ollama stream interrupted: {}", e))
            })?;
            for line in decoder.push(&chunk) {
                if handle_line(line)? {
                    break 'outer;
                }
            }
        }
        if let Some(line) = decoder.finish() {
            handle_line(line)?;
        }

        let message = if tool_calls.is_empty() {
            Message::assistant(content)
        } else {
            Message::assistant_with_tools(Some(content), tool_calls)
        };
        Ok(match usage {
            Some(u) => CompletionResponse::with_usage(message, u),
            None => CompletionResponse::new(message),
        })
    }

    fn get_current_model(&self) -> Result<String> {
        Ok(self.config.model.clone())
    }
}
