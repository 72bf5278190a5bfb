//! Tools module for Watch Pro
//!
//! This module contains the tool executor abstraction, the tool registry,
//! and the research tools (`search`, `retrieve`) the researcher may call.

pub mod retrieve;
pub mod search;

pub use retrieve::RetrieveTool;
pub use search::{SearchArgs, SearchClient, SearchResults, SearchTool};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Tool result structure
///
/// Represents the result of a tool execution with metadata.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Whether the tool execution succeeded
    pub success: bool,
    /// Output from the tool (JSON for the research tools)
    pub output: String,
    /// Error message if execution failed
    pub error: Option<String>,
    /// Whether the output was cut to a size limit
    pub truncated: bool,
    /// Additional metadata about the execution
    pub metadata: HashMap<String, String>,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
            truncated: false,
            metadata: HashMap::new(),
        }
    }

    /// Create a failed tool result
    pub fn error(error: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
            truncated: false,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the result
    pub fn with_metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Convert to a message string for the model transcript
    ///
    /// Failed results carry the error text so the model can recover.
    pub fn to_message(&self) -> String {
        if self.success {
            if self.truncated {
                format!("{}\n(Content truncated)", self.output)
            } else {
                self.output.clone()
            }
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            )
        }
    }

    /// Output as JSON, falling back to a JSON string
    ///
    /// Failed results without output become `{"error": ...}`.
    pub fn to_json(&self) -> serde_json::Value {
        if self.output.is_empty() {
            if let Some(error) = &self.error {
                return serde_json::json!({ "error": error });
            }
        }
        serde_json::from_str(&self.output)
            .unwrap_or_else(|_| serde_json::Value::String(self.output.clone()))
    }
}

/// Cut `text` to at most `max_chars` characters
///
/// Returns the (possibly shortened) text and whether anything was cut.
///
/// # Examples
///
/// ```
/// use watchpro::tools::truncate_chars;
///
/// assert_eq!(truncate_chars("Chronograph", 5), ("Chron".to_string(), true));
/// assert_eq!(truncate_chars("GMT", 5), ("GMT".to_string(), false));
/// ```
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Tool executor trait for implementing tool execution logic
///
/// # Examples
///
/// ```no_run
/// use watchpro::tools::{ToolExecutor, ToolResult};
/// use watchpro::error::Result;
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct ClockTool;
///
/// #[async_trait]
/// impl ToolExecutor for ClockTool {
///     fn tool_definition(&self) -> Value {
///         serde_json::json!({
///             "name": "clock",
///             "description": "Current UTC time",
///             "parameters": {"type": "object", "properties": {}}
///         })
///     }
///
///     async fn execute(&self, _args: Value) -> Result<ToolResult> {
///         Ok(ToolResult::success(chrono::Utc::now().to_rfc3339()))
///     }
/// }
/// ```
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Returns the tool definition as `{name, description, parameters}`
    fn tool_definition(&self) -> serde_json::Value;

    /// Executes the tool with the given arguments
    ///
    /// # Errors
    ///
    /// Returns error only for failures the caller cannot recover from;
    /// recoverable failures are reported through [`ToolResult::error`].
    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult>;
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with the `search` and `retrieve` tools sharing one client
    pub fn research(client: Arc<SearchClient>) -> Self {
        let mut registry = Self::new();
        registry.register("search", Arc::new(SearchTool::new(client.clone())));
        registry.register("retrieve", Arc::new(RetrieveTool::new(client)));
        registry
    }

    /// Register a tool executor in the registry
    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn ToolExecutor>) {
        self.tools.insert(name.into(), executor);
    }

    /// Get a tool executor by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.tools.get(name).cloned()
    }

    /// All tool definitions, ordered by tool name
    pub fn all_definitions(&self) -> Vec<serde_json::Value> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.tools[name].tool_definition())
            .collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
