//! Page retrieval tool
//!
//! Lets the researcher read a specific URL (for example a review the user
//! pasted) through the extraction API.

use crate::error::Result;
use crate::tools::search::SearchClient;
use crate::tools::{ToolExecutor, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct RetrieveArgs {
    url: String,
}

/// The `retrieve` tool exposed to the researcher
pub struct RetrieveTool {
    client: Arc<SearchClient>,
}

impl RetrieveTool {
    pub fn new(client: Arc<SearchClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for RetrieveTool {
    fn tool_definition(&self) -> Value {
        json!({
            "name": "retrieve",
            "description": "Retrieve the content of a web page given its URL",
            "parameters": {
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "The http(s) URL to retrieve"}
                },
                "required": ["url"]
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: RetrieveArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(ToolResult::error(format!("Invalid retrieve arguments: {}", e))),
        };

        let (results, truncated) = self.client.extract(&args.url).await;
        let mut result = results.into_tool_result();
        result.truncated = truncated;
        Ok(result)
    }
}
