//! Web search tool and the upstream search API client
//!
//! The client talks to a Tavily-compatible API: `POST {base}/search` for
//! ranked results with images and `POST {base}/extract` for the raw content
//! of a page. Upstream failures never surface as errors; they produce an
//! empty result set with its `error` field set.

use crate::config::SearchConfig;
use crate::error::{Result, WatchProError};
use crate::tools::{ToolExecutor, ToolResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Queries shorter than this are padded with spaces before being sent
pub const MIN_QUERY_CHARS: usize = 5;

/// Upper bound on requested results
pub const MAX_RESULTS_CAP: i64 = 20;

const DEFAULT_MAX_RESULTS: i64 = 10;

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// An image returned alongside search results
///
/// Upstream sends either a bare URL or an object with a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchImage {
    Url(String),
    Described {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl SearchImage {
    /// Image URL regardless of shape
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Described { url, .. } => url,
        }
    }
}

/// Result set handed to the model and the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<SearchResultItem>,
    pub images: Vec<SearchImage>,
    pub number_of_results: usize,
    /// Set when the result set is empty because upstream failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResults {
    /// An empty, successful result set
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            results: Vec::new(),
            images: Vec::new(),
            number_of_results: 0,
            error: None,
        }
    }

    /// An empty result set flagged with an upstream failure
    pub fn degraded(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(query)
        }
    }

    /// Whether the set was produced by a failure
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Wrap as a tool result; degraded sets become failed results
    pub fn into_tool_result(self) -> ToolResult {
        let output = serde_json::to_string(&self).unwrap_or_default();
        let result = match &self.error {
            Some(error) => {
                let mut result = ToolResult::error(error.clone());
                result.output = output;
                result
            }
            None => ToolResult::success(output),
        };
        result.with_metadata(
            "number_of_results".to_string(),
            self.number_of_results.to_string(),
        )
    }
}

/// Search depth requested from upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }
}

fn default_max_results() -> i64 {
    DEFAULT_MAX_RESULTS
}

/// Arguments of the `search` tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: i64,
    #[serde(default)]
    pub search_depth: SearchDepth,
    #[serde(default)]
    pub include_domains: Vec<String>,
    #[serde(default)]
    pub exclude_domains: Vec<String>,
}

impl SearchArgs {
    /// Arguments with defaults for everything but the query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: DEFAULT_MAX_RESULTS,
            search_depth: SearchDepth::default(),
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
        }
    }
}

/// Pad a query with trailing spaces to the upstream minimum length
///
/// # Examples
///
/// ```
/// use watchpro::tools::search::pad_query;
///
/// assert_eq!(pad_query("IWC"), "IWC  ");
/// assert_eq!(pad_query("Patek Philippe"), "Patek Philippe");
/// ```
pub fn pad_query(query: &str) -> String {
    let len = query.chars().count();
    if len >= MIN_QUERY_CHARS {
        return query.to_string();
    }
    format!("{}{}", query, " ".repeat(MIN_QUERY_CHARS - len))
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: String,
    max_results: i64,
    search_depth: &'static str,
    include_images: bool,
    include_domains: &'a [String],
    exclude_domains: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResultItem>,
    #[serde(default)]
    images: Vec<SearchImage>,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    api_key: &'a str,
    urls: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    results: Vec<ExtractedPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractedPage {
    url: String,
    #[serde(default)]
    raw_content: String,
}

/// Client for the upstream search and extraction API
pub struct SearchClient {
    client: Client,
    api_base: String,
    api_key: String,
    max_content_chars: usize,
}

impl SearchClient {
    /// Create a client from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Search section holding the API key, base URL and content cap
    ///
    /// # Errors
    ///
    /// Returns `WatchProError::MissingCredentials` when no API key is
    /// configured, or an error if HTTP client initialization fails.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| WatchProError::MissingCredentials("search.api_key".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("watchpro/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WatchProError::Search(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized search client: base={}", config.api_base);

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            max_content_chars: config.max_content_chars,
        })
    }

    /// Run a web search
    ///
    /// `max_results <= 0` returns an empty set without contacting upstream.
    ///
    /// # Examples
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// use watchpro::config::SearchConfig;
    /// use watchpro::tools::search::{SearchArgs, SearchClient};
    ///
    /// let config = SearchConfig {
    ///     api_key: Some("tvly-test".to_string()),
    ///     ..Default::default()
    /// };
    /// let client = SearchClient::new(&config).unwrap();
    ///
    /// let mut args = SearchArgs::new("Seiko Presage");
    /// args.max_results = 0;
    /// let results = client.search(&args).await;
    /// assert_eq!(results.number_of_results, 0);
    /// assert!(!results.is_degraded());
    /// # });
    /// ```
    pub async fn search(&self, args: &SearchArgs) -> SearchResults {
        if args.max_results <= 0 {
            tracing::debug!("Skipping search for {:?}: max_results <= 0", args.query);
            return SearchResults::empty(&args.query);
        }

        let request = SearchRequest {
            api_key: &self.api_key,
            query: pad_query(&args.query),
            max_results: args.max_results.min(MAX_RESULTS_CAP),
            search_depth: args.search_depth.as_str(),
            include_images: true,
            include_domains: &args.include_domains,
            exclude_domains: &args.exclude_domains,
        };

        tracing::debug!(
            "Searching: query={:?}, max_results={}, depth={}",
            request.query,
            request.max_results,
            request.search_depth
        );

        match self.post::<_, SearchResponse>("search", &request).await {
            Ok(response) => SearchResults {
                query: args.query.clone(),
                number_of_results: response.results.len(),
                results: response.results,
                images: response.images,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Search for {:?} failed: {}", args.query, e);
                SearchResults::degraded(&args.query, e.to_string())
            }
        }
    }

    /// Fetch the raw content of one page as a one-item result set
    ///
    /// Content is capped at `search.max_content_chars` characters;
    /// the flag reports whether the cap was applied.
    pub async fn extract(&self, url: &str) -> (SearchResults, bool) {
        if let Err(e) = validate_url(url) {
            tracing::warn!("Refusing to retrieve {:?}: {}", url, e);
            return (SearchResults::degraded(url, e.to_string()), false);
        }

        let request = ExtractRequest {
            api_key: &self.api_key,
            urls: vec![url],
        };

        let response = match self.post::<_, ExtractResponse>("extract", &request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Extraction of {} failed: {}", url, e);
                return (SearchResults::degraded(url, e.to_string()), false);
            }
        };

        let Some(page) = response.results.into_iter().next() else {
            tracing::warn!("Extraction of {} returned no content", url);
            return (SearchResults::degraded(url, "no content extracted"), false);
        };

        let (content, truncated) =
            super::truncate_chars(&page.raw_content, self.max_content_chars);
        if truncated {
            tracing::debug!(
                "Truncated content of {} to {} chars",
                url,
                self.max_content_chars
            );
        }

        let results = SearchResults {
            query: url.to_string(),
            results: vec![SearchResultItem {
                title: String::new(),
                url: page.url,
                content,
            }],
            images: Vec::new(),
            number_of_results: 1,
            error: None,
        };
        (results, truncated)
    }

    async fn post<B: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}/{}", self.api_base, endpoint);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            WatchProError::Search(format!("{} request failed: {}", endpoint, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(WatchProError::Search(format!(
                "{} returned error {}: {}",
                endpoint, status, error_text
            ))
            .into());
        }

        response.json().await.map_err(|e| {
            WatchProError::Search(format!("Malformed {} response: {}", endpoint, e)).into()
        })
    }
}

/// Accept only absolute http(s) URLs with a host
pub fn validate_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| WatchProError::Tool(format!("Invalid URL {:?}: {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(
            WatchProError::Tool(format!("Unsupported URL scheme: {}", parsed.scheme())).into(),
        );
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(WatchProError::Tool(format!("URL has no host: {}", raw)).into());
    }
    Ok(parsed)
}

/// The `search` tool exposed to the researcher
pub struct SearchTool {
    client: Arc<SearchClient>,
}

impl SearchTool {
    pub fn new(client: Arc<SearchClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for SearchTool {
    fn tool_definition(&self) -> Value {
        json!({
            "name": "search",
            "description": "Search the web for information about watches, brands, movements, prices and news",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The query to search for"},
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return",
                        "default": DEFAULT_MAX_RESULTS
                    },
                    "search_depth": {
                        "type": "string",
                        "enum": ["basic", "advanced"],
                        "description": "Depth of the search"
                    },
                    "include_domains": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Only return results from these domains"
                    },
                    "exclude_domains": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Never return results from these domains"
                    }
                },
                "required": ["query"]
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: SearchArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(ToolResult::error(format!("Invalid search arguments: {}", e))),
        };
        Ok(self.client.search(&args).await.into_tool_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_query_counts_chars() {
        assert_eq!(pad_query(""), "     ");
        assert_eq!(pad_query("été"), "été  ");
        assert_eq!(pad_query("Rolex"), "Rolex");
    }

    #[test]
    fn test_search_args_defaults() {
        let args: SearchArgs = serde_json::from_value(json!({"query": "nomos"})).unwrap();
        assert_eq!(args.max_results, 10);
        assert_eq!(args.search_depth, SearchDepth::Basic);
        assert!(args.include_domains.is_empty());
    }

    #[test]
    fn test_image_shapes() {
        let images: Vec<SearchImage> = serde_json::from_value(json!([
            "https://img/a.jpg",
            {"url": "https://img/b.jpg", "description": "dial"}
        ]))
        .unwrap();
        assert_eq!(images[0].url(), "https://img/a.jpg");
        assert_eq!(images[1].url(), "https://img/b.jpg");
    }

    #[test]
    fn test_empty_results_shape() {
        let value = serde_json::to_value(SearchResults::empty("q")).unwrap();
        assert_eq!(
            value,
            json!({"query": "q", "results": [], "images": [], "number_of_results": 0})
        );
    }

    #[test]
    fn test_degraded_into_tool_result() {
        let result = SearchResults::degraded("q", "boom").into_tool_result();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        let output: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(output["error"], "boom");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://www.hodinkee.com/articles").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(SearchClient::new(&SearchConfig::default()).is_err());
    }
}
